//! Resource health state machine
//!
//! Pure transitions between `Available` and `Quarantined`. Time is always
//! passed in, so expiry is evaluated lazily at selection time and tests can
//! drive the clock by hand.

use crate::error::FailureKind;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Upper bound on any cooldown, keeps timestamp arithmetic in range
const MAX_COOLDOWN_SECS: u64 = 10 * 365 * 24 * 60 * 60;

// ============================================================================
// Health State
// ============================================================================

/// Why a resource was quarantined
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineReason {
    RateLimited,
    AuthFailed,
}

impl QuarantineReason {
    /// Quarantine reason for a failure, `None` for transient failures
    pub fn from_failure(kind: FailureKind) -> Option<Self> {
        match kind {
            FailureKind::RateLimited => Some(Self::RateLimited),
            FailureKind::AuthFailed => Some(Self::AuthFailed),
            FailureKind::Transient => None,
        }
    }
}

/// Health of a single resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Available,
    Quarantined {
        until: DateTime<Utc>,
        reason: QuarantineReason,
    },
}

impl HealthState {
    /// End of the quarantine window, if any
    pub fn until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Available => None,
            Self::Quarantined { until, .. } => Some(*until),
        }
    }
}

// ============================================================================
// Cooldowns
// ============================================================================

/// Quarantine durations per failure tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldowns {
    /// Rate-limit / quota signals
    pub short_secs: u64,
    /// Authentication failures
    pub long_secs: u64,
}

impl Default for Cooldowns {
    fn default() -> Self {
        Self {
            short_secs: 3600,
            long_secs: 86400,
        }
    }
}

impl Cooldowns {
    pub fn new(short_secs: u64, long_secs: u64) -> Self {
        Self {
            short_secs,
            long_secs,
        }
    }

    pub fn for_reason(&self, reason: QuarantineReason) -> Duration {
        let secs = match reason {
            QuarantineReason::RateLimited => self.short_secs,
            QuarantineReason::AuthFailed => self.long_secs,
        };
        Duration::seconds(secs.min(MAX_COOLDOWN_SECS) as i64)
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Whether a resource in `state` may be selected at `now`.
///
/// A quarantined resource becomes eligible only once `now` is strictly past
/// `until`.
pub fn is_eligible(state: &HealthState, now: DateTime<Utc>) -> bool {
    match state {
        HealthState::Available => true,
        HealthState::Quarantined { until, .. } => now > *until,
    }
}

/// Collapse a lapsed quarantine back to `Available`
pub fn refresh(state: &HealthState, now: DateTime<Utc>) -> HealthState {
    match state {
        HealthState::Quarantined { .. } if is_eligible(state, now) => HealthState::Available,
        other => *other,
    }
}

/// Quarantine a resource for the cooldown matching `reason`.
///
/// The new window replaces the old one rather than extending it, except that a
/// rate-limit signal never shortens a live authentication quarantine.
pub fn quarantine(
    state: &HealthState,
    reason: QuarantineReason,
    now: DateTime<Utc>,
    cooldowns: &Cooldowns,
) -> HealthState {
    let until = now + cooldowns.for_reason(reason);

    if let HealthState::Quarantined {
        until: current_until,
        reason: QuarantineReason::AuthFailed,
    } = state
    {
        if reason == QuarantineReason::RateLimited && *current_until > until {
            return *state;
        }
    }

    HealthState::Quarantined { until, reason }
}

// ============================================================================
// Clock
// ============================================================================

/// Source of "now" for health evaluation
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
