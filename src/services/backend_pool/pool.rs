//! Resource Pool Implementation
//!
//! The pool owns every dispatchable resource and its health. It is built once
//! at startup and mutated only through `select_next*` (lazy quarantine expiry,
//! rotation cursor) and `quarantine`.

use super::credential::{ApiKeyCredential, BackendKind, Resource, ResourceHandle};
use super::health::{self, Cooldowns, HealthState, QuarantineReason};
use super::strategy::PriorityRotation;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

// ============================================================================
// Resource Pool
// ============================================================================

/// The set of backend+credential pairs the dispatcher can choose from
#[derive(Debug, Default)]
pub struct ResourcePool {
    resources: Vec<Resource>,
    rotation: PriorityRotation,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential for a backend.
    ///
    /// Returns `false` if the same key is already registered for that backend;
    /// the first registration wins.
    pub fn register(
        &mut self,
        backend: BackendKind,
        priority: u32,
        credential: ApiKeyCredential,
    ) -> bool {
        let duplicate = self
            .resources
            .iter()
            .any(|r| r.backend == backend && r.credential.api_key() == credential.api_key());
        if duplicate {
            tracing::debug!(
                backend = %backend,
                credential = credential.name(),
                "Ignoring duplicate credential"
            );
            return false;
        }

        let index = self
            .resources
            .iter()
            .filter(|r| r.backend == backend)
            .count();
        let position = self.resources.len();

        self.resources.push(Resource {
            id: format!("{}#{}", backend, index),
            backend,
            index,
            priority,
            credential: Arc::new(credential),
            health: HealthState::Available,
        });
        self.rotation.insert(priority, position);
        true
    }

    /// Highest-priority eligible resource, rotating within its tier
    pub fn select_next(&mut self, now: DateTime<Utc>) -> Option<ResourceHandle> {
        self.select_next_excluding(now, &HashSet::new())
    }

    /// Like [`select_next`](Self::select_next) but skips the given resource ids.
    ///
    /// The rotation cursor only moves when a resource is returned.
    pub fn select_next_excluding(
        &mut self,
        now: DateTime<Utc>,
        excluded: &HashSet<String>,
    ) -> Option<ResourceHandle> {
        for (_, tier) in self.rotation.tiers_mut() {
            let mut picked = None;
            for position in tier.probe_order() {
                let resource = &mut self.resources[tier.members()[position]];
                if excluded.contains(&resource.id) || !health::is_eligible(&resource.health, now) {
                    continue;
                }

                let refreshed = health::refresh(&resource.health, now);
                if refreshed != resource.health {
                    tracing::info!(resource = %resource.id, "Quarantine lapsed, resource available again");
                    resource.health = refreshed;
                }
                picked = Some((position, resource.handle()));
                break;
            }

            if let Some((position, handle)) = picked {
                tier.advance_past(position);
                return Some(handle);
            }
        }
        None
    }

    /// Apply a quarantine to a resource, returning the resulting window end
    pub fn quarantine(
        &mut self,
        id: &str,
        reason: QuarantineReason,
        now: DateTime<Utc>,
        cooldowns: &Cooldowns,
    ) -> Option<DateTime<Utc>> {
        let resource = self.resources.iter_mut().find(|r| r.id == id)?;
        resource.health = health::quarantine(&resource.health, reason, now, cooldowns);
        resource.health.until()
    }

    /// Look up a resource by id
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// All resources in registration order
    pub fn all(&self) -> &[Resource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Read-only diagnostic view; lapsed quarantines are reported as not
    /// limited but are left untouched.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<ResourceStatus> {
        self.resources
            .iter()
            .map(|r| {
                let limited = !health::is_eligible(&r.health, now);
                ResourceStatus {
                    backend_name: r.backend.as_str().to_string(),
                    index: r.index,
                    name: r.credential.name().to_string(),
                    priority: r.priority,
                    limited,
                    reset_time: if limited { r.health.until() } else { None },
                }
            })
            .collect()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> PoolStats {
        let eligible = self
            .resources
            .iter()
            .filter(|r| health::is_eligible(&r.health, now))
            .count();
        PoolStats {
            total: self.resources.len(),
            eligible,
            quarantined: self.resources.len() - eligible,
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Per-resource diagnostic entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    pub backend_name: String,
    pub index: usize,
    pub name: String,
    pub priority: u32,
    pub limited: bool,
    pub reset_time: Option<DateTime<Utc>>,
}

/// Statistics about a resource pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub eligible: usize,
    pub quarantined: usize,
}

impl PoolStats {
    /// At least one resource can be selected right now
    pub fn is_healthy(&self) -> bool {
        self.eligible > 0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn key(k: &str) -> ApiKeyCredential {
        ApiKeyCredential::new(k, k)
    }

    fn two_tier_pool() -> ResourcePool {
        let mut pool = ResourcePool::new();
        pool.register(BackendKind::OpenAi, 1, key("o1"));
        pool.register(BackendKind::OpenAi, 1, key("o2"));
        pool.register(BackendKind::Gemini, 2, key("g1"));
        pool
    }

    #[test]
    fn test_register_dedups_preserving_first() {
        let mut pool = ResourcePool::new();
        assert!(pool.register(BackendKind::OpenAi, 1, key("same")));
        assert!(!pool.register(BackendKind::OpenAi, 5, ApiKeyCredential::new("same", "renamed")));
        // same key on a different backend is a different resource
        assert!(pool.register(BackendKind::Gemini, 1, key("same")));

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.all()[0].credential.name(), "same");
        assert_eq!(pool.all()[0].priority, 1);
        assert_eq!(pool.all()[1].id, "gemini#0");
    }

    #[test]
    fn test_ids_index_within_backend() {
        let pool = two_tier_pool();
        let ids: Vec<&str> = pool.all().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["openai#0", "openai#1", "gemini#0"]);
    }

    #[test]
    fn test_rotation_within_equal_priority() {
        let mut pool = two_tier_pool();
        let picks: Vec<String> = (0..4).map(|_| pool.select_next(t0()).unwrap().id).collect();
        assert_eq!(picks, vec!["openai#0", "openai#1", "openai#0", "openai#1"]);
    }

    #[test]
    fn test_falls_back_to_lower_priority() {
        let mut pool = two_tier_pool();
        let cooldowns = Cooldowns::default();
        pool.quarantine("openai#0", QuarantineReason::RateLimited, t0(), &cooldowns);
        pool.quarantine("openai#1", QuarantineReason::AuthFailed, t0(), &cooldowns);

        assert_eq!(pool.select_next(t0()).unwrap().id, "gemini#0");
    }

    #[test]
    fn test_none_when_all_quarantined_and_cursor_unchanged() {
        let mut pool = two_tier_pool();
        let cooldowns = Cooldowns::default();
        for id in ["openai#0", "openai#1", "gemini#0"] {
            pool.quarantine(id, QuarantineReason::RateLimited, t0(), &cooldowns);
        }
        let cursor_before = pool.rotation.tier(1).unwrap().cursor();

        assert!(pool.select_next(t0()).is_none());
        assert_eq!(pool.rotation.tier(1).unwrap().cursor(), cursor_before);
    }

    #[test]
    fn test_exclusion_skips_tried() {
        let mut pool = two_tier_pool();
        let excluded: HashSet<String> = ["openai#0".to_string(), "openai#1".to_string()].into();
        assert_eq!(pool.select_next_excluding(t0(), &excluded).unwrap().id, "gemini#0");
    }

    #[test]
    fn test_lapsed_quarantine_is_reset_on_selection() {
        let mut pool = ResourcePool::new();
        pool.register(BackendKind::OpenAi, 1, key("o1"));
        let cooldowns = Cooldowns::new(60, 600);
        pool.quarantine("openai#0", QuarantineReason::RateLimited, t0(), &cooldowns);

        assert!(pool.select_next(t0() + Duration::seconds(60)).is_none());
        assert!(pool.select_next(t0() + Duration::seconds(61)).is_some());
        assert_eq!(pool.get("openai#0").unwrap().health, HealthState::Available);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut pool = two_tier_pool();
        let cooldowns = Cooldowns::new(60, 600);
        let until = pool
            .quarantine("openai#1", QuarantineReason::RateLimited, t0(), &cooldowns)
            .unwrap();

        let during = pool.snapshot(t0() + Duration::seconds(30));
        assert!(during[1].limited);
        assert_eq!(during[1].reset_time, Some(until));
        assert_eq!(during[1].backend_name, "openai");
        assert_eq!(during[1].index, 1);
        assert!(!during[0].limited);
        assert_eq!(during[0].reset_time, None);

        let after = pool.snapshot(t0() + Duration::seconds(120));
        assert!(!after[1].limited);
        // lapsed quarantine still stored until a selection refreshes it
        assert!(matches!(
            pool.get("openai#1").unwrap().health,
            HealthState::Quarantined { .. }
        ));
    }

    #[test]
    fn test_pool_stats() {
        let mut pool = two_tier_pool();
        assert_eq!(pool.stats(t0()).eligible, 3);
        pool.quarantine("gemini#0", QuarantineReason::AuthFailed, t0(), &Cooldowns::default());

        let stats = pool.stats(t0());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.eligible, 2);
        assert_eq!(stats.quarantined, 1);
        assert!(stats.is_healthy());
    }

    #[test]
    fn test_quarantine_unknown_id() {
        let mut pool = two_tier_pool();
        assert!(pool
            .quarantine("anthropic#0", QuarantineReason::RateLimited, t0(), &Cooldowns::default())
            .is_none());
    }
}
