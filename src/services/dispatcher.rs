//! Dispatcher
//!
//! The only component callers talk to. For each call it selects a resource,
//! invokes the matching backend adapter, quarantines resources that report
//! rate-limit or auth failures, and retries within a bounded attempt budget.
//! When nothing succeeds it returns a user-safe degradation message instead
//! of an error.

use crate::error::{BackendFailure, TerminalCause};
use crate::schemas::conversation::{ChatTurn, Conversation};
use crate::services::adapters::AdapterRegistry;
use crate::services::backend_pool::{
    Clock, Cooldowns, PoolStats, QuarantineReason, ResourceHandle, ResourcePool, ResourceStatus,
    SystemClock,
};
use crate::utils::{truncate_with_suffix, with_timeout, TimeoutError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Longest failure detail written to a single log line
const MAX_LOGGED_RAW_CHARS: usize = 200;

// ============================================================================
// Configuration
// ============================================================================

/// User-facing text for each terminal cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackMessages {
    pub no_backends: String,
    pub all_limited: String,
    pub attempts_exhausted: String,
}

impl Default for FallbackMessages {
    fn default() -> Self {
        Self {
            no_backends: "The assistant is not configured right now. Please contact the site administrator."
                .to_string(),
            all_limited: "All assistant backends are busy at the moment. Please try again in a little while."
                .to_string(),
            attempts_exhausted: "Sorry, I could not produce an answer right now. Please try again shortly."
                .to_string(),
        }
    }
}

impl FallbackMessages {
    pub fn for_cause(&self, cause: TerminalCause) -> &str {
        match cause {
            TerminalCause::NoResourcesConfigured => &self.no_backends,
            TerminalCause::PoolExhausted => &self.all_limited,
            TerminalCause::AttemptsExhausted => &self.attempts_exhausted,
        }
    }
}

/// Dispatch tuning
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum adapter invocations per call
    pub max_attempts: u32,
    pub cooldowns: Cooldowns,
    /// Deadline for a single adapter invocation
    pub request_timeout: Duration,
    /// System preamble prepended to every conversation
    pub preamble: String,
    pub fallback: FallbackMessages,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldowns: Cooldowns::default(),
            request_timeout: Duration::from_secs(60),
            preamble: "You are a helpful assistant. Answer clearly and concisely.".to_string(),
            fallback: FallbackMessages::default(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of one dispatch call. Both variants carry displayable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success {
        text: String,
    },
    Degraded {
        message: String,
        cause: TerminalCause,
    },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Text to show the user
    pub fn text(&self) -> &str {
        match self {
            Self::Success { text } => text,
            Self::Degraded { message, .. } => message,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Success { text } => text,
            Self::Degraded { message, .. } => message,
        }
    }

    /// Terminal cause of a degraded outcome
    pub fn cause(&self) -> Option<TerminalCause> {
        match self {
            Self::Success { .. } => None,
            Self::Degraded { cause, .. } => Some(*cause),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Resilient dispatcher over a shared resource pool
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<Mutex<ResourcePool>>,
    adapters: Arc<AdapterRegistry>,
    config: Arc<DispatchConfig>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(pool: ResourcePool, adapters: AdapterRegistry, config: DispatchConfig) -> Self {
        Self {
            pool: Arc::new(Mutex::new(pool)),
            adapters: Arc::new(adapters),
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for health evaluation
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Dispatch one user message with its prior history.
    ///
    /// Never fails: every path ends in either a completion or a degradation
    /// message.
    pub async fn send(&self, user_message: &str, history: &[ChatTurn]) -> DispatchOutcome {
        let conversation = Conversation::build(&self.config.preamble, history, user_message);
        let mut tried: HashSet<String> = HashSet::new();

        for attempt in 1..=self.config.max_attempts {
            let Some(resource) = self.select(&tried) else {
                let cause = if self.lock_pool().is_empty() {
                    TerminalCause::NoResourcesConfigured
                } else {
                    TerminalCause::PoolExhausted
                };
                return self.degrade(cause, attempt - 1);
            };
            tried.insert(resource.id.clone());

            tracing::debug!(
                resource = %resource.id,
                credential = resource.credential.name(),
                attempt = attempt,
                "Dispatching to backend"
            );

            match self.invoke(&resource, &conversation).await {
                Ok(text) => {
                    tracing::info!(
                        resource = %resource.id,
                        attempt = attempt,
                        "Backend call succeeded"
                    );
                    return DispatchOutcome::Success { text };
                }
                Err(failure) => self.record_failure(&resource, &failure, attempt),
            }
        }

        self.degrade(TerminalCause::AttemptsExhausted, self.config.max_attempts)
    }

    /// [`send`](Self::send) reduced to the text to display
    pub async fn send_text(&self, user_message: &str, history: &[ChatTurn]) -> String {
        self.send(user_message, history).await.into_text()
    }

    /// Read-only health view of every resource
    pub fn snapshot(&self) -> Vec<ResourceStatus> {
        self.lock_pool().snapshot(self.clock.now())
    }

    pub fn stats(&self) -> PoolStats {
        self.lock_pool().stats(self.clock.now())
    }

    /// Prefer a resource not yet tried in this call, falling back to any
    /// eligible one.
    fn select(&self, tried: &HashSet<String>) -> Option<ResourceHandle> {
        let now = self.clock.now();
        let mut pool = self.lock_pool();
        pool.select_next_excluding(now, tried)
            .or_else(|| pool.select_next(now))
    }

    async fn invoke(
        &self,
        resource: &ResourceHandle,
        conversation: &Conversation,
    ) -> Result<String, BackendFailure> {
        let Some(adapter) = self.adapters.get(resource.backend) else {
            return Err(BackendFailure::transient(format!(
                "no adapter registered for backend {}",
                resource.backend
            )));
        };

        let call = adapter.invoke(conversation, &resource.credential);
        match with_timeout(self.config.request_timeout, call).await {
            Ok(text) => Ok(text),
            Err(TimeoutError::Inner(failure)) => Err(failure),
            Err(TimeoutError::Timeout(after)) => Err(BackendFailure::transient(format!(
                "no response within {}s",
                after.as_secs_f32()
            ))),
        }
    }

    fn record_failure(&self, resource: &ResourceHandle, failure: &BackendFailure, attempt: u32) {
        let raw = truncate_with_suffix(&failure.raw, MAX_LOGGED_RAW_CHARS, "...");

        let Some(reason) = QuarantineReason::from_failure(failure.kind) else {
            tracing::warn!(
                resource = %resource.id,
                kind = %failure.kind,
                attempt = attempt,
                error = %raw,
                "Backend call failed, moving on"
            );
            return;
        };

        let now = self.clock.now();
        let until = self
            .lock_pool()
            .quarantine(&resource.id, reason, now, &self.config.cooldowns);

        tracing::warn!(
            resource = %resource.id,
            kind = %failure.kind,
            attempt = attempt,
            until = ?until,
            error = %raw,
            "Backend call failed, resource quarantined"
        );
    }

    fn degrade(&self, cause: TerminalCause, attempts: u32) -> DispatchOutcome {
        tracing::warn!(cause = %cause, attempts = attempts, "Dispatch degraded");
        DispatchOutcome::Degraded {
            message: self.config.fallback.for_cause(cause).to_string(),
            cause,
        }
    }

    fn lock_pool(&self) -> MutexGuard<'_, ResourcePool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("adapters", &self.adapters)
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::adapters::testing::ScriptedAdapter;
    use crate::services::backend_pool::{ApiKeyCredential, BackendKind, ManualClock};
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn ok(text: &str) -> Result<String, BackendFailure> {
        Ok(text.to_string())
    }

    fn config(max_attempts: u32) -> DispatchConfig {
        DispatchConfig {
            max_attempts,
            ..DispatchConfig::default()
        }
    }

    /// R1 = openai key "r1" (priority 1), R2 = gemini key "r2" (priority 2)
    fn two_backend_pool() -> ResourcePool {
        let mut pool = ResourcePool::new();
        pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new("r1", "primary"));
        pool.register(BackendKind::Gemini, 2, ApiKeyCredential::new("r2", "backup"));
        pool
    }

    fn dispatcher(
        pool: ResourcePool,
        adapters: AdapterRegistry,
        config: DispatchConfig,
        clock: &Arc<ManualClock>,
    ) -> Dispatcher {
        Dispatcher::new(pool, adapters, config).with_clock(clock.clone())
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let clock = Arc::new(ManualClock::new(t0()));
        let openai = Arc::new(ScriptedAdapter::new(BackendKind::OpenAi).script("r1", vec![ok("hi")]));
        let gemini = Arc::new(ScriptedAdapter::new(BackendKind::Gemini).script("r2", vec![ok("unused")]));
        let adapters = AdapterRegistry::new().with(openai.clone()).with(gemini.clone());
        let dispatcher = dispatcher(two_backend_pool(), adapters, config(3), &clock);

        let outcome = dispatcher.send("hello", &[]).await;

        assert_eq!(outcome, DispatchOutcome::Success { text: "hi".into() });
        assert_eq!(openai.calls(), vec!["r1"]);
        assert!(gemini.calls().is_empty());
        assert!(dispatcher.snapshot().iter().all(|s| !s.limited));
    }

    #[tokio::test]
    async fn test_rate_limited_fails_over_and_quarantines() {
        let clock = Arc::new(ManualClock::new(t0()));
        let openai = Arc::new(
            ScriptedAdapter::new(BackendKind::OpenAi)
                .script("r1", vec![Err(BackendFailure::rate_limited("HTTP 429"))]),
        );
        let gemini = Arc::new(ScriptedAdapter::new(BackendKind::Gemini).script("r2", vec![ok("ok")]));
        let adapters = AdapterRegistry::new().with(openai.clone()).with(gemini.clone());
        let dispatcher = dispatcher(two_backend_pool(), adapters, config(3), &clock);

        assert_eq!(dispatcher.send_text("hello", &[]).await, "ok");

        let snapshot = dispatcher.snapshot();
        assert!(snapshot[0].limited);
        assert_eq!(snapshot[0].reset_time, Some(t0() + ChronoDuration::seconds(3600)));
        assert!(!snapshot[1].limited);
    }

    #[tokio::test]
    async fn test_all_quarantined_degrades_without_invoking() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut pool = two_backend_pool();
        let cooldowns = Cooldowns::default();
        pool.quarantine("openai#0", QuarantineReason::RateLimited, t0(), &cooldowns);
        pool.quarantine("gemini#0", QuarantineReason::AuthFailed, t0(), &cooldowns);

        let openai = Arc::new(ScriptedAdapter::new(BackendKind::OpenAi).script("r1", vec![ok("hi")]));
        let gemini = Arc::new(ScriptedAdapter::new(BackendKind::Gemini).script("r2", vec![ok("hi")]));
        let adapters = AdapterRegistry::new().with(openai.clone()).with(gemini.clone());
        let dispatcher = dispatcher(pool, adapters, config(3), &clock);

        let outcome = dispatcher.send("hello", &[]).await;

        assert_eq!(outcome.cause(), Some(TerminalCause::PoolExhausted));
        assert_eq!(outcome.text(), FallbackMessages::default().all_limited);
        assert!(openai.calls().is_empty());
        assert!(gemini.calls().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_attempts_without_quarantine() {
        let clock = Arc::new(ManualClock::new(t0()));
        let openai = Arc::new(
            ScriptedAdapter::new(BackendKind::OpenAi)
                .script("r1", vec![Err(BackendFailure::transient("HTTP 503"))]),
        );
        let gemini = Arc::new(
            ScriptedAdapter::new(BackendKind::Gemini)
                .script("r2", vec![Err(BackendFailure::transient("connection reset"))]),
        );
        let adapters = AdapterRegistry::new().with(openai.clone()).with(gemini.clone());
        let dispatcher = dispatcher(two_backend_pool(), adapters, config(2), &clock);

        let outcome = dispatcher.send("hello", &[]).await;

        assert_eq!(outcome.cause(), Some(TerminalCause::AttemptsExhausted));
        assert_eq!(outcome.text(), FallbackMessages::default().attempts_exhausted);
        assert_eq!(openai.calls().len() + gemini.calls().len(), 2);
        assert_eq!(openai.calls(), vec!["r1"]);
        assert_eq!(gemini.calls(), vec!["r2"]);
        assert!(dispatcher.snapshot().iter().all(|s| !s.limited));
    }

    #[tokio::test]
    async fn test_auth_failure_keeps_long_quarantine() {
        let clock = Arc::new(ManualClock::new(t0()));
        let openai = Arc::new(
            ScriptedAdapter::new(BackendKind::OpenAi)
                .script("r1", vec![Err(BackendFailure::auth_failed("HTTP 401"))]),
        );
        let gemini = Arc::new(ScriptedAdapter::new(BackendKind::Gemini).script("r2", vec![ok("ok")]));
        let adapters = AdapterRegistry::new().with(openai.clone()).with(gemini.clone());
        let dispatcher = dispatcher(two_backend_pool(), adapters, config(3), &clock);

        assert_eq!(dispatcher.send_text("hello", &[]).await, "ok");
        assert_eq!(
            dispatcher.snapshot()[0].reset_time,
            Some(t0() + ChronoDuration::seconds(86400))
        );

        // well past the short cooldown, still skipped
        clock.advance_secs(3601);
        assert_eq!(dispatcher.send_text("again", &[]).await, "ok");
        assert_eq!(openai.calls().len(), 1);

        clock.set(t0() + ChronoDuration::seconds(86401));
        dispatcher.send("later", &[]).await;
        assert_eq!(openai.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_no_resources_configured() {
        let clock = Arc::new(ManualClock::new(t0()));
        let dispatcher = dispatcher(ResourcePool::new(), AdapterRegistry::new(), config(3), &clock);

        let outcome = dispatcher.send("hello", &[]).await;

        assert_eq!(outcome.cause(), Some(TerminalCause::NoResourcesConfigured));
        assert_eq!(outcome.into_text(), FallbackMessages::default().no_backends);
    }

    #[tokio::test]
    async fn test_invocations_bounded_by_max_attempts() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut pool = ResourcePool::new();
        let mut adapter = ScriptedAdapter::new(BackendKind::OpenAi);
        for i in 0..5 {
            let key = format!("k{}", i);
            pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new(key.clone(), key.clone()));
            adapter = adapter.script(&key, vec![Err(BackendFailure::transient("HTTP 500"))]);
        }
        let adapter = Arc::new(adapter);
        let dispatcher = dispatcher(pool, AdapterRegistry::new().with(adapter.clone()), config(3), &clock);

        let outcome = dispatcher.send("hello", &[]).await;

        assert!(!outcome.is_success());
        assert_eq!(adapter.calls(), vec!["k0", "k1", "k2"]);
    }

    #[tokio::test]
    async fn test_single_resource_is_retried_after_transient() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut pool = ResourcePool::new();
        pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new("only", "only"));
        let adapter = Arc::new(ScriptedAdapter::new(BackendKind::OpenAi).script(
            "only",
            vec![
                Err(BackendFailure::transient("HTTP 502")),
                ok("second time lucky"),
            ],
        ));
        let dispatcher = dispatcher(pool, AdapterRegistry::new().with(adapter.clone()), config(3), &clock);

        assert_eq!(dispatcher.send_text("hello", &[]).await, "second time lucky");
        assert_eq!(adapter.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_on_last_resource_stops_early() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut pool = ResourcePool::new();
        pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new("only", "only"));
        let adapter = Arc::new(
            ScriptedAdapter::new(BackendKind::OpenAi)
                .script("only", vec![Err(BackendFailure::rate_limited("quota"))]),
        );
        let dispatcher = dispatcher(pool, AdapterRegistry::new().with(adapter.clone()), config(3), &clock);

        let outcome = dispatcher.send("hello", &[]).await;

        assert_eq!(outcome.cause(), Some(TerminalCause::PoolExhausted));
        assert_eq!(adapter.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_adapter_is_transient() {
        let clock = Arc::new(ManualClock::new(t0()));
        let gemini = Arc::new(ScriptedAdapter::new(BackendKind::Gemini).script("r2", vec![ok("ok")]));
        let adapters = AdapterRegistry::new().with(gemini.clone());
        let dispatcher = dispatcher(two_backend_pool(), adapters, config(3), &clock);

        assert_eq!(dispatcher.send_text("hello", &[]).await, "ok");
        assert!(!dispatcher.snapshot()[0].limited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let clock = Arc::new(ManualClock::new(t0()));
        let openai = Arc::new(
            ScriptedAdapter::new(BackendKind::OpenAi)
                .with_delay(Duration::from_secs(120))
                .script("r1", vec![ok("too late")]),
        );
        let gemini = Arc::new(ScriptedAdapter::new(BackendKind::Gemini).script("r2", vec![ok("ok")]));
        let adapters = AdapterRegistry::new().with(openai.clone()).with(gemini.clone());
        let config = DispatchConfig {
            request_timeout: Duration::from_secs(5),
            ..DispatchConfig::default()
        };
        let dispatcher = dispatcher(two_backend_pool(), adapters, config, &clock);

        assert_eq!(dispatcher.send_text("hello", &[]).await, "ok");
        assert_eq!(openai.calls().len(), 1);
        assert!(!dispatcher.snapshot()[0].limited);
    }

    #[tokio::test]
    async fn test_concurrent_sends() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut pool = ResourcePool::new();
        pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new("a", "a"));
        pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new("b", "b"));
        let adapter = Arc::new(
            ScriptedAdapter::new(BackendKind::OpenAi)
                .with_delay(Duration::from_millis(5))
                .script("a", vec![ok("from a")])
                .script("b", vec![ok("from b")]),
        );
        let dispatcher = dispatcher(pool, AdapterRegistry::new().with(adapter.clone()), config(3), &clock);

        let outcomes = futures::future::join_all((0..10).map(|i| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.send(&format!("question {}", i), &[]).await }
        }))
        .await;

        assert!(outcomes.iter().all(DispatchOutcome::is_success));
        assert_eq!(adapter.calls().len(), 10);
        let from_a = adapter.calls().iter().filter(|k| *k == "a").count();
        assert_eq!(from_a, 5);
        assert_eq!(dispatcher.stats().eligible, 2);
    }

    #[test]
    fn test_outcome_accessors() {
        let degraded = DispatchOutcome::Degraded {
            message: "busy".into(),
            cause: TerminalCause::PoolExhausted,
        };
        assert!(!degraded.is_success());
        assert_eq!(degraded.text(), "busy");

        let success = DispatchOutcome::Success { text: "hi".into() };
        assert_eq!(success.cause(), None);
        assert_eq!(success.into_text(), "hi");
    }
}
