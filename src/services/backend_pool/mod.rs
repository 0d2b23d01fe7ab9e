//! Backend Pool Module
//!
//! Holds every dispatchable resource (one credential bound to one backend)
//! together with its health, and decides which resource serves the next call.
//!
//! # Features
//! - Priority tiers with round-robin rotation inside each tier
//! - Lazy quarantine expiry evaluated against an injected clock
//! - Two cooldown tiers: short for rate limits, long for auth failures
//! - Read-only diagnostic snapshot
//!
//! # Example
//! ```ignore
//! use backend_pool::{ApiKeyCredential, BackendKind, ResourcePool};
//!
//! let mut pool = ResourcePool::new();
//! pool.register(BackendKind::OpenAi, 1, ApiKeyCredential::new("key1", "primary"));
//! pool.register(BackendKind::Gemini, 2, ApiKeyCredential::new("key2", "backup"));
//!
//! if let Some(resource) = pool.select_next(chrono::Utc::now()) {
//!     println!("Using resource: {}", resource.id);
//! }
//! ```

mod credential;
pub mod health;
mod pool;
mod strategy;

pub use credential::{ApiKeyCredential, BackendKind, Resource, ResourceHandle};
pub use health::{Clock, Cooldowns, HealthState, ManualClock, QuarantineReason, SystemClock};
pub use pool::{PoolStats, ResourcePool, ResourceStatus};
pub use strategy::{PriorityRotation, Tier};
