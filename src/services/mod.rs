//! Services module
//!
//! The resource pool, backend adapters, and the dispatcher that ties them
//! together.

pub mod adapters;
pub mod backend_pool;
pub mod dispatcher;

pub use adapters::{AdapterConfig, AdapterRegistry, BackendAdapter, GenerationParams};
pub use backend_pool::{
    ApiKeyCredential, BackendKind, Clock, Cooldowns, ManualClock, PoolStats, ResourcePool,
    ResourceStatus, SystemClock,
};
pub use dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher, FallbackMessages};
