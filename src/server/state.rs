//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers via Axum's state extraction.

use crate::config::Settings;
use crate::services::adapters::{build_adapter, build_http_client, AdapterRegistry};
use crate::services::backend_pool::ResourcePool;
use crate::services::dispatcher::Dispatcher;
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state
///
/// Cheap to clone; the dispatcher shares its pool behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    pub dispatcher: Dispatcher,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Build the resource pool and backend adapters from settings
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let client = build_http_client(settings.connect_timeout(), settings.request_timeout())
            .context("Failed to build HTTP client")?;

        let params = settings.generation_params();
        let mut pool = ResourcePool::new();
        let mut adapters = AdapterRegistry::new();

        for backend in settings.backends.iter().filter(|b| b.is_configured()) {
            let mut registered = 0;
            for credential in backend.credentials() {
                if pool.register(backend.kind, backend.priority, credential) {
                    registered += 1;
                }
            }
            adapters.register(build_adapter(
                backend.kind,
                client.clone(),
                backend.adapter_config(params),
            ));

            tracing::info!(
                backend = %backend.kind,
                keys = registered,
                priority = backend.priority,
                model = %backend.model,
                "Backend configured"
            );
        }

        let adapter_count = adapters.len();
        let dispatcher = Dispatcher::new(pool, adapters, settings.dispatch_config());
        tracing::info!(
            resources = dispatcher.stats().total,
            adapters = adapter_count,
            "Application state initialized"
        );

        Ok(Self::from_parts(settings, dispatcher))
    }

    /// Assemble state around an existing dispatcher
    pub fn from_parts(settings: Settings, dispatcher: Dispatcher) -> Self {
        Self {
            settings: Arc::new(settings),
            dispatcher,
            start_time: Instant::now(),
        }
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
