//! LLM dispatch gateway library
//!
//! Routes chat requests across several AI backends and API keys, quarantining
//! keys that hit rate limits or fail authentication and degrading to a
//! friendly fallback message when nothing is available.

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod schemas;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::ApiError;
pub use server::App;
pub use services::dispatcher::{DispatchOutcome, Dispatcher};
