//! Error types
//!
//! `dispatch` holds the backend failure taxonomy used inside the dispatcher,
//! `types` holds the HTTP error envelope returned by the API layer.

pub mod dispatch;
pub mod types;

pub use dispatch::{BackendFailure, FailureKind, TerminalCause};
pub use types::ApiError;
