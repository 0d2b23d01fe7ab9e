//! Utility modules
//!
//! String helpers for logging and timeout handling for backend calls.

pub mod string;
pub mod timeout;

pub use string::{mask_secret, truncate_str, truncate_with_suffix};
pub use timeout::{with_timeout, TimeoutError};
