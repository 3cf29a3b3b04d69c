//! Resilience patterns for remote store calls
//!
//! Provides classified retry with exponential backoff and server-directed
//! waits.

pub mod retry;

pub use retry::{execute_with_retry, Classified, ErrorClass, RetryConfig, RetryPolicy, RetryingClient};
