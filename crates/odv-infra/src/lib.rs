//! Shared infrastructure for the ODV back-office
//!
//! - [`resilience`]: classified retries with failure notification
//! - [`cache`]: the single-flight folder handle cache

pub mod cache;
pub mod resilience;

pub use cache::FolderCache;
pub use resilience::{execute_with_retry, Classified, ErrorClass, RetryConfig, RetryPolicy, RetryingClient};
