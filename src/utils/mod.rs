//! Utility modules.

pub mod file;
pub mod retry;

pub use file::{remove_if_exists, write_atomic};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
