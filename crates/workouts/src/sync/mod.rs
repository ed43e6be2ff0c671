//! Sync engine for fetching and storing activities
//!
//! Provides idempotent sync operations that can be safely retried.

mod engine;
pub mod retry;
pub mod timing;

pub use engine::{SyncEngine, SyncOptions, SyncStats};
pub use retry::{RetryDisposition, classify, is_retryable};
pub use timing::{cooldown_elapsed, sync_window_start};
