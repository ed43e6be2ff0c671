//! Domain models for synced workout data

mod account;
mod activity;
mod credential;
mod watermark;

pub use account::AccountId;
pub use activity::{ActivityKey, ActivityRecord, ActivityRecordBuilder, Source};
pub use credential::Credential;
pub use watermark::SyncWatermark;
