//! Event ingest
//!
//! Turns host lifecycle notifications into state document updates:
//! - `notification`: wire parsing and kinds
//! - `machine`: the lifecycle state machine
//! - `ingestor`: serialized apply + atomic persist

pub mod label;
mod lock;
pub mod machine;
mod ingestor;
mod notification;

pub use ingestor::{Ingestor, Outcome};
pub use label::{format_operation_label, Classifier};
pub use notification::{Notification, NotificationKind};

use crate::store::StoreError;
use std::path::PathBuf;

/// Errors that can occur while ingesting a notification
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Malformed notification: {0}")]
    Malformed(String),

    #[error("Timed out after {}ms acquiring lock {}", .waited_ms, .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
