//! Boxlift batch upload coordination.
//!
//! This module drives a queue of selected files through the upload service
//! one at a time:
//! - Per-file and aggregate progress accounting
//! - Transparent token refresh and resubmission of the in-flight file
//! - Skip-and-continue on non-auth failures
//! - A file-backed session store holding the token pair across runs

pub mod progress;
pub mod store;
pub mod uploader;

pub use progress::BatchProgress;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoredSession};
pub use uploader::{BatchReport, BatchState, BatchUploader, FileFailure, UploadLimits};
