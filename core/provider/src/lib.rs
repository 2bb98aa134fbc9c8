//! Box remote access for Boxlift.
//!
//! This module owns everything that talks to the provider:
//! - OAuth2 token lifecycle (code exchange, refresh, identity, revocation)
//! - Uploads into the fixed target folder with name-conflict resolution
//! - Folder metadata, listing, and token probing for debug tooling
//!
//! # Design Principles
//! - Stateless calls: bearer token and target folder are explicit parameters
//! - No internal retries: callers own retry policy
//! - Service seams as traits so the batch coordinator is testable offline

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod transfer;

pub use auth::{AuthConfig, AuthService, Identity, TokenPair};
pub use client::{
    BoxClient, ConflictContext, FileListing, FolderInfo, PendingFile, RemoteFile, TokenProbe,
    UploadOutcome,
};
pub use endpoints::BoxEndpoints;
pub use transfer::{FileTransfer, ProgressSink, TokenRefresher};
