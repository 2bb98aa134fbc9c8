//! Service seams consumed by the batch coordinator.
//!
//! The coordinator only needs two capabilities from the provider side:
//! pushing one file and renewing a token pair. Keeping them as traits lets
//! the coordinator run against in-memory doubles in tests.

use async_trait::async_trait;
use std::sync::Arc;

use boxlift_common::Result;

use crate::auth::{AuthService, TokenPair};
use crate::client::{BoxClient, PendingFile, UploadOutcome};

/// Observer for per-file upload progress, in percent of bytes sent.
#[derive(Clone)]
pub struct ProgressSink(Option<Arc<dyn Fn(u8) + Send + Sync>>);

impl ProgressSink {
    /// Create a sink that forwards percentages to `f`.
    pub fn new(f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(f)))
    }

    /// A sink that discards all reports.
    pub fn noop() -> Self {
        Self(None)
    }

    /// Report progress, clamped to 100.
    pub fn report(&self, percent: u8) {
        if let Some(f) = &self.0 {
            f(percent.min(100));
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ProgressSink")
            .field(&self.0.as_ref().map(|_| "fn"))
            .finish()
    }
}

/// Upload Orchestration Service seam: one create-or-version-or-rename
/// upload into the target folder.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    async fn upload(
        &self,
        access_token: &str,
        folder_id: &str,
        file: &PendingFile,
        progress: ProgressSink,
    ) -> Result<UploadOutcome>;
}

/// Token Exchange Service seam: renew a consumed pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

#[async_trait]
impl FileTransfer for BoxClient {
    async fn upload(
        &self,
        access_token: &str,
        folder_id: &str,
        file: &PendingFile,
        progress: ProgressSink,
    ) -> Result<UploadOutcome> {
        BoxClient::upload(self, access_token, folder_id, file, progress).await
    }
}

#[async_trait]
impl TokenRefresher for AuthService {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        AuthService::refresh(self, refresh_token).await
    }
}

#[async_trait]
impl<T: FileTransfer + ?Sized> FileTransfer for Arc<T> {
    async fn upload(
        &self,
        access_token: &str,
        folder_id: &str,
        file: &PendingFile,
        progress: ProgressSink,
    ) -> Result<UploadOutcome> {
        (**self).upload(access_token, folder_id, file, progress).await
    }
}

#[async_trait]
impl<R: TokenRefresher + ?Sized> TokenRefresher for Arc<R> {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        (**self).refresh(refresh_token).await
    }
}
