//! Sequential batch upload coordination.
//!
//! One file is in flight at a time. An expired access token is renewed
//! through the refresher seam and the same file is resubmitted; any other
//! failure is recorded and the batch moves on. A rejected refresh aborts
//! the batch with the unsent files left in the queue.

use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use boxlift_common::{Error, Result};
use boxlift_provider::{
    FileTransfer, PendingFile, ProgressSink, TokenRefresher, UploadOutcome,
};

use crate::progress::BatchProgress;
use crate::store::SessionStore;

/// Default cap on files per batch.
const DEFAULT_MAX_FILES: usize = 5;
/// Default cap on a single file's size: 100 MiB.
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Selection limits enforced before anything touches the network.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_files: usize,
    pub max_file_size: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// Coordinator state; at most one file is ever in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// No active batch.
    Idle,
    /// File at this queue index is in flight.
    Uploading(usize),
    /// Renewing the token pair before resubmitting the file at this index.
    RefreshingToken(usize),
    /// All files attempted.
    Done,
}

/// One file's terminal failure within a batch.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub name: String,
    pub reason: String,
}

/// End-of-batch summary.
#[derive(Debug)]
pub struct BatchReport {
    /// Files the batch attempted (equals the selection size).
    pub attempted: usize,
    /// Files that reached a terminal successful upload.
    pub succeeded: usize,
    /// Per-file failure summary, in attempt order.
    pub failures: Vec<FileFailure>,
    /// Successful outcomes, in attempt order.
    pub outcomes: Vec<UploadOutcome>,
}

/// Observer invoked on progress changes: `(file name, file %, aggregate %)`.
pub type ProgressObserver = Arc<dyn Fn(&str, u8, u8) + Send + Sync>;

/// Batch Upload Coordinator.
///
/// Files are submitted in selection order, strictly one at a time, so the
/// progress accounting and refresh-then-retry semantics stay race-free.
pub struct BatchUploader<T, R, S> {
    transfer: T,
    refresher: R,
    store: S,
    folder_id: String,
    limits: UploadLimits,
    queue: Vec<PendingFile>,
    progress: Arc<Mutex<BatchProgress>>,
    observer: Option<ProgressObserver>,
    state: BatchState,
}

impl<T, R, S> BatchUploader<T, R, S>
where
    T: FileTransfer,
    R: TokenRefresher,
    S: SessionStore,
{
    /// Create an idle coordinator for the given target folder.
    pub fn new(transfer: T, refresher: R, store: S, folder_id: impl Into<String>) -> Self {
        Self {
            transfer,
            refresher,
            store,
            folder_id: folder_id.into(),
            limits: UploadLimits::default(),
            queue: Vec::new(),
            progress: Arc::new(Mutex::new(BatchProgress::default())),
            observer: None,
            state: BatchState::Idle,
        }
    }

    /// Override the selection limits.
    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Install a progress observer.
    pub fn with_observer(mut self, observer: impl Fn(&str, u8, u8) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Add a file to the selection.
    ///
    /// # Errors
    /// - `InvalidInput` if the selection is full or the file exceeds the
    ///   size limit
    pub fn enqueue(&mut self, file: PendingFile) -> Result<()> {
        if self.queue.len() >= self.limits.max_files {
            return Err(Error::InvalidInput(format!(
                "at most {} files per batch",
                self.limits.max_files
            )));
        }
        if file.size() > self.limits.max_file_size {
            return Err(Error::InvalidInput(format!(
                "{} is {} bytes, above the {} byte limit",
                file.name,
                file.size(),
                self.limits.max_file_size
            )));
        }
        self.queue.push(file);
        Ok(())
    }

    /// Remove a file from the selection before submission.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|file| file.name.as_str() != name);
        self.queue.len() != before
    }

    /// Files currently queued.
    pub fn queued(&self) -> &[PendingFile] {
        &self.queue
    }

    /// Current coordinator state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Snapshot of the current batch progress.
    pub fn progress(&self) -> BatchProgress {
        self.progress.lock().unwrap().clone()
    }

    /// Run the batch to completion.
    ///
    /// On success the queue is consumed and the report lists every file's
    /// outcome. A rejected refresh aborts immediately: already-attempted
    /// files are dropped from the queue, the unsent remainder (including
    /// the in-flight file) stays queued for after re-login.
    ///
    /// # Errors
    /// - `InvalidInput` on an empty selection (no network calls are made)
    /// - `ReauthRequired` when no session is stored or a refresh is
    ///   rejected by the provider
    pub async fn run(&mut self) -> Result<BatchReport> {
        if self.queue.is_empty() {
            return Err(Error::InvalidInput("no files selected".to_string()));
        }

        let mut session = self.store.load()?.ok_or_else(|| {
            Error::ReauthRequired("no stored session, log in first".to_string())
        })?;

        *self.progress.lock().unwrap() =
            BatchProgress::start(self.queue.iter().map(|f| f.name.to_string()));

        let total = self.queue.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut succeeded = 0;
        let mut index = 0;

        info!(files = total, folder_id = %self.folder_id, "starting batch upload");

        while index < total {
            self.state = BatchState::Uploading(index);
            let file = self.queue[index].clone();
            let name = file.name.to_string();
            debug!(file = %name, position = index + 1, total, "uploading");

            let sink = self.sink_for(&name);
            let result = self
                .transfer
                .upload(&session.tokens.access_token, &self.folder_id, &file, sink)
                .await;

            match result {
                Ok(outcome) => {
                    self.mark_complete(&name);
                    succeeded += 1;
                    outcomes.push(outcome);
                    index += 1;
                }
                Err(err) if err.is_auth_expired() => {
                    self.state = BatchState::RefreshingToken(index);
                    info!(file = %name, "access token expired, refreshing");

                    match self.refresher.refresh(&session.tokens.refresh_token).await {
                        Ok(pair) => {
                            session.tokens = pair;
                            self.store.save(&session)?;
                            // resubmit the same file; nothing was written
                        }
                        Err(refresh_err) => {
                            error!(error = %refresh_err, "token refresh rejected, aborting batch");
                            // keep the unsent remainder, including file `index`
                            self.queue.drain(..index);
                            self.state = BatchState::Idle;
                            return Err(Error::ReauthRequired(format!(
                                "token refresh failed, log in again: {}",
                                refresh_err
                            )));
                        }
                    }
                }
                Err(err) => {
                    warn!(file = %name, error = %err, "upload failed, continuing with next file");
                    self.mark_failed(&name);
                    failures.push(FileFailure {
                        name,
                        reason: err.to_string(),
                    });
                    index += 1;
                }
            }
        }

        self.state = BatchState::Done;
        self.queue.clear();

        let report = BatchReport {
            attempted: total,
            succeeded,
            failures,
            outcomes,
        };
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failures.len(),
            "batch complete"
        );

        self.state = BatchState::Idle;
        Ok(report)
    }

    fn sink_for(&self, name: &str) -> ProgressSink {
        let progress = self.progress.clone();
        let observer = self.observer.clone();
        let name = name.to_string();
        ProgressSink::new(move |pct| {
            let aggregate = {
                let mut progress = progress.lock().unwrap();
                progress.update_current(&name, pct);
                progress.aggregate()
            };
            if let Some(observer) = &observer {
                observer(&name, pct, aggregate);
            }
        })
    }

    fn mark_complete(&self, name: &str) {
        let aggregate = {
            let mut progress = self.progress.lock().unwrap();
            progress.complete_file(name);
            progress.aggregate()
        };
        if let Some(observer) = &self.observer {
            observer(name, 100, aggregate);
        }
    }

    fn mark_failed(&self, name: &str) {
        let aggregate = {
            let mut progress = self.progress.lock().unwrap();
            progress.fail_file(name);
            progress.aggregate()
        };
        if let Some(observer) = &self.observer {
            observer(name, 0, aggregate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use boxlift_common::FileName;
    use boxlift_provider::{Identity, RemoteFile, TokenPair};

    use crate::store::{MemorySessionStore, StoredSession};

    fn pending(name: &str) -> PendingFile {
        PendingFile::new(
            FileName::parse(name).unwrap(),
            "application/octet-stream",
            vec![0u8; 16],
        )
    }

    fn remote(name: &str) -> RemoteFile {
        RemoteFile {
            id: format!("id-{}", name),
            name: name.to_string(),
            size: 16,
            created_at: None,
            modified_at: None,
            etag: None,
            sequence_id: None,
            file_version: None,
        }
    }

    fn pair(n: u32) -> TokenPair {
        TokenPair {
            access_token: format!("access-{}", n),
            refresh_token: format!("refresh-{}", n),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
            acquired_at: Utc::now(),
        }
    }

    fn stored_session() -> StoredSession {
        StoredSession {
            tokens: pair(0),
            identity: Some(Identity {
                id: "1138".to_string(),
                name: "Ada".to_string(),
                login: "ada@example.com".to_string(),
            }),
        }
    }

    /// Per-file scripted responses; defaults to a created outcome.
    #[derive(Clone)]
    enum Step {
        Created,
        Versioned,
        AuthExpired,
        Denied,
    }

    #[derive(Default)]
    struct FakeTransfer {
        script: Mutex<HashMap<String, VecDeque<Step>>>,
        /// `(file name, access token)` per call, in order.
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeTransfer {
        fn script(self, name: &str, steps: &[Step]) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(name.to_string(), steps.iter().cloned().collect());
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl FileTransfer for FakeTransfer {
        async fn upload(
            &self,
            access_token: &str,
            _folder_id: &str,
            file: &PendingFile,
            progress: ProgressSink,
        ) -> boxlift_common::Result<UploadOutcome> {
            let name = file.name.to_string();
            self.calls
                .lock()
                .unwrap()
                .push((name.clone(), access_token.to_string()));

            let step = self
                .script
                .lock()
                .unwrap()
                .get_mut(&name)
                .and_then(|steps| steps.pop_front())
                .unwrap_or(Step::Created);

            progress.report(50);
            match step {
                Step::Created => {
                    progress.report(100);
                    Ok(UploadOutcome::Created { file: remote(&name) })
                }
                Step::Versioned => {
                    progress.report(100);
                    Ok(UploadOutcome::Versioned { file: remote(&name) })
                }
                Step::AuthExpired => Err(Error::AuthExpired {
                    body: "expired".to_string(),
                }),
                Step::Denied => Err(Error::AccessDenied {
                    body: "folder not shared".to_string(),
                }),
            }
        }
    }

    /// Refresher double enforcing the single-use refresh token law.
    struct FakeRefresher {
        consumed: Mutex<HashSet<String>>,
        issued: AtomicUsize,
        calls: Mutex<Vec<String>>,
        reject_all: bool,
    }

    impl FakeRefresher {
        fn new() -> Self {
            Self {
                consumed: Mutex::new(HashSet::new()),
                issued: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                reject_all: false,
            }
        }

        fn rejecting() -> Self {
            Self {
                reject_all: true,
                ..Self::new()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, refresh_token: &str) -> boxlift_common::Result<TokenPair> {
            self.calls.lock().unwrap().push(refresh_token.to_string());

            if self.reject_all {
                return Err(Error::AuthRefreshFailed {
                    status: 400,
                    body: "invalid_grant".to_string(),
                });
            }
            if !self.consumed.lock().unwrap().insert(refresh_token.to_string()) {
                return Err(Error::AuthRefreshFailed {
                    status: 400,
                    body: "refresh token already consumed".to_string(),
                });
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) as u32 + 1;
            Ok(pair(n))
        }
    }

    fn uploader(
        transfer: Arc<FakeTransfer>,
        refresher: Arc<FakeRefresher>,
        store: Arc<MemorySessionStore>,
    ) -> BatchUploader<Arc<FakeTransfer>, Arc<FakeRefresher>, Arc<MemorySessionStore>> {
        BatchUploader::new(transfer, refresher, store, "folder-1")
    }

    #[tokio::test]
    async fn test_empty_selection_makes_no_network_calls() {
        let transfer = Arc::new(FakeTransfer::default());
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let mut uploader = uploader(transfer.clone(), refresher.clone(), store);
        let err = uploader.run().await.unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(transfer.call_count(), 0);
        assert_eq!(refresher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_and_retries_same_file() {
        let transfer =
            Arc::new(FakeTransfer::default().script("two.txt", &[Step::AuthExpired, Step::Created]));
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let mut uploader = uploader(transfer.clone(), refresher.clone(), store.clone());
        for name in ["one.txt", "two.txt", "three.txt"] {
            uploader.enqueue(pending(name)).unwrap();
        }

        let report = uploader.run().await.unwrap();

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 3);
        assert!(report.failures.is_empty());
        assert_eq!(refresher.call_count(), 1);
        assert_eq!(uploader.progress().aggregate(), 100);

        // the retry targets the same file with the renewed token
        let calls = transfer.calls.lock().unwrap();
        let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["one.txt", "two.txt", "two.txt", "three.txt"]);
        assert_eq!(calls[1].1, "access-0");
        assert_eq!(calls[2].1, "access-1");

        // the renewed pair was persisted
        let session = store.load().unwrap().unwrap();
        assert_eq!(session.tokens.access_token, "access-1");
    }

    #[tokio::test]
    async fn test_one_bad_file_never_blocks_the_rest() {
        let transfer = Arc::new(FakeTransfer::default().script("one.txt", &[Step::Denied]));
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let mut uploader = uploader(transfer.clone(), refresher.clone(), store);
        uploader.enqueue(pending("one.txt")).unwrap();
        uploader.enqueue(pending("two.txt")).unwrap();

        let report = uploader.run().await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "one.txt");
        assert!(report.failures[0].reason.contains("access denied"));
        assert_eq!(refresher.call_count(), 0);

        let progress = uploader.progress();
        assert_eq!(progress.file_percent("one.txt"), Some(0));
        assert_eq!(progress.file_percent("two.txt"), Some(100));
        assert_eq!(progress.aggregate(), 100);
    }

    #[tokio::test]
    async fn test_rejected_refresh_aborts_and_keeps_unsent_queue() {
        let transfer = Arc::new(FakeTransfer::default().script("one.txt", &[Step::AuthExpired]));
        let refresher = Arc::new(FakeRefresher::rejecting());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let mut uploader = uploader(transfer.clone(), refresher.clone(), store.clone());
        uploader.enqueue(pending("one.txt")).unwrap();
        uploader.enqueue(pending("two.txt")).unwrap();

        let err = uploader.run().await.unwrap_err();
        assert!(matches!(err, Error::ReauthRequired(_)));

        // both files are still queued: nothing was sent successfully
        let queued: Vec<&str> = uploader.queued().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(queued, ["one.txt", "two.txt"]);

        // the stale pair was not replaced
        let session = store.load().unwrap().unwrap();
        assert_eq!(session.tokens.access_token, "access-0");
    }

    #[tokio::test]
    async fn test_abort_midway_drops_only_attempted_files() {
        let transfer =
            Arc::new(FakeTransfer::default().script("two.txt", &[Step::AuthExpired]));
        let refresher = Arc::new(FakeRefresher::rejecting());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let mut uploader = uploader(transfer, refresher, store);
        for name in ["one.txt", "two.txt", "three.txt"] {
            uploader.enqueue(pending(name)).unwrap();
        }

        let err = uploader.run().await.unwrap_err();
        assert!(matches!(err, Error::ReauthRequired(_)));

        let queued: Vec<&str> = uploader.queued().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(queued, ["two.txt", "three.txt"]);
    }

    #[tokio::test]
    async fn test_conflict_outcome_is_preserved_per_file() {
        let transfer = Arc::new(FakeTransfer::default().script("two.txt", &[Step::Versioned]));
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let mut uploader = uploader(transfer, refresher, store);
        for name in ["one.txt", "two.txt", "three.txt"] {
            uploader.enqueue(pending(name)).unwrap();
        }

        let report = uploader.run().await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert!(matches!(report.outcomes[0], UploadOutcome::Created { .. }));
        assert!(matches!(report.outcomes[1], UploadOutcome::Versioned { .. }));
        assert!(matches!(report.outcomes[2], UploadOutcome::Created { .. }));
    }

    #[tokio::test]
    async fn test_aggregate_progress_is_monotone_through_retry() {
        let transfer =
            Arc::new(FakeTransfer::default().script("two.txt", &[Step::AuthExpired, Step::Created]));
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::with_session(stored_session()));

        let aggregates = Arc::new(Mutex::new(Vec::new()));
        let observed = aggregates.clone();

        let mut uploader = BatchUploader::new(transfer, refresher, store, "folder-1")
            .with_observer(move |_, _, aggregate| observed.lock().unwrap().push(aggregate));
        for name in ["one.txt", "two.txt", "three.txt"] {
            uploader.enqueue(pending(name)).unwrap();
        }

        uploader.run().await.unwrap();

        let aggregates = aggregates.lock().unwrap();
        assert!(aggregates.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*aggregates.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_refresh_token_is_single_use_in_the_double() {
        let refresher = FakeRefresher::new();
        let first = refresher.refresh("refresh-0").await.unwrap();
        assert_ne!(first.refresh_token, "refresh-0");

        let reuse = refresher.refresh("refresh-0").await;
        assert!(matches!(reuse, Err(Error::AuthRefreshFailed { .. })));
    }

    #[tokio::test]
    async fn test_missing_session_is_reauth_not_network() {
        let transfer = Arc::new(FakeTransfer::default());
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::new());

        let mut uploader = uploader(transfer.clone(), refresher, store);
        uploader.enqueue(pending("one.txt")).unwrap();

        let err = uploader.run().await.unwrap_err();
        assert!(matches!(err, Error::ReauthRequired(_)));
        assert_eq!(transfer.call_count(), 0);
    }

    #[test]
    fn test_selection_limits() {
        let transfer = Arc::new(FakeTransfer::default());
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::new());

        let mut uploader = uploader(transfer, refresher, store).with_limits(UploadLimits {
            max_files: 2,
            max_file_size: 8,
        });

        let small = PendingFile::new(
            FileName::parse("small.bin").unwrap(),
            "application/octet-stream",
            vec![0u8; 8],
        );
        let big = PendingFile::new(
            FileName::parse("big.bin").unwrap(),
            "application/octet-stream",
            vec![0u8; 9],
        );

        assert!(uploader.enqueue(small.clone()).is_ok());
        assert!(uploader.enqueue(big).is_err());
        assert!(uploader.enqueue(small.clone()).is_ok());
        // selection full
        assert!(uploader.enqueue(small).is_err());
    }

    #[test]
    fn test_remove_before_submission() {
        let transfer = Arc::new(FakeTransfer::default());
        let refresher = Arc::new(FakeRefresher::new());
        let store = Arc::new(MemorySessionStore::new());

        let mut uploader = uploader(transfer, refresher, store);
        assert_eq!(uploader.state(), BatchState::Idle);

        uploader.enqueue(pending("one.txt")).unwrap();
        uploader.enqueue(pending("two.txt")).unwrap();

        assert!(uploader.remove("one.txt"));
        assert!(!uploader.remove("one.txt"));
        assert_eq!(uploader.queued().len(), 1);
    }
}
