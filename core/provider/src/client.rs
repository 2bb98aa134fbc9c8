//! Box API client: uploads with conflict resolution, folder metadata,
//! listing, and token probing.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use boxlift_common::{Error, FileName, Result};

use crate::endpoints::BoxEndpoints;
use crate::transfer::ProgressSink;

/// Bounded timeout for upload and metadata calls. Expiry is a generic
/// failure, never `AuthExpired`.
const UPLOAD_TIMEOUT_SECS: u64 = 300;

/// Chunk size for the progress-observing request body.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Field selection for folder listings.
const LIST_FIELDS: &str = "id,name,size,created_at,modified_at,etag,sequence_id,file_version";

/// A local file awaiting upload. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub name: FileName,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl PendingFile {
    pub fn new(name: FileName, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name,
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// File version metadata attached to a listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub version_number: Option<String>,
}

/// A file entry in the target folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub sequence_id: Option<String>,
    #[serde(default)]
    pub file_version: Option<FileVersion>,
}

impl RemoteFile {
    /// Display version number.
    ///
    /// Prefers the explicit version record; sequence id and etag are
    /// zero-based counters, so both are offset by one.
    pub fn version_number(&self) -> u64 {
        if let Some(n) = self
            .file_version
            .as_ref()
            .and_then(|fv| fv.version_number.as_deref())
            .and_then(|v| v.parse::<u64>().ok())
        {
            return n;
        }
        if let Some(seq) = self.sequence_id.as_deref().and_then(|s| s.parse::<u64>().ok()) {
            return seq + 1;
        }
        if let Some(etag) = self.etag.as_deref().and_then(|s| s.parse::<u64>().ok()) {
            return etag + 1;
        }
        1
    }
}

/// Terminal result of one upload, covering all three success shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Fresh file created under its original name.
    Created { file: RemoteFile },
    /// Name collision resolved as a new version of the existing file.
    Versioned { file: RemoteFile },
    /// Name collision resolved by a timestamp rename.
    Renamed { file: RemoteFile, renamed_to: String },
}

impl UploadOutcome {
    /// The uploaded file, whichever path produced it.
    pub fn file(&self) -> &RemoteFile {
        match self {
            UploadOutcome::Created { file }
            | UploadOutcome::Versioned { file }
            | UploadOutcome::Renamed { file, .. } => file,
        }
    }
}

/// Existing-file reference extracted from a name-conflict response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictContext {
    /// Remote id of the conflicting file, when the provider supplies it.
    pub existing_id: Option<String>,
}

impl ConflictContext {
    /// Parse the `context_info.conflicts` entry of a 409 body. The provider
    /// reports a single conflict as an object and multiple as an array.
    pub fn from_body(body: &str) -> Self {
        let existing_id = serde_json::from_str::<Value>(body).ok().and_then(|v| {
            let conflicts = v.get("context_info")?.get("conflicts")?;
            let entry = match conflicts {
                Value::Array(items) => items.first()?,
                other => other,
            };
            entry.get("id").and_then(Value::as_str).map(str::to_string)
        });
        Self { existing_id }
    }
}

/// Target folder metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub etag: Option<String>,
}

/// Folder listing with the provider's total count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<RemoteFile>,
    pub total: u64,
}

/// Typed token-probe payload for debug tooling; never an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenProbe {
    pub valid: bool,
    #[serde(default)]
    pub identity: Option<crate::auth::Identity>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response envelope of the upload endpoints.
#[derive(Debug, Deserialize)]
struct UploadEntries {
    entries: Vec<RemoteFile>,
}

/// Response envelope of the folder items endpoint.
#[derive(Debug, Deserialize)]
struct FolderItems {
    entries: Vec<RemoteFile>,
    #[serde(default)]
    total_count: u64,
}

/// Upload Orchestration Service against the Box API.
///
/// Stateless: the bearer token and target folder are explicit parameters on
/// every call so independent callers never cross-talk.
pub struct BoxClient {
    http: Client,
    endpoints: BoxEndpoints,
}

impl BoxClient {
    /// Create a new client.
    pub fn new(endpoints: BoxEndpoints) -> Self {
        let http = Client::builder()
            .user_agent("Boxlift/0.1")
            .timeout(std::time::Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self { http, endpoints }
    }

    /// Create with default provider endpoints.
    pub fn with_default_endpoints() -> Self {
        Self::new(BoxEndpoints::default())
    }

    /// Upload one file into the target folder, resolving name conflicts.
    ///
    /// On a name conflict the provider either names the existing file (a
    /// new version is uploaded under the original name) or does not (the
    /// create is re-issued once with a timestamped name). Resolution is
    /// attempted at most once; its own failure is terminal.
    ///
    /// # Errors
    /// - `AuthExpired` on 401 — not retried here, propagates so the caller
    ///   can refresh and resubmit the whole file
    /// - `AccessDenied` on 403, `BadRequest` on 400
    /// - `NameConflictUnresolved` when the resolution step fails
    /// - `UploadFailed` for any other non-success status
    pub async fn upload(
        &self,
        access_token: &str,
        folder_id: &str,
        file: &PendingFile,
        progress: ProgressSink,
    ) -> Result<UploadOutcome> {
        debug!(name = %file.name, size = file.size(), folder_id, "uploading file");

        let response = self
            .send_create(access_token, folder_id, &file.name, file, &progress)
            .await?;

        let status = response.status();
        if status.is_success() {
            let remote = self.parse_upload_response(response).await?;
            return Ok(UploadOutcome::Created { file: remote });
        }

        if status == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            return self
                .resolve_conflict(access_token, folder_id, file, &body, &progress)
                .await;
        }

        Err(self.upload_error(status, response).await)
    }

    /// Upload all files concurrently. All-or-nothing: any single failure
    /// fails the whole call. Outcomes are returned in input order.
    ///
    /// The batch coordinator's sequential, resumable path does not go
    /// through here; this serves the bulk HTTP endpoint.
    pub async fn upload_batch(
        &self,
        access_token: &str,
        folder_id: &str,
        files: &[PendingFile],
    ) -> Result<Vec<UploadOutcome>> {
        let uploads = files
            .iter()
            .map(|file| self.upload(access_token, folder_id, file, ProgressSink::noop()));
        futures::future::try_join_all(uploads).await
    }

    /// Get target folder metadata.
    pub async fn folder_info(&self, access_token: &str, folder_id: &str) -> Result<FolderInfo> {
        let response = self
            .http
            .get(self.endpoints.folder_url(folder_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| Error::Network(format!("folder info request failed: {}", e)))?;

        self.handle_response(response).await
    }

    /// List the target folder, newest first.
    pub async fn list_folder(&self, access_token: &str, folder_id: &str) -> Result<FileListing> {
        let response = self
            .http
            .get(self.endpoints.folder_items_url(folder_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .query(&[
                ("fields", LIST_FIELDS),
                ("limit", "100"),
                ("sort", "date"),
                ("direction", "DESC"),
            ])
            .send()
            .await
            .map_err(|e| Error::Network(format!("list request failed: {}", e)))?;

        let items: FolderItems = self.handle_response(response).await?;
        Ok(FileListing {
            files: items.entries,
            total: items.total_count,
        })
    }

    /// Check whether an access token is currently usable.
    ///
    /// Debug tooling treats failure as informational, so this returns a
    /// typed payload instead of an error.
    pub async fn probe_token(&self, access_token: &str) -> TokenProbe {
        let response = self
            .http
            .get(&self.endpoints.user_info_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                match response.json::<crate::auth::Identity>().await {
                    Ok(identity) => TokenProbe {
                        valid: true,
                        identity: Some(identity),
                        error: None,
                    },
                    Err(e) => TokenProbe {
                        valid: false,
                        identity: None,
                        error: Some(format!("malformed identity response: {}", e)),
                    },
                }
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                TokenProbe {
                    valid: false,
                    identity: None,
                    error: Some(format!("{}: {}", status, body)),
                }
            }
            Err(e) => TokenProbe {
                valid: false,
                identity: None,
                error: Some(format!("request failed: {}", e)),
            },
        }
    }

    /// Resolve a 409 for `file`, at most once.
    async fn resolve_conflict(
        &self,
        access_token: &str,
        folder_id: &str,
        file: &PendingFile,
        conflict_body: &str,
        progress: &ProgressSink,
    ) -> Result<UploadOutcome> {
        let context = ConflictContext::from_body(conflict_body);

        match context.existing_id {
            Some(existing_id) => {
                debug!(name = %file.name, existing_id = %existing_id, "name in use, uploading new version");
                let remote = self
                    .upload_version(access_token, &existing_id, file, progress)
                    .await
                    .map_err(terminal_resolution_error)?;
                Ok(UploadOutcome::Versioned { file: remote })
            }
            None => {
                let renamed = file.name.timestamped(Utc::now().timestamp_millis());
                warn!(name = %file.name, renamed = %renamed, "conflict without file id, renaming");

                let response = self
                    .send_create(access_token, folder_id, &renamed, file, progress)
                    .await
                    .map_err(terminal_resolution_error)?;

                let status = response.status();
                if !status.is_success() {
                    return Err(terminal_resolution_error(
                        self.upload_error(status, response).await,
                    ));
                }

                let remote = self.parse_upload_response(response).await?;
                Ok(UploadOutcome::Renamed {
                    file: remote,
                    renamed_to: renamed.as_str().to_string(),
                })
            }
        }
    }

    /// Upload a new version of an existing file; only the file part is
    /// sent, the name is preserved.
    async fn upload_version(
        &self,
        access_token: &str,
        file_id: &str,
        file: &PendingFile,
        progress: &ProgressSink,
    ) -> Result<RemoteFile> {
        let boundary = form_boundary();
        let body = multipart_file_part(&boundary, &file.name, file);

        let response = self
            .http
            .post(self.endpoints.version_upload_url(file_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .header(header::CONTENT_LENGTH, body.len() as u64)
            .body(progress_body(body, progress.clone()))
            .send()
            .await
            .map_err(|e| Error::Network(format!("version upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.upload_error(status, response).await);
        }

        self.parse_upload_response(response).await
    }

    /// POST the create-file multipart request. The `attributes` part must
    /// precede the file part; the endpoint is order-sensitive.
    async fn send_create(
        &self,
        access_token: &str,
        folder_id: &str,
        upload_name: &FileName,
        file: &PendingFile,
        progress: &ProgressSink,
    ) -> Result<reqwest::Response> {
        let attributes = serde_json::json!({
            "name": upload_name.as_str(),
            "parent": { "id": folder_id }
        });
        let attributes_json = serde_json::to_string(&attributes)
            .map_err(|e| Error::Serialization(format!("failed to serialize attributes: {}", e)))?;

        let boundary = form_boundary();
        let body = multipart_create_body(&boundary, &attributes_json, upload_name, file);

        self.http
            .post(self.endpoints.upload_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .header(header::CONTENT_LENGTH, body.len() as u64)
            .body(progress_body(body, progress.clone()))
            .send()
            .await
            .map_err(|e| Error::Network(format!("upload request failed: {}", e)))
    }

    /// Parse the one-entry envelope of the upload endpoints.
    async fn parse_upload_response(&self, response: reqwest::Response) -> Result<RemoteFile> {
        let entries: UploadEntries = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("malformed upload response: {}", e)))?;

        entries
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| Error::Serialization("upload response contained no entries".to_string()))
    }

    /// Map an upload failure status into the error taxonomy.
    async fn upload_error(&self, status: StatusCode, response: reqwest::Response) -> Error {
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED => Error::AuthExpired { body },
            StatusCode::FORBIDDEN => Error::AccessDenied { body },
            StatusCode::BAD_REQUEST => Error::BadRequest { body },
            _ => Error::UploadFailed {
                status: status.as_u16(),
                body,
            },
        }
    }

    /// Handle a metadata API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("malformed response: {}", e)))
        } else {
            Err(self.upload_error(status, response).await)
        }
    }
}

/// Terminal wrapper for failures inside conflict resolution. A 401 keeps
/// its identity so the caller can still refresh and resubmit the file.
fn terminal_resolution_error(err: Error) -> Error {
    if err.is_auth_expired() {
        err
    } else {
        Error::NameConflictUnresolved(err.to_string())
    }
}

/// Unique multipart boundary.
fn form_boundary() -> String {
    format!("boxlift-{}", Uuid::new_v4().simple())
}

/// Build the create-file body: JSON `attributes` part strictly before the
/// file part.
fn multipart_create_body(
    boundary: &str,
    attributes_json: &str,
    upload_name: &FileName,
    file: &PendingFile,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(file.bytes.len() + 512);

    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"attributes\"\r\n\r\n");
    body.extend_from_slice(attributes_json.as_bytes());
    body.extend_from_slice(b"\r\n");

    append_file_part(&mut body, boundary, upload_name, file);

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

/// Build a body with only the file part, for version uploads.
fn multipart_file_part(boundary: &str, upload_name: &FileName, file: &PendingFile) -> Vec<u8> {
    let mut body = Vec::with_capacity(file.bytes.len() + 256);
    append_file_part(&mut body, boundary, upload_name, file);
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

fn append_file_part(body: &mut Vec<u8>, boundary: &str, upload_name: &FileName, file: &PendingFile) {
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            upload_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.mime_type).as_bytes());
    body.extend_from_slice(&file.bytes);
    body.extend_from_slice(b"\r\n");
}

/// Wrap a prebuilt body in a chunked stream that reports the sent fraction.
fn progress_body(body: Vec<u8>, progress: ProgressSink) -> reqwest::Body {
    reqwest::Body::wrap_stream(chunked_with_progress(body, progress))
}

/// Split a body into fixed-size chunks, reporting cumulative percentage as
/// each chunk is handed to the transport.
fn chunked_with_progress(
    body: Vec<u8>,
    progress: ProgressSink,
) -> impl futures::Stream<Item = std::result::Result<Bytes, std::convert::Infallible>> {
    let total = body.len().max(1);
    let chunks: Vec<Bytes> = body
        .chunks(UPLOAD_CHUNK_SIZE)
        .map(Bytes::copy_from_slice)
        .collect();

    let mut sent = 0usize;
    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        sent += chunk.len();
        progress.report(((sent * 100) / total) as u8);
        Ok(chunk)
    }))
}
