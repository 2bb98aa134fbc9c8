//! Upload and folder routes.
//!
//! The single- and multi-file routes validate the request against the
//! configured limits before anything is sent upstream. Folder info,
//! listing, and token probing are debug tooling: their failures come back
//! as typed payloads, not HTTP errors.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use boxlift_common::{Error, FileName};
use boxlift_provider::{
    FolderInfo, PendingFile, ProgressSink, RemoteFile, TokenProbe, UploadOutcome,
};

use crate::auth::AccessTokenRequest;
use crate::error::ApiError;
use crate::state::{AppState, ServerSettings};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: UploadOutcome,
}

#[derive(Debug, Serialize)]
pub struct UploadsResponse {
    pub success: bool,
    pub files: Vec<UploadOutcome>,
}

#[derive(Debug, Serialize)]
pub struct FolderInfoResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListFilesResponse {
    pub success: bool,
    pub files: Vec<RemoteFile>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenTestResponse {
    pub success: bool,
    pub token_test: TokenProbe,
}

/// `POST /upload/file` — upload exactly one file.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (token, mut files) = read_upload_form(&mut multipart, &state.settings).await?;
    if files.len() != 1 {
        return Err(Error::InvalidInput("exactly one file expected".to_string()).into());
    }
    let file = files.remove(0);

    let outcome = state
        .client
        .upload(&token, &state.settings.folder_id, &file, ProgressSink::noop())
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        file: outcome,
    }))
}

/// `POST /upload/files` — upload a batch concurrently.
///
/// All-or-nothing: any single failure fails the call. Outcomes come back
/// in input order.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadsResponse>, ApiError> {
    let (token, files) = read_upload_form(&mut multipart, &state.settings).await?;

    debug!(count = files.len(), "bulk upload");
    let outcomes = state
        .client
        .upload_batch(&token, &state.settings.folder_id, &files)
        .await?;

    Ok(Json(UploadsResponse {
        success: true,
        files: outcomes,
    }))
}

/// `POST /upload/folder-info` — target folder metadata.
pub async fn folder_info(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AccessTokenRequest>,
) -> Json<FolderInfoResponse> {
    match state
        .client
        .folder_info(&body.access_token, &state.settings.folder_id)
        .await
    {
        Ok(folder) => Json(FolderInfoResponse {
            success: true,
            folder: Some(folder),
            error: None,
        }),
        Err(err) => {
            warn!(error = %err, "folder info lookup failed");
            Json(FolderInfoResponse {
                success: false,
                folder: None,
                error: Some(err.to_string()),
            })
        }
    }
}

/// `POST /upload/list-files` — list the target folder, newest first.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AccessTokenRequest>,
) -> Json<ListFilesResponse> {
    match state
        .client
        .list_folder(&body.access_token, &state.settings.folder_id)
        .await
    {
        Ok(listing) => Json(ListFilesResponse {
            success: true,
            files: listing.files,
            total: listing.total,
            error: None,
        }),
        Err(err) => {
            warn!(error = %err, "folder listing failed");
            Json(ListFilesResponse {
                success: false,
                files: Vec::new(),
                total: 0,
                error: Some(err.to_string()),
            })
        }
    }
}

/// `POST /upload/test-token` — probe whether an access token is usable.
pub async fn test_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AccessTokenRequest>,
) -> Json<TokenTestResponse> {
    let probe = state.client.probe_token(&body.access_token).await;
    Json(TokenTestResponse {
        success: true,
        token_test: probe,
    })
}

/// Pull the access token and file parts out of a multipart request,
/// enforcing the configured limits.
async fn read_upload_form(
    multipart: &mut Multipart,
    settings: &ServerSettings,
) -> Result<(String, Vec<PendingFile>), ApiError> {
    let mut token: Option<String> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "access_token" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("unreadable token field: {}", e)))?;
                token = Some(value);
            }
            "file" | "files" => {
                if files.len() >= settings.max_files {
                    return Err(Error::InvalidInput(format!(
                        "at most {} files per request",
                        settings.max_files
                    ))
                    .into());
                }

                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| Error::InvalidInput("file field has no filename".to_string()))?;
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::InvalidInput(format!("unreadable file field: {}", e)))?;

                if bytes.len() as u64 > settings.max_file_size {
                    return Err(Error::InvalidInput(format!(
                        "{} is {} bytes, above the {} byte limit",
                        file_name,
                        bytes.len(),
                        settings.max_file_size
                    ))
                    .into());
                }

                let file_name = FileName::parse(file_name)?;
                files.push(PendingFile::new(file_name, mime_type, bytes));
            }
            _ => {}
        }
    }

    let token = token.ok_or_else(|| Error::InvalidInput("access token is required".to_string()))?;
    if files.is_empty() {
        return Err(Error::InvalidInput("no files provided".to_string()).into());
    }

    Ok((token, files))
}
