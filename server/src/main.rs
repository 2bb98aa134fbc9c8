//! Boxlift server binary.
//!
//! Wires together the token-lifecycle and upload routes over the Box
//! provider services, configured entirely from CLI flags or environment
//! variables.

mod auth;
mod config;
mod error;
mod logging;
mod state;
mod upload;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use boxlift_provider::{AuthConfig, AuthService, BoxClient};

use crate::config::Args;
use crate::state::{AppState, ServerSettings};

/// Starts the Boxlift server and blocks until shutdown.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let args = Args::parse();
    let endpoints = args.endpoints();

    let auth = AuthService::new(
        AuthConfig {
            client_id: args.client_id.clone(),
            client_secret: args.client_secret.clone(),
            redirect_uri: args.redirect_uri.clone(),
        },
        endpoints.clone(),
    )?;
    let client = BoxClient::new(endpoints);

    let settings = ServerSettings {
        folder_id: args.folder_id.clone(),
        max_files: args.max_files,
        max_file_size: args.max_file_size,
        success_redirect: args.success_redirect.clone(),
        failure_redirect: args.failure_redirect.clone(),
    };

    // Multipart framing overhead on top of the raw payload cap.
    let body_limit = args
        .max_file_size
        .saturating_mul(args.max_files as u64)
        .saturating_add(1024 * 1024) as usize;

    let app_state = Arc::new(AppState {
        auth,
        client,
        settings,
    });

    let app = Router::new()
        .route("/auth/callback", get(auth::oauth_callback))
        .route("/auth/token", post(auth::exchange_token))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/user", post(auth::user_info))
        .route("/upload/file", post(upload::upload_file))
        .route("/upload/files", post(upload::upload_files))
        .route("/upload/folder-info", post(upload::folder_info))
        .route("/upload/test-token", post(upload::test_token))
        .route("/upload/list-files", post(upload::list_files))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, folder_id = %args.folder_id, "boxlift server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
