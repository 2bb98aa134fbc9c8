//! Shared application state.

use boxlift_provider::{AuthService, BoxClient};

/// Upload and redirect policy resolved from configuration.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub folder_id: String,
    pub max_files: usize,
    pub max_file_size: u64,
    pub success_redirect: String,
    pub failure_redirect: String,
}

/// State handed to every handler. The services are stateless per call, so
/// concurrent requests from independent clients never cross-talk.
pub struct AppState {
    pub auth: AuthService,
    pub client: BoxClient,
    pub settings: ServerSettings,
}
