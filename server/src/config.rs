//! CLI arguments and server configuration defaults.

use clap::Parser;

use boxlift_provider::BoxEndpoints;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5;
pub const DEFAULT_SUCCESS_REDIRECT: &str = "http://localhost:4200/dashboard";
pub const DEFAULT_FAILURE_REDIRECT: &str = "http://localhost:4200/login";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "boxlift-server", version, about = "Boxlift upload service")]
pub struct Args {
    #[arg(long, env = "BOXLIFT_CLIENT_ID", help = "OAuth2 client id")]
    pub client_id: String,
    #[arg(long, env = "BOXLIFT_CLIENT_SECRET", help = "OAuth2 client secret")]
    pub client_secret: String,
    #[arg(
        long,
        env = "BOXLIFT_REDIRECT_URI",
        help = "Redirect URI registered for the OAuth2 callback"
    )]
    pub redirect_uri: String,
    #[arg(long, env = "BOXLIFT_FOLDER_ID", help = "Target folder id")]
    pub folder_id: String,
    #[arg(
        short = 'b',
        long,
        env = "BOXLIFT_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "BOXLIFT_PORT",
        default_value_t = 3000,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "BOXLIFT_MAX_FILE_SIZE",
        default_value_t = DEFAULT_MAX_FILE_SIZE,
        help = "Max single-file size in bytes"
    )]
    pub max_file_size: u64,
    #[arg(
        long,
        env = "BOXLIFT_MAX_FILES",
        default_value_t = DEFAULT_MAX_FILES,
        help = "Max files per batch request"
    )]
    pub max_files: usize,
    #[arg(
        long,
        env = "BOXLIFT_SUCCESS_REDIRECT",
        default_value = DEFAULT_SUCCESS_REDIRECT,
        help = "Destination after a successful login"
    )]
    pub success_redirect: String,
    #[arg(
        long,
        env = "BOXLIFT_FAILURE_REDIRECT",
        default_value = DEFAULT_FAILURE_REDIRECT,
        help = "Destination after a failed login"
    )]
    pub failure_redirect: String,
    #[arg(long, env = "BOXLIFT_AUTHORIZE_URL", help = "Provider authorize URL override")]
    pub authorize_url: Option<String>,
    #[arg(long, env = "BOXLIFT_TOKEN_URL", help = "Provider token URL override")]
    pub token_url: Option<String>,
    #[arg(long, env = "BOXLIFT_REVOKE_URL", help = "Provider revoke URL override")]
    pub revoke_url: Option<String>,
    #[arg(long, env = "BOXLIFT_USER_INFO_URL", help = "Provider identity URL override")]
    pub user_info_url: Option<String>,
    #[arg(long, env = "BOXLIFT_API_BASE_URL", help = "Provider API base URL override")]
    pub api_base_url: Option<String>,
    #[arg(long, env = "BOXLIFT_UPLOAD_BASE_URL", help = "Provider upload base URL override")]
    pub upload_base_url: Option<String>,
}

impl Args {
    /// Provider endpoints with any configured overrides applied.
    pub fn endpoints(&self) -> BoxEndpoints {
        let mut endpoints = BoxEndpoints::default();
        if let Some(url) = &self.authorize_url {
            endpoints.authorize_url = url.clone();
        }
        if let Some(url) = &self.token_url {
            endpoints.token_url = url.clone();
        }
        if let Some(url) = &self.revoke_url {
            endpoints.revoke_url = url.clone();
        }
        if let Some(url) = &self.user_info_url {
            endpoints.user_info_url = url.clone();
        }
        if let Some(url) = &self.api_base_url {
            endpoints.api_base_url = url.clone();
        }
        if let Some(url) = &self.upload_base_url {
            endpoints.upload_base_url = url.clone();
        }
        endpoints
    }
}
