//! Provider endpoint set with environment-overridable defaults.

use serde::{Deserialize, Serialize};

/// Box OAuth2 authorization endpoint.
const BOX_AUTHORIZE_URL: &str = "https://account.box.com/api/oauth2/authorize";
/// Box OAuth2 token endpoint (exchange and refresh grants).
const BOX_TOKEN_URL: &str = "https://api.box.com/oauth2/token";
/// Box OAuth2 revocation endpoint.
const BOX_REVOKE_URL: &str = "https://api.box.com/oauth2/revoke";
/// Box content API base URL.
const BOX_API_BASE: &str = "https://api.box.com/2.0";
/// Box upload API base URL.
const BOX_UPLOAD_BASE: &str = "https://upload.box.com/api/2.0";

/// Full endpoint set used by [`crate::AuthService`] and [`crate::BoxClient`].
///
/// Defaults target the public Box API; every URL can be overridden for
/// testing or regional deployments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub user_info_url: String,
    pub api_base_url: String,
    pub upload_base_url: String,
}

impl Default for BoxEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: BOX_AUTHORIZE_URL.to_string(),
            token_url: BOX_TOKEN_URL.to_string(),
            revoke_url: BOX_REVOKE_URL.to_string(),
            user_info_url: format!("{}/users/me", BOX_API_BASE),
            api_base_url: BOX_API_BASE.to_string(),
            upload_base_url: BOX_UPLOAD_BASE.to_string(),
        }
    }
}

impl BoxEndpoints {
    /// URL for creating a new file in a folder.
    pub fn upload_url(&self) -> String {
        format!("{}/files/content", self.upload_base_url)
    }

    /// URL for uploading a new version of an existing file.
    pub fn version_upload_url(&self, file_id: &str) -> String {
        format!("{}/files/{}/content", self.upload_base_url, file_id)
    }

    /// URL for folder metadata.
    pub fn folder_url(&self, folder_id: &str) -> String {
        format!("{}/folders/{}", self.api_base_url, folder_id)
    }

    /// URL for listing folder items.
    pub fn folder_items_url(&self, folder_id: &str) -> String {
        format!("{}/folders/{}/items", self.api_base_url, folder_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let endpoints = BoxEndpoints::default();
        assert_eq!(endpoints.upload_url(), "https://upload.box.com/api/2.0/files/content");
        assert_eq!(
            endpoints.version_upload_url("42"),
            "https://upload.box.com/api/2.0/files/42/content"
        );
        assert_eq!(endpoints.folder_items_url("7"), "https://api.box.com/2.0/folders/7/items");
        assert_eq!(endpoints.user_info_url, "https://api.box.com/2.0/users/me");
    }
}
