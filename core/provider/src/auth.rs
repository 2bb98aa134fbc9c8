//! OAuth2 authentication and token lifecycle against the Box API.
//!
//! All operations are side-effect-free with respect to local state: they
//! perform outbound calls and return data. Callers own retry policy and
//! token persistence.

use chrono::{DateTime, Duration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, RedirectUrl};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use url::Url;

use boxlift_common::{Error, Result};

use crate::endpoints::BoxEndpoints;

/// Bounded timeout for every token-lifecycle call.
const AUTH_TIMEOUT_SECS: u64 = 30;

/// Access/refresh token pair returned by exchange or refresh.
///
/// A refresh supersedes the pair wholesale: the provider invalidates the
/// consumed refresh token, so a pair must never be reused after handing its
/// refresh token to [`AuthService::refresh`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token for API requests.
    pub access_token: String,
    /// Single-use token for obtaining the next pair.
    pub refresh_token: String,
    /// Access-token lifetime in seconds, from acquisition.
    pub expires_in: u64,
    /// Token type, `"Bearer"` for this provider.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// When this pair was acquired. Not part of the wire response; stamped
    /// at deserialization time.
    #[serde(default = "Utc::now")]
    pub acquired_at: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenPair {
    /// When the access token expires.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + Duration::seconds(self.expires_in as i64)
    }

    /// Check if the access token is expired or about to expire.
    pub fn is_expiring(&self) -> bool {
        // Consider stale with less than 5 minutes remaining
        self.expires_at() < Utc::now() + Duration::minutes(5)
    }
}

/// Authenticated user resolved from the provider's identity endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub login: String,
}

/// OAuth2 application credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URL registered with the provider for the OAuth2 callback.
    pub redirect_uri: String,
}

/// Token Exchange Service: code exchange, refresh, identity, revocation.
///
/// The authorization URL is built through `oauth2` with a random CSRF
/// state; the grants themselves are form posts against the token endpoint
/// so failures keep the provider's status and raw body.
pub struct AuthService {
    authorize_endpoint: AuthUrl,
    redirect_endpoint: RedirectUrl,
    http: Client,
    config: AuthConfig,
    endpoints: BoxEndpoints,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(config: AuthConfig, endpoints: BoxEndpoints) -> Result<Self> {
        let authorize_endpoint = AuthUrl::new(endpoints.authorize_url.clone())
            .map_err(|e| Error::InvalidInput(format!("invalid authorize URL: {}", e)))?;
        let redirect_endpoint = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| Error::InvalidInput(format!("invalid redirect URL: {}", e)))?;

        let http = Client::builder()
            .user_agent("Boxlift/0.1")
            .timeout(std::time::Duration::from_secs(AUTH_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Ok(Self {
            authorize_endpoint,
            redirect_endpoint,
            http,
            config,
            endpoints,
        })
    }

    /// Create with default provider endpoints.
    pub fn with_default_endpoints(config: AuthConfig) -> Result<Self> {
        Self::new(config, BoxEndpoints::default())
    }

    /// Generate the authorization URL for the user to visit.
    ///
    /// Returns the URL and a CSRF state that should be verified on callback.
    pub fn authorization_url(&self) -> (Url, String) {
        let client = BasicClient::new(ClientId::new(self.config.client_id.clone()))
            .set_auth_uri(self.authorize_endpoint.clone())
            .set_redirect_uri(self.redirect_endpoint.clone());

        let (auth_url, csrf_token) = client.authorize_url(CsrfToken::new_random).url();
        (auth_url, csrf_token.secret().clone())
    }

    /// Exchange an authorization code for a token pair.
    ///
    /// # Errors
    /// - `AuthExchangeFailed` with the provider's status and raw body on any
    ///   non-success response
    /// - `Network` if the endpoint is unreachable or times out
    pub async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Network(format!("token exchange request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| Error::Serialization(format!("malformed token response: {}", e)))
    }

    /// Obtain a fresh pair from a refresh token.
    ///
    /// The returned pair **replaces** the caller's current pair; the
    /// submitted refresh token is consumed by the provider and must not be
    /// reused.
    ///
    /// # Errors
    /// - `AuthRefreshFailed` with the provider's status and raw body
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Network(format!("token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthRefreshFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenPair>()
            .await
            .map_err(|e| Error::Serialization(format!("malformed refresh response: {}", e)))
    }

    /// Resolve the identity behind an access token.
    pub async fn fetch_identity(&self, access_token: &str) -> Result<Identity> {
        let response = self
            .http
            .get(&self.endpoints.user_info_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| Error::Network(format!("identity request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::IdentityLookupFailed {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Identity>()
            .await
            .map_err(|e| Error::Serialization(format!("malformed identity response: {}", e)))
    }

    /// Revoke an access token.
    ///
    /// Best-effort: callers should log the failure and proceed with logout.
    pub async fn revoke(&self, access_token: &str) -> Result<()> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("token", access_token),
        ];

        let response = self
            .http
            .post(&self.endpoints.revoke_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Network(format!("revocation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RevokeFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            client_id: "test_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        }
    }

    #[test]
    fn test_token_pair_expiration() {
        let expired = TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
            acquired_at: Utc::now() - Duration::hours(2),
        };
        assert!(expired.is_expiring());

        let valid = TokenPair {
            acquired_at: Utc::now(),
            ..expired
        };
        assert!(!valid.is_expiring());
    }

    #[test]
    fn test_token_pair_near_expiration() {
        // 4 minutes remaining is inside the 5 minute leeway
        let pair = TokenPair {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: 240,
            token_type: "Bearer".to_string(),
            acquired_at: Utc::now(),
        };
        assert!(pair.is_expiring());
    }

    #[test]
    fn test_token_pair_from_wire_response() {
        let json = r#"{
            "access_token": "AT",
            "refresh_token": "RT",
            "expires_in": 4245,
            "token_type": "bearer"
        }"#;
        let pair: TokenPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair.access_token, "AT");
        assert_eq!(pair.refresh_token, "RT");
        assert_eq!(pair.expires_in, 4245);
        // acquired_at is stamped at parse time
        assert!(pair.expires_at() > Utc::now());
    }

    #[test]
    fn test_identity_deserialization() {
        let json = r#"{"type":"user","id":"1138","name":"Ada","login":"ada@example.com"}"#;
        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.id, "1138");
        assert_eq!(identity.login, "ada@example.com");
    }

    #[test]
    fn test_authorization_url_generation() {
        let service = AuthService::with_default_endpoints(test_config()).unwrap();
        let (url, state) = service.authorization_url();

        assert!(url.as_str().contains("account.box.com"));
        assert!(url.as_str().contains("client_id=test_id"));
        assert!(url.as_str().contains("response_type=code"));
        assert!(!state.is_empty());
    }

    #[test]
    fn test_distinct_csrf_states() {
        let service = AuthService::with_default_endpoints(test_config()).unwrap();
        let (_, first) = service.authorization_url();
        let (_, second) = service.authorization_url();
        assert_ne!(first, second);
    }
}
