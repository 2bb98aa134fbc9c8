//! Token-lifecycle routes: OAuth callback, exchange, refresh, identity.

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use boxlift_provider::{Identity, TokenPair};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters delivered by the provider's redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct AccessTokenRequest {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenPairResponse {
    pub success: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

impl From<TokenPair> for TokenPairResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            success: true,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: Identity,
}

/// `GET /auth/callback` — receives the provider's redirect.
///
/// Success forwards to the configured destination with the pair and
/// identity as query parameters. Failures forward to the failure
/// destination with an opaque code; provider details stay in the server
/// log, never in the browser URL.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    if let Some(error) = query.error {
        warn!(error = %error, "provider reported an authorization error");
        return redirect_with_params(&state.settings.failure_redirect, &[("error", &error)]);
    }

    let Some(code) = query.code else {
        warn!("callback without code or error");
        return redirect_with_params(&state.settings.failure_redirect, &[("error", "auth_failed")]);
    };

    let pair = match state.auth.exchange_code(&code).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(error = %err, "code exchange failed");
            return redirect_with_params(
                &state.settings.failure_redirect,
                &[("error", "auth_failed")],
            );
        }
    };

    let identity = match state.auth.fetch_identity(&pair.access_token).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!(error = %err, "identity lookup failed after exchange");
            return redirect_with_params(
                &state.settings.failure_redirect,
                &[("error", "auth_failed")],
            );
        }
    };

    info!(user = %identity.login, "login complete");
    redirect_with_params(
        &state.settings.success_redirect,
        &[
            ("access_token", &pair.access_token),
            ("refresh_token", &pair.refresh_token),
            ("user_id", &identity.id),
            ("user_name", &identity.name),
        ],
    )
}

/// `POST /auth/token` — exchange an authorization code.
pub async fn exchange_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let pair = state.auth.exchange_code(&body.code).await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/refresh` — renew a token pair.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPairResponse>, ApiError> {
    let pair = state.auth.refresh(&body.refresh_token).await?;
    Ok(Json(pair.into()))
}

/// `POST /auth/user` — resolve the identity behind an access token.
pub async fn user_info(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AccessTokenRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.auth.fetch_identity(&body.access_token).await?;
    Ok(Json(UserResponse {
        success: true,
        user,
    }))
}

/// Append query parameters to a configured destination URL.
fn redirect_with_params(dest: &str, params: &[(&str, &str)]) -> Redirect {
    match Url::parse(dest) {
        Ok(mut url) => {
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in params {
                    pairs.append_pair(key, value);
                }
            }
            Redirect::to(url.as_str())
        }
        Err(_) => {
            warn!(dest, "unparseable redirect destination");
            Redirect::to(dest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_token_pair_response_shape() {
        let pair = TokenPair {
            access_token: "AT".to_string(),
            refresh_token: "RT".to_string(),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
            acquired_at: Utc::now(),
        };
        let response = TokenPairResponse::from(pair);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["access_token"], "AT");
        assert_eq!(json["refresh_token"], "RT");
        assert_eq!(json["expires_in"], 3600);
    }

    #[test]
    fn test_callback_query_accepts_partial_params() {
        let query: CallbackQuery =
            serde_json::from_str(r#"{"error": "access_denied"}"#).unwrap();
        assert!(query.code.is_none());
        assert_eq!(query.error.as_deref(), Some("access_denied"));
        assert!(query.state.is_none());
    }
}
