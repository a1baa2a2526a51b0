//! Google OAuth 2.0 authorization-code flow.
//!
//! ```text
//! GET /auth ──▶ consent screen ──▶ GET /oauth2callback?code=…
//!                                        │
//!                         exchange_code ─┴─▶ CredentialStore::save
//!
//! upload ──▶ Authorizer::access_token ──▶ load ──▶ (refresh ──▶ save)
//! ```

use crate::config::OAuthConfig;
use crate::drive::credentials::{CredentialStore, StoredToken};
use crate::error::PressError;
use chrono::{Duration, Utc};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Tokens expiring within this window are refreshed before use.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_token(self) -> StoredToken {
        let mut token = StoredToken::new(self.access_token);
        token.refresh_token = self.refresh_token;
        token.scope = self.scope;
        if let Some(kind) = self.token_type {
            token.token_type = kind;
        }
        if let Some(secs) = self.expires_in {
            token.set_expires_at(Utc::now() + Duration::seconds(secs));
        }
        token
    }
}

/// Talks to the consent and token endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: OAuthConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Consent-screen URL requesting offline access.
    pub fn authorize_url(&self) -> Result<String, PressError> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.config.scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| PressError::InvalidConfig(format!("bad OAuth auth URL: {e}")))?;
        Ok(url.to_string())
    }

    /// Trade an authorization code for a token set.
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken, PressError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    /// Get a fresh access token. The refresh token is carried over when the
    /// endpoint does not rotate it.
    pub async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, PressError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(PressError::NotAuthorized)?;
        let mut fresh = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .await?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = token.refresh_token.clone();
        }
        Ok(fresh)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<StoredToken, PressError> {
        let resp = self
            .http
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| PressError::UploadFailed {
                detail: format!("token endpoint unreachable: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PressError::UploadFailed {
                detail: format!("token endpoint returned {status}: {body}"),
            });
        }

        let parsed: TokenResponse = resp.json().await.map_err(|e| PressError::UploadFailed {
            detail: format!("token endpoint sent an unreadable response: {e}"),
        })?;
        Ok(parsed.into_token())
    }
}

/// Hands out valid access tokens, refreshing and persisting as needed.
pub struct Authorizer {
    oauth: OAuthClient,
    store: Arc<dyn CredentialStore>,
}

impl Authorizer {
    pub fn new(oauth: OAuthClient, store: Arc<dyn CredentialStore>) -> Self {
        Self { oauth, store }
    }

    pub fn authorize_url(&self) -> Result<String, PressError> {
        self.oauth.authorize_url()
    }

    /// Finish the consent flow: exchange `code` and store the token.
    pub async fn complete(&self, code: &str) -> Result<StoredToken, PressError> {
        let mut token = self.oauth.exchange_code(code).await?;
        if token.refresh_token.is_none() {
            if let Some(previous) = self.store.load().await? {
                token.refresh_token = previous.refresh_token;
            }
        }
        self.store.save(&token).await?;
        info!("Cloud storage authorized");
        Ok(token)
    }

    /// A usable bearer token.
    ///
    /// Returns [`PressError::NotAuthorized`] when nothing is stored, or when
    /// the stored token has expired and carries no refresh token.
    pub async fn access_token(&self) -> Result<String, PressError> {
        let token = self.store.load().await?.ok_or(PressError::NotAuthorized)?;
        if !token.expires_within(Duration::seconds(REFRESH_MARGIN_SECS), Utc::now()) {
            return Ok(token.access_token);
        }

        debug!("Access token expired or expiring; refreshing");
        let fresh = self.oauth.refresh(&token).await?;
        self.store.save(&fresh).await?;
        Ok(fresh.access_token)
    }
}
