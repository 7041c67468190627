/// OAuth2 refresh-token handling for the Netatmo API
use log::{info, warn};
use std::time::Duration;
use time::OffsetDateTime;
use url::Url;

use crate::config::BridgeConfig;
use crate::credentials::CredentialStore;
use crate::error::{AuthError, ConfigError, RefreshError};
use crate::models::{Credential, TokenGrant};
use crate::netatmo::describe_failure;
use crate::utils::{format_datetime, token_expiry};

const TOKEN_PATH: &str = "oauth2/token";

/// What [`TokenRefresher::ensure_fresh`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Access token still valid, nothing was sent
    StillValid,
    /// A new token pair was obtained and persisted
    Refreshed,
}

/// Owns the current credential and keeps it valid
///
/// The refresher is VALID while the clock is before `expires_at` and EXPIRED
/// from that instant on. Only an EXPIRED refresher talks to the token
/// endpoint.
pub struct TokenRefresher<S> {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: String,
    safety_margin: Duration,
    credential: Credential,
    store: S,
    clock: fn() -> OffsetDateTime,
}

impl<S: CredentialStore> TokenRefresher<S> {
    pub fn new(
        http: reqwest::Client,
        config: &BridgeConfig,
        credential: Credential,
        store: S,
    ) -> Result<Self, ConfigError> {
        let token_url = config
            .base_url
            .join(TOKEN_PATH)
            .map_err(|e| ConfigError::Invalid {
                key: "BASEURL",
                value: config.base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            token_url,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            safety_margin: config.safety_margin,
            credential,
            store,
            clock: OffsetDateTime::now_utc,
        })
    }

    /// Replace the wall clock, used to pin time in tests
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn access_token(&self) -> &str {
        &self.credential.access_token
    }

    pub fn is_valid(&self) -> bool {
        !self.credential.is_expired((self.clock)())
    }

    /// Refresh the access token if it has expired
    ///
    /// On any failure of the grant the current credential and the stored
    /// record are left exactly as they were. A successful grant is adopted
    /// and then written through the store; a failed write is reported as
    /// [`RefreshError::Persist`].
    ///
    /// # Returns
    /// Whether a new token pair was obtained, or why the refresh failed.
    /// An `expires_in` beyond the representable date range is reported as
    /// [`AuthError::Malformed`].
    pub async fn ensure_fresh(&mut self) -> Result<RefreshOutcome, RefreshError> {
        if self.is_valid() {
            return Ok(RefreshOutcome::StillValid);
        }

        let grant = self.request_grant().await?;

        // Expiry counts from completion of the exchange, not from its start
        let issued_at = (self.clock)();
        let expires_at = token_expiry(issued_at, grant.expires_in, self.safety_margin)
            .ok_or_else(|| AuthError::Malformed {
                message: format!("expires_in {} is out of range", grant.expires_in),
            })?;

        self.credential = Credential {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at,
            expires_in: Some(grant.expires_in),
        };

        self.store.save(&self.credential)?;

        info!(
            "Updated netatmo api token, valid until {}",
            format_datetime(&self.credential.expires_at)
        );
        Ok(RefreshOutcome::Refreshed)
    }

    async fn request_grant(&self) -> Result<TokenGrant, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.credential.refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        decode_token_response(status, &body).inspect_err(|e| {
            warn!("Token refresh rejected: {}", e);
        })
    }
}

/// Classify a token endpoint response
pub fn decode_token_response(status: u16, body: &str) -> Result<TokenGrant, AuthError> {
    if status != 200 {
        return Err(AuthError::Rejected {
            status,
            message: describe_failure(body),
        });
    }

    let grant: TokenGrant = serde_json::from_str(body).map_err(|e| AuthError::Malformed {
        message: e.to_string(),
    })?;

    if grant.access_token.is_empty() || grant.refresh_token.is_empty() {
        return Err(AuthError::Malformed {
            message: "token payload contains an empty token".into(),
        });
    }

    Ok(grant)
}
