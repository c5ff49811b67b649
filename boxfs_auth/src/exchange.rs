use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::AuthError;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Access token handed out by the authorization endpoint.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Seconds until expiry, as reported by the endpoint.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Trades a signed assertion for an access token.
#[async_trait]
pub trait TokenExchange: fmt::Debug + Send + Sync + 'static {
    async fn exchange(&self, assertion: &str) -> Result<TokenGrant, AuthError>;
}

/// Form-encoded POST against the Box token endpoint.
pub struct HttpTokenExchange {
    client: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpTokenExchange {
    pub fn new(
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Exchange {
                status: None,
                message: e.to_string(),
            })?;
        Ok(Self::with_client(client, auth_url, client_id, client_secret))
    }

    pub fn with_client(
        client: reqwest::Client,
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for HttpTokenExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenExchange")
            .field("auth_url", &self.auth_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, assertion: &str) -> Result<TokenGrant, AuthError> {
        debug!(url = %self.auth_url, "exchanging assertion for access token");
        let form = [
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Exchange {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Exchange {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(AuthError::Exchange {
                status: Some(status.as_u16()),
                message: error_message(&body),
            });
        }

        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| AuthError::Exchange {
            status: Some(status.as_u16()),
            message: format!("malformed token response: {e}"),
        })?;
        if grant.access_token.is_empty() {
            return Err(AuthError::Exchange {
                status: Some(status.as_u16()),
                message: "token response carried no access_token".to_owned(),
            });
        }
        Ok(grant)
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error_description: Some(description),
            ..
        }) => description,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ if body.trim().is_empty() => "empty response".to_owned(),
        _ => body.trim().to_owned(),
    }
}
