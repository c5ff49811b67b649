use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{AssertionSigner, AuthConfig, AuthError, HttpTokenExchange, TokenExchange};

/// Lifetime assumed when the endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// A bearer token and the instant after which it must not be used.
///
/// `expires_at` already has the safety margin taken off.
#[derive(Clone)]
pub struct Credential {
    access_token: String,
    expires_at: Instant,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: Instant) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Unset,
    Valid,
    Expired,
}

/// Source of bearer tokens for authenticated remote calls.
#[async_trait]
pub trait TokenProvider: fmt::Debug + Send + Sync + 'static {
    async fn token(&self) -> Result<String, AuthError>;

    /// Reports that `rejected` was refused by the remote. The held token is
    /// dropped only if it is still `rejected`, so late reports against a token
    /// that has already been replaced cost nothing.
    async fn invalidate(&self, rejected: &str);
}

/// Holds at most one live credential and refreshes it on demand.
///
/// Refreshes run while holding the credential lock, so callers that arrive
/// during a refresh wait for it and reuse its result.
pub struct CredentialManager {
    signer: AssertionSigner,
    exchange: Arc<dyn TokenExchange>,
    safety_margin: Duration,
    current: Mutex<Option<Credential>>,
    exchanges: AtomicU64,
}

impl CredentialManager {
    /// Validates `config` and loads the signing key; exchanges go over HTTP to
    /// `config.auth_url`.
    pub fn new(config: &AuthConfig, config_dir: Option<&Path>) -> Result<Self, AuthError> {
        let exchange = HttpTokenExchange::new(
            config.auth_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )?;
        Self::with_exchange(config, config_dir, Arc::new(exchange))
    }

    pub fn with_exchange(
        config: &AuthConfig,
        config_dir: Option<&Path>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let signer = AssertionSigner::from_config(config, config_dir)?;
        Ok(Self {
            signer,
            exchange,
            safety_margin: config.safety_margin(),
            current: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        })
    }

    /// Returns the held token while it is valid, refreshing otherwise.
    pub async fn token(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock().await;
        let now = Instant::now();
        if let Some(credential) = current.as_ref().filter(|c| c.is_valid_at(now)) {
            debug!("reusing access token");
            return Ok(credential.access_token.clone());
        }
        self.refresh_locked(&mut current).await
    }

    /// Unconditionally exchanges a new assertion.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let mut current = self.current.lock().await;
        self.refresh_locked(&mut current).await
    }

    /// Drops the held token if it is `rejected`.
    pub async fn invalidate(&self, rejected: &str) {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some(held) if held.access_token == rejected => {
                *current = None;
                warn!("access token invalidated");
            }
            Some(_) => debug!("rejected access token was already replaced"),
            None => {}
        }
    }

    pub async fn state(&self) -> CredentialState {
        match self.current.lock().await.as_ref() {
            None => CredentialState::Unset,
            Some(c) if c.is_valid_at(Instant::now()) => CredentialState::Valid,
            Some(_) => CredentialState::Expired,
        }
    }

    /// Number of token exchanges attempted so far.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    async fn refresh_locked(&self, slot: &mut Option<Credential>) -> Result<String, AuthError> {
        *slot = None;
        let assertion = self.signer.sign()?;
        self.exchanges.fetch_add(1, Ordering::Relaxed);
        let grant = self.exchange.exchange(&assertion).await?;

        let issued = Instant::now();
        let lifetime = grant
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        if lifetime <= self.safety_margin {
            warn!(
                lifetime_secs = lifetime.as_secs(),
                margin_secs = self.safety_margin.as_secs(),
                "token lifetime does not exceed the safety margin"
            );
        }
        let expires_at = issued + lifetime.saturating_sub(self.safety_margin);
        info!(lifetime_secs = lifetime.as_secs(), "obtained access token");

        let token = grant.access_token.clone();
        *slot = Some(Credential::new(grant.access_token, expires_at));
        Ok(token)
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("signer", &self.signer)
            .field("exchange", &self.exchange)
            .field("safety_margin", &self.safety_margin)
            .field("exchanges", &self.exchange_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for CredentialManager {
    async fn token(&self) -> Result<String, AuthError> {
        CredentialManager::token(self).await
    }

    async fn invalidate(&self, rejected: &str) {
        CredentialManager::invalidate(self, rejected).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenGrant;
    use crate::test_keys;
    use std::sync::atomic::AtomicBool;

    #[derive(Debug, Default)]
    struct FakeExchange {
        calls: AtomicU64,
        expires_in: Option<u64>,
        fail_next: AtomicBool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl TokenExchange for FakeExchange {
        async fn exchange(&self, assertion: &str) -> Result<TokenGrant, AuthError> {
            assert_eq!(assertion.split('.').count(), 3);
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(AuthError::Exchange {
                    status: Some(400),
                    message: "Current date/time MUST be before the expiration date/time listed in the 'exp' claim".into(),
                });
            }
            Ok(TokenGrant {
                access_token: format!("token-{n}"),
                expires_in: self.expires_in,
            })
        }
    }

    fn manager(exchange: FakeExchange) -> (CredentialManager, Arc<FakeExchange>) {
        let exchange = Arc::new(exchange);
        let config = test_keys::auth_config("https://auth.test/oauth2/token");
        let manager = CredentialManager::with_exchange(&config, None, exchange.clone()).unwrap();
        (manager, exchange)
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_reused_within_validity_window() {
        let (manager, _) = manager(FakeExchange {
            expires_in: Some(3600),
            ..Default::default()
        });
        assert_eq!(manager.state().await, CredentialState::Unset);

        let first = manager.token().await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        let second = manager.token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.exchange_count(), 1);
        assert_eq!(manager.state().await, CredentialState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_refreshed_once_after_lifetime_minus_margin() {
        let (manager, _) = manager(FakeExchange {
            expires_in: Some(3600),
            ..Default::default()
        });
        assert_eq!(manager.token().await.unwrap(), "token-1");

        tokio::time::advance(Duration::from_secs(3539)).await;
        assert_eq!(manager.token().await.unwrap(), "token-1");
        assert_eq!(manager.exchange_count(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(manager.state().await, CredentialState::Expired);
        assert_eq!(manager.token().await.unwrap(), "token-2");
        assert_eq!(manager.token().await.unwrap(), "token-2");
        assert_eq!(manager.exchange_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_expires_in_defaults_to_an_hour() {
        let (manager, _) = manager(FakeExchange::default());
        manager.token().await.unwrap();
        tokio::time::advance(Duration::from_secs(3500)).await;
        manager.token().await.unwrap();
        assert_eq!(manager.exchange_count(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_exactly_one_new_exchange() {
        let (manager, _) = manager(FakeExchange {
            expires_in: Some(3600),
            ..Default::default()
        });
        assert_eq!(manager.token().await.unwrap(), "token-1");

        manager.invalidate("token-1").await;
        assert_eq!(manager.state().await, CredentialState::Unset);
        assert_eq!(manager.token().await.unwrap(), "token-2");
        assert_eq!(manager.token().await.unwrap(), "token-2");
        assert_eq!(manager.exchange_count(), 2);
    }

    #[tokio::test]
    async fn late_rejections_of_a_replaced_token_are_ignored() {
        let (manager, _) = manager(FakeExchange {
            expires_in: Some(3600),
            ..Default::default()
        });
        let manager = Arc::new(manager);
        let stale = manager.token().await.unwrap();

        // Every in-flight request that used the old token reports its 401.
        manager.invalidate(&stale).await;
        assert_eq!(manager.token().await.unwrap(), "token-2");
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                let stale = stale.clone();
                tokio::spawn(async move {
                    manager.invalidate(&stale).await;
                    manager.token().await.unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), "token-2");
        }
        assert_eq!(manager.exchange_count(), 2);
        assert_eq!(manager.state().await, CredentialState::Valid);
    }

    #[tokio::test]
    async fn concurrent_rejections_cause_one_exchange() {
        let (manager, _) = manager(FakeExchange {
            expires_in: Some(3600),
            ..Default::default()
        });
        let manager = Arc::new(manager);
        let stale = manager.token().await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                let stale = stale.clone();
                tokio::spawn(async move {
                    manager.invalidate(&stale).await;
                    manager.token().await.unwrap()
                })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), "token-2");
        }
        assert_eq!(manager.exchange_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let (manager, exchange) = manager(FakeExchange {
            expires_in: Some(3600),
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let manager = Arc::new(manager);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.token().await.unwrap() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), "token-1");
        }
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_clears_credential_and_reports_upstream_message() {
        let (manager, exchange) = manager(FakeExchange {
            expires_in: Some(3600),
            ..Default::default()
        });
        manager.token().await.unwrap();

        exchange.fail_next.store(true, Ordering::SeqCst);
        let err = manager.refresh().await.unwrap_err();
        assert!(err.to_string().contains("'exp' claim"));
        assert_eq!(manager.state().await, CredentialState::Unset);

        assert_eq!(manager.token().await.unwrap(), "token-3");
    }

    #[test]
    fn construction_fails_fast_on_missing_settings() {
        let mut config = test_keys::auth_config("https://auth.test/oauth2/token");
        config.subject_id.clear();
        let err = CredentialManager::new(&config, None).unwrap_err();
        assert!(matches!(err, AuthError::MissingSetting("subject_id")));
    }

    #[tokio::test]
    async fn exchanges_over_http() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "live-token",
                "expires_in": 4000,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_keys::auth_config(&format!("{}/oauth2/token", server.uri()));
        let manager = CredentialManager::new(&config, None).unwrap();
        assert_eq!(manager.token().await.unwrap(), "live-token");
        assert_eq!(manager.token().await.unwrap(), "live-token");
    }

    #[test]
    fn debug_hides_token() {
        let credential = Credential::new("secret-token", Instant::now());
        assert!(!format!("{credential:?}").contains("secret-token"));
    }
}
