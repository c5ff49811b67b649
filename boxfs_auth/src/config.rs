use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::AuthError;

pub const DEFAULT_AUTH_URL: &str = "https://api.box.com/oauth2/token";

/// Whom the assertion acts as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    #[default]
    Enterprise,
    User,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    /// Issuer of the assertion; also sent as `client_id` in the exchange.
    pub client_id: String,
    pub client_secret: String,
    /// Enterprise or user ID the assertion is issued for.
    pub subject_id: String,
    #[serde(default)]
    pub subject_type: SubjectType,
    /// Public key ID registered with the app, sent as the JWT `kid`.
    pub key_id: String,
    /// Inline PEM content. Takes precedence over `private_key_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_passphrase: Option<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_assertion_lifetime")]
    pub assertion_lifetime_secs: u64,
    #[serde(default = "default_safety_margin")]
    pub safety_margin_secs: u64,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_owned()
}

fn default_assertion_lifetime() -> u64 {
    60
}

fn default_safety_margin() -> u64 {
    60
}

impl AuthConfig {
    pub fn assertion_lifetime(&self) -> Duration {
        Duration::from_secs(self.assertion_lifetime_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    /// Checks that every identifier the flow needs is present.
    pub fn validate(&self) -> Result<(), AuthError> {
        let required = [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("subject_id", &self.subject_id),
            ("key_id", &self.key_id),
            ("auth_url", &self.auth_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(AuthError::MissingSetting(name));
            }
        }
        if self.private_key.is_none() && self.private_key_file.is_none() {
            return Err(AuthError::MissingSetting("private_key"));
        }
        if self.assertion_lifetime_secs == 0 {
            return Err(AuthError::InvalidSetting {
                name: "assertion_lifetime_secs",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subject_id", &self.subject_id)
            .field("subject_type", &self.subject_type)
            .field("key_id", &self.key_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_file", &self.private_key_file)
            .field(
                "private_key_passphrase",
                &self.private_key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("auth_url", &self.auth_url)
            .field("assertion_lifetime_secs", &self.assertion_lifetime_secs)
            .field("safety_margin_secs", &self.safety_margin_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AuthConfig {
        serde_json::from_value(serde_json::json!({
            "client_id": "test_client_id",
            "client_secret": "test_client_secret",
            "subject_id": "test_enterprise_id",
            "key_id": "test_key_id",
            "private_key_file": "box.pem",
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = minimal();
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(config.assertion_lifetime(), Duration::from_secs(60));
        assert_eq!(config.safety_margin(), Duration::from_secs(60));
        assert_eq!(config.subject_type, SubjectType::Enterprise);
        config.validate().unwrap();
    }

    #[test]
    fn missing_identifiers_fail_validation() {
        let mut config = minimal();
        config.key_id = " ".into();
        assert!(matches!(config.validate(), Err(AuthError::MissingSetting("key_id"))));

        let mut config = minimal();
        config.private_key_file = None;
        assert!(matches!(
            config.validate(),
            Err(AuthError::MissingSetting("private_key"))
        ));
    }

    #[test]
    fn zero_assertion_lifetime_is_a_setting_error() {
        let mut config = minimal();
        config.assertion_lifetime_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidSetting {
                name: "assertion_lifetime_secs",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "invalid auth setting 'assertion_lifetime_secs': must be greater than zero"
        );
    }

    #[test]
    fn debug_hides_secrets() {
        let mut config = minimal();
        config.private_key_passphrase = Some("hunter2".into());
        let out = format!("{config:?}");
        assert!(!out.contains("test_client_secret"));
        assert!(!out.contains("hunter2"));
        assert!(out.contains("test_client_id"));
    }
}
