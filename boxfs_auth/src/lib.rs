//! # boxfs credentials
//!
//! JWT-bearer ("server authentication") flow against the Box authorization
//! endpoint:
//!
//! 1. `key` loads the RSA signing key (inline PEM or file, optionally
//!    passphrase-encrypted PKCS#8).
//! 2. `assertion` signs a short-lived assertion naming issuer, subject and
//!    audience.
//! 3. `exchange` trades the assertion for an access token.
//! 4. `credentials` holds at most one live token and refreshes it when it gets
//!    within the safety margin of its expiry.

pub mod assertion;
pub mod config;
pub mod credentials;
pub mod exchange;
pub mod key;

#[cfg(test)]
mod test_keys;

pub use assertion::{AssertionClaims, AssertionSigner};
pub use config::AuthConfig;
pub use credentials::{Credential, CredentialManager, CredentialState, TokenProvider};
pub use exchange::{HttpTokenExchange, TokenExchange, TokenGrant};

use boxfs_core::StoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AuthError {
    #[error("missing required auth setting '{0}'")]
    MissingSetting(&'static str),

    #[error("invalid auth setting '{name}': {reason}")]
    InvalidSetting {
        name: &'static str,
        reason: &'static str,
    },

    #[error("failed to read private key file {path:?}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load private key: {0}")]
    InvalidKey(String),

    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token exchange failed{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Exchange {
        status: Option<u16>,
        message: String,
    },
}

impl From<AuthError> for StoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Exchange { .. } => StoreError::AuthenticationFailure(err.to_string()),
            other => StoreError::InvalidConfiguration(other.to_string()),
        }
    }
}
