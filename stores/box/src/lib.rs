mod config;
mod store;

pub use config::{BoxStoreConfig, DEFAULT_API_URL, DEFAULT_UPLOAD_URL};
pub use store::BoxStore;

use boxfs_auth::AuthError;
use boxfs_core::{NodeKind, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Non-success response. `message` comes from the error body when it has
    /// one.
    #[error("Box API returned HTTP {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        conflict_id: Option<String>,
        conflict_kind: Option<NodeKind>,
    },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        match err {
            Error::Api {
                status,
                message,
                conflict_id,
                conflict_kind,
                ..
            } => match status {
                404 => StoreError::NotFound(message),
                409 => StoreError::Conflict {
                    message,
                    existing_id: conflict_id,
                    existing_kind: conflict_kind,
                },
                401 => StoreError::AuthenticationFailure(message),
                429 | 500..=599 => StoreError::TransientFailure(format!("HTTP {status}: {message}")),
                _ => StoreError::InvalidRequest(format!("HTTP {status}: {message}")),
            },
            Error::Http(e) if e.is_builder() => StoreError::InvalidConfiguration(e.to_string()),
            Error::Auth(e) => e.into(),
            other => StoreError::TransientFailure(other.to_string()),
        }
    }
}
