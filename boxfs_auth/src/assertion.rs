use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::config::SubjectType;
use crate::{AuthConfig, AuthError, key};

/// Claims of a JWT-bearer assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub box_sub_type: SubjectType,
    pub aud: String,
    /// Unique per assertion so the endpoint never sees a replay.
    pub jti: String,
    /// Unix seconds.
    pub exp: i64,
}

/// Signs assertions with the app's RSA key.
pub struct AssertionSigner {
    key: EncodingKey,
    key_id: String,
    issuer: String,
    subject: String,
    subject_type: SubjectType,
    audience: String,
    lifetime: Duration,
}

impl AssertionSigner {
    /// Loads the signing key right away, so a bad key fails at construction.
    pub fn from_config(config: &AuthConfig, config_dir: Option<&Path>) -> Result<Self, AuthError> {
        let key = key::load_signing_key(config, config_dir)?;
        Ok(Self {
            key,
            key_id: config.key_id.clone(),
            issuer: config.client_id.clone(),
            subject: config.subject_id.clone(),
            subject_type: config.subject_type,
            audience: config.auth_url.clone(),
            lifetime: config.assertion_lifetime(),
        })
    }

    pub fn claims(&self) -> AssertionClaims {
        let lifetime = chrono::Duration::from_std(self.lifetime).unwrap_or(chrono::Duration::MAX);
        let exp = Utc::now()
            .checked_add_signed(lifetime)
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        AssertionClaims {
            iss: self.issuer.clone(),
            sub: self.subject.clone(),
            box_sub_type: self.subject_type,
            aud: self.audience.clone(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
            exp: exp.timestamp(),
        }
    }

    /// Produces a fresh compact-serialized RS256 assertion.
    pub fn sign(&self) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.clone());
        Ok(jsonwebtoken::encode(&header, &self.claims(), &self.key)?)
    }
}

impl fmt::Debug for AssertionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssertionSigner")
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .field("subject", &self.subject)
            .field("subject_type", &self.subject_type)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
