//! Shared RSA material for unit tests. Generated once per test binary.

use pkcs8::pkcs5::pbes2;
use pkcs8::{EncodePrivateKey, PrivateKeyInfo};
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use std::sync::OnceLock;

use crate::AuthConfig;
use crate::config::SubjectType;

struct TestKey {
    key: RsaPrivateKey,
    private_pem: String,
    public_pem: String,
}

fn test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let private_pem = key.to_pkcs1_pem(LineEnding::LF).unwrap().to_string();
        let public_pem = key.to_public_key().to_pkcs1_pem(LineEnding::LF).unwrap();
        TestKey {
            key,
            private_pem,
            public_pem,
        }
    })
}

pub fn private_pem() -> &'static str {
    &test_key().private_pem
}

pub fn public_pem() -> &'static str {
    &test_key().public_pem
}

/// PKCS#8 `ENCRYPTED PRIVATE KEY` PEM using PBKDF2 with few iterations.
pub fn encrypted_private_pem(passphrase: &str) -> String {
    let der = test_key().key.to_pkcs8_der().unwrap();
    let info = PrivateKeyInfo::try_from(der.as_bytes()).unwrap();
    let salt = [7u8; 16];
    let iv = [9u8; 16];
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(1_000, &salt, &iv).unwrap();
    let encrypted = info.encrypt_with_params(params, passphrase).unwrap();
    encrypted
        .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
        .unwrap()
        .to_string()
}

pub fn auth_config(auth_url: &str) -> AuthConfig {
    AuthConfig {
        client_id: "test_client_id".into(),
        client_secret: "test_client_secret".into(),
        subject_id: "test_enterprise_id".into(),
        subject_type: SubjectType::Enterprise,
        key_id: "test_key_id".into(),
        private_key: Some(private_pem().to_owned()),
        private_key_file: None,
        private_key_passphrase: None,
        auth_url: auth_url.to_owned(),
        assertion_lifetime_secs: 60,
        safety_margin_secs: 60,
    }
}
