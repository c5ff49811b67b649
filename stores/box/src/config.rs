pub const DEFAULT_API_URL: &str = "https://api.box.com/2.0";
pub const DEFAULT_UPLOAD_URL: &str = "https://upload.box.com/api/2.0";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct BoxStoreConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// Per-request timeout of the HTTP client.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BoxStoreConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            upload_url: default_upload_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_owned()
}

fn default_upload_url() -> String {
    DEFAULT_UPLOAD_URL.to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}
