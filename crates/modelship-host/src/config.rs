use serde::{Deserialize, Serialize};

/// Connection settings for the repository host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Create repositories under this organization instead of the token's user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Requests allowed in flight at once for this credential, across all deployments.
    pub max_in_flight: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            organization: None,
            user_agent: concat!("modelship/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            max_in_flight: 16,
        }
    }
}

impl HostConfig {
    /// Copy safe to print: the token is masked.
    pub fn redacted(&self) -> Self {
        Self {
            token: self.token.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}
