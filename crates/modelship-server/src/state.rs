use std::sync::Arc;
use std::time::Duration;

use modelship_host::RepositoryHost;
use modelship_publish::{ModelshipConfig, PublishSettings};
use tokio_util::sync::CancellationToken;

const BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<dyn RepositoryHost>,
    pub settings: Arc<PublishSettings>,
    pub backend: reqwest::Client,
    pub backend_url: String,
    pub max_upload_bytes: usize,
    /// Cancelled on shutdown; every deployment runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(host: Arc<dyn RepositoryHost>, config: &ModelshipConfig) -> Result<Self, reqwest::Error> {
        let backend = reqwest::Client::builder()
            .timeout(BACKEND_TIMEOUT)
            .build()?;
        Ok(Self {
            host,
            settings: Arc::new(config.publish_settings()),
            backend,
            backend_url: config.server.backend_url.trim_end_matches('/').to_string(),
            max_upload_bytes: config.server.max_upload_bytes,
            shutdown: CancellationToken::new(),
        })
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend_url", &self.backend_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}
