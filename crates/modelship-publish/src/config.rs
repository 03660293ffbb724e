use std::time::Duration;

use modelship_bundle::{BundleLimits, ManifestOptions};
use modelship_host::HostConfig;
use serde::{Deserialize, Serialize};

/// How deployment repositories are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    /// `{prefix}-{fingerprint}`: the same requester uploading the same content
    /// maps to the same repository, and a retry resumes onto it.
    #[default]
    ContentHash,
    /// `{prefix}-{unix_millis}`. A name collision is fatal.
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryOptions {
    pub prefix: String,
    pub private: bool,
    pub description: String,
    /// Branch to publish to; the repository's default branch when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub naming: NamingStrategy,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            prefix: "model-deploy".to_string(),
            private: false,
            description: "Model deployment published by modelship".to_string(),
            branch: None,
            naming: NamingStrategy::default(),
        }
    }
}

/// Backoff used while waiting for a new repository's branch to appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub deadline_secs: u64,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 4_000,
            max_attempts: 10,
            deadline_secs: 30,
        }
    }
}

impl ReadinessPolicy {
    /// Delay before retry number `attempt` (zero-based): doubles from the
    /// initial delay and saturates at the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub timeout_secs: u64,
    pub blob_concurrency: usize,
    pub commit_message: String,
    /// `{repository_url}` is replaced with the repository's web URL.
    pub deploy_url_template: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            blob_concurrency: 8,
            commit_message: "Deploy model artifacts".to_string(),
            deploy_url_template: "https://render.com/deploy?repo={repository_url}".to_string(),
        }
    }
}

impl PipelineOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleOptions {
    pub limits: BundleLimits,
    pub manifest: ManifestOptions,
}

/// Everything a [`crate::DeploymentPipeline`] needs besides a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSettings {
    pub repository: RepositoryOptions,
    pub readiness: ReadinessPolicy,
    pub pipeline: PipelineOptions,
    pub bundle: BundleOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Inference backend that owns training jobs.
    pub backend_url: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            backend_url: "http://127.0.0.1:8000".to_string(),
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelshipConfig {
    pub host: HostConfig,
    pub repository: RepositoryOptions,
    pub readiness: ReadinessPolicy,
    pub pipeline: PipelineOptions,
    pub bundle: BundleOptions,
    pub server: ServerConfig,
}

impl ModelshipConfig {
    pub fn publish_settings(&self) -> PublishSettings {
        PublishSettings {
            repository: self.repository.clone(),
            readiness: self.readiness.clone(),
            pipeline: self.pipeline.clone(),
            bundle: self.bundle.clone(),
        }
    }
}
