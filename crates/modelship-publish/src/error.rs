use modelship_bundle::BundleError;
use modelship_host::HostError;
use thiserror::Error;

use crate::DeployStage;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid upload: {0}")]
    Validation(#[from] BundleError),

    #[error("repository host rejected the credentials: {0}")]
    Auth(String),

    #[error("repository {name} already exists")]
    Conflict { name: String },

    #[error("failed to create blob for {path} in {repository}: {source}")]
    ObjectCreation {
        path: String,
        repository: String,
        #[source]
        source: HostError,
    },

    #[error("repository {repository} could not be provisioned: {reason}")]
    RepositoryProvisioning { repository: String, reason: String },

    #[error("deadline exceeded while {stage}{}", on_repository(.repository))]
    Timeout {
        stage: DeployStage,
        repository: Option<String>,
    },

    #[error("cancelled while {stage}{}", on_repository(.repository))]
    Cancelled {
        stage: DeployStage,
        repository: Option<String>,
    },

    #[error("failed to move the branch of {repository}: {source}")]
    RefUpdate {
        repository: String,
        #[source]
        source: HostError,
    },

    #[error("host call failed while {stage}{}: {source}", on_repository(.repository))]
    Remote {
        stage: DeployStage,
        repository: Option<String>,
        #[source]
        source: HostError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

fn on_repository(repository: &Option<String>) -> String {
    repository
        .as_deref()
        .map(|name| format!(" (repository {name})"))
        .unwrap_or_default()
}

impl PublishError {
    /// Classify a host failure outside blob creation.
    pub fn from_host(stage: DeployStage, repository: Option<&str>, err: HostError) -> Self {
        match err {
            HostError::Unauthorized(msg) => PublishError::Auth(msg),
            other => PublishError::Remote {
                stage,
                repository: repository.map(str::to_string),
                source: other,
            },
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PublishError::Validation(_) => 400,
            PublishError::Auth(_) => 401,
            PublishError::Conflict { .. } => 422,
            _ => 500,
        }
    }

    /// Repository left behind by a failed run, when one was created.
    pub fn repository(&self) -> Option<&str> {
        match self {
            PublishError::Conflict { name } => Some(name),
            PublishError::ObjectCreation { repository, .. }
            | PublishError::RepositoryProvisioning { repository, .. }
            | PublishError::RefUpdate { repository, .. } => Some(repository),
            PublishError::Timeout { repository, .. }
            | PublishError::Cancelled { repository, .. }
            | PublishError::Remote { repository, .. } => repository.as_deref(),
            PublishError::Validation(_) | PublishError::Auth(_) | PublishError::Internal(_) => None,
        }
    }

    pub fn stage(&self) -> Option<DeployStage> {
        match self {
            PublishError::Validation(_) => Some(DeployStage::Validating),
            PublishError::Conflict { .. } | PublishError::RepositoryProvisioning { .. } => {
                Some(DeployStage::Provisioning)
            }
            PublishError::ObjectCreation { .. } => Some(DeployStage::BuildingObjects),
            PublishError::RefUpdate { .. } => Some(DeployStage::Committing),
            PublishError::Timeout { stage, .. }
            | PublishError::Cancelled { stage, .. }
            | PublishError::Remote { stage, .. } => Some(*stage),
            PublishError::Auth(_) | PublishError::Internal(_) => None,
        }
    }
}
