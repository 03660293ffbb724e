//! Deployment lifecycle.
//!
//! ```text
//! VALIDATING → PROVISIONING → AWAITING_BASE_REF → BUILDING_OBJECTS → COMMITTING → PUBLISHED
//!      └────────────┴───────────────┴──────────────────┴──────────────┴──→ FAILED
//! ```
//!
//! Every transition moves strictly forward. `PUBLISHED` and `FAILED` are
//! terminal; nothing leaves them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PublishError;

/// A working stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStage {
    Validating,
    Provisioning,
    AwaitingBaseRef,
    BuildingObjects,
    Committing,
}

impl DeployStage {
    /// The stage that follows this one, `None` after committing.
    pub fn next(self) -> Option<DeployStage> {
        match self {
            Self::Validating => Some(Self::Provisioning),
            Self::Provisioning => Some(Self::AwaitingBaseRef),
            Self::AwaitingBaseRef => Some(Self::BuildingObjects),
            Self::BuildingObjects => Some(Self::Committing),
            Self::Committing => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Provisioning => "provisioning",
            Self::AwaitingBaseRef => "awaiting_base_ref",
            Self::BuildingObjects => "building_objects",
            Self::Committing => "committing",
        }
    }
}

impl std::fmt::Display for DeployStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeployState {
    Running { stage: DeployStage },
    Published,
    Failed { stage: DeployStage, cause: String },
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::Failed { .. })
    }

    /// The stage the pipeline is in, or was in when it failed.
    pub fn stage(&self) -> Option<DeployStage> {
        match self {
            Self::Running { stage } | Self::Failed { stage, .. } => Some(*stage),
            Self::Published => None,
        }
    }
}

impl std::fmt::Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running { stage } => write!(f, "{}", stage.as_str().to_ascii_uppercase()),
            Self::Published => f.write_str("PUBLISHED"),
            Self::Failed { stage, .. } => write!(f, "FAILED({stage})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DeployState,
    pub to: DeployState,
    pub at: DateTime<Utc>,
}

/// Enforces forward-only transitions and keeps a log of them.
#[derive(Debug, Clone)]
pub struct DeployTracker {
    state: DeployState,
    transitions: Vec<StateTransition>,
}

impl Default for DeployTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DeployTracker {
    pub fn new() -> Self {
        Self {
            state: DeployState::Running {
                stage: DeployStage::Validating,
            },
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> &DeployState {
        &self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Move into `stage`, which must directly follow the current one.
    pub fn enter(&mut self, stage: DeployStage) -> Result<(), PublishError> {
        match self.state {
            DeployState::Running { stage: current } if current.next() == Some(stage) => {
                self.record(DeployState::Running { stage });
                Ok(())
            }
            _ => Err(self.illegal(&stage.as_str().to_ascii_uppercase())),
        }
    }

    /// Finish successfully; only legal from `COMMITTING`.
    pub fn publish(&mut self) -> Result<(), PublishError> {
        match self.state {
            DeployState::Running {
                stage: DeployStage::Committing,
            } => {
                self.record(DeployState::Published);
                Ok(())
            }
            _ => Err(self.illegal("PUBLISHED")),
        }
    }

    /// Fail in the current stage.
    pub fn fail(&mut self, cause: impl Into<String>) -> Result<(), PublishError> {
        match self.state {
            DeployState::Running { stage } => {
                self.record(DeployState::Failed {
                    stage,
                    cause: cause.into(),
                });
                Ok(())
            }
            _ => Err(self.illegal("FAILED")),
        }
    }

    fn record(&mut self, to: DeployState) {
        let from = std::mem::replace(&mut self.state, to.clone());
        tracing::info!(from = %from, to = %to, "deployment state transition");
        self.transitions.push(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
    }

    fn illegal(&self, to: &str) -> PublishError {
        PublishError::Internal(format!("illegal state transition: {} -> {to}", self.state))
    }
}
