use std::time::Duration;

use modelship_host::{Admission, HostError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{DeployStage, PublishError};

/// Deadline and cancellation shared by every stage of one deployment.
///
/// Checked before each stage and before each remote call. Calls already in
/// flight are allowed to finish.
#[derive(Debug, Clone)]
pub struct RunBudget {
    deadline: Instant,
    cancel: CancellationToken,
}

impl RunBudget {
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    /// Bounds a host's wait for request capacity by this budget.
    pub fn admission(&self) -> Admission {
        Admission {
            deadline: self.deadline,
            cancel: self.cancel.clone(),
        }
    }

    /// Err when the run was cancelled or its deadline has passed.
    pub fn check(&self, stage: DeployStage, repository: Option<&str>) -> Result<(), PublishError> {
        if self.cancel.is_cancelled() || Instant::now() >= self.deadline {
            return Err(self.refusal(stage, repository));
        }
        Ok(())
    }

    /// The error for a call the host refused to start because this budget
    /// ran out while it waited.
    pub fn refusal(&self, stage: DeployStage, repository: Option<&str>) -> PublishError {
        let repository = repository.map(str::to_string);
        if self.cancel.is_cancelled() {
            PublishError::Cancelled { stage, repository }
        } else {
            PublishError::Timeout { stage, repository }
        }
    }

    /// [`PublishError::from_host`], except that a call refused for lack of
    /// budget is reported as the timeout or cancellation it was.
    pub fn host_error(
        &self,
        stage: DeployStage,
        repository: Option<&str>,
        err: HostError,
    ) -> PublishError {
        match err {
            HostError::NotAdmitted => self.refusal(stage, repository),
            other => PublishError::from_host(stage, repository, other),
        }
    }

    /// Sleep for `delay`, waking early on cancellation or deadline.
    pub async fn wait_backoff(
        &self,
        delay: Duration,
        stage: DeployStage,
        repository: Option<&str>,
    ) -> Result<(), PublishError> {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep_until(self.deadline) => {}
            _ = tokio::time::sleep(delay) => {}
        }
        self.check(stage, repository)
    }
}
