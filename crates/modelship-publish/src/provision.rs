//! Repository creation and the wait for its default branch.

use chrono::{DateTime, Utc};
use modelship_core::{fingerprint_bundle, BranchHead, FileBundle, RepositoryDescriptor, Visibility};
use modelship_host::{HostError, NewRepository, RepositoryHost};
use tokio::time::Instant;

use crate::config::{NamingStrategy, ReadinessPolicy, RepositoryOptions};
use crate::{DeployStage, PublishError, RunBudget};

const FINGERPRINT_LEN: usize = 12;

/// Name for the repository that will hold `bundle`.
pub fn repository_name(
    strategy: NamingStrategy,
    prefix: &str,
    requester: &str,
    bundle: &FileBundle,
    now: DateTime<Utc>,
) -> String {
    match strategy {
        NamingStrategy::ContentHash => {
            let fingerprint = fingerprint_bundle(requester, bundle);
            format!("{prefix}-{}", &fingerprint[..FINGERPRINT_LEN])
        }
        NamingStrategy::Timestamp => format!("{prefix}-{}", now.timestamp_millis()),
    }
}

pub struct Provisioner<'a> {
    host: &'a dyn RepositoryHost,
    options: &'a RepositoryOptions,
    readiness: &'a ReadinessPolicy,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        host: &'a dyn RepositoryHost,
        options: &'a RepositoryOptions,
        readiness: &'a ReadinessPolicy,
    ) -> Self {
        Self {
            host,
            options,
            readiness,
        }
    }

    /// Create `name`, initialized with a first commit on its default branch.
    ///
    /// Under [`NamingStrategy::ContentHash`] an existing repository of the
    /// same name is the leftover of an earlier attempt for the same upload
    /// and is returned as-is so the caller can publish onto it.
    pub async fn provision(
        &self,
        name: &str,
        budget: &RunBudget,
    ) -> Result<RepositoryDescriptor, PublishError> {
        budget.check(DeployStage::Provisioning, None)?;
        let request = NewRepository {
            name: name.to_string(),
            description: self.options.description.clone(),
            visibility: if self.options.private {
                Visibility::Private
            } else {
                Visibility::Public
            },
            initialize: true,
        };

        match self.host.create_repository(&request).await {
            Ok(repo) => {
                tracing::info!(repository = %repo.full_name, "repository created");
                Ok(repo)
            }
            Err(HostError::Conflict(reason)) => match self.options.naming {
                NamingStrategy::ContentHash => self.resume(name, budget).await,
                NamingStrategy::Timestamp => {
                    tracing::debug!(repository = name, %reason, "name collision");
                    Err(PublishError::Conflict {
                        name: name.to_string(),
                    })
                }
            },
            Err(HostError::Unauthorized(msg)) => Err(PublishError::Auth(msg)),
            Err(HostError::NotAdmitted) => Err(budget.refusal(DeployStage::Provisioning, None)),
            Err(other) => Err(PublishError::RepositoryProvisioning {
                repository: name.to_string(),
                reason: other.to_string(),
            }),
        }
    }

    async fn resume(
        &self,
        name: &str,
        budget: &RunBudget,
    ) -> Result<RepositoryDescriptor, PublishError> {
        budget.check(DeployStage::Provisioning, Some(name))?;
        let existing = self
            .host
            .get_repository(name)
            .await
            .map_err(|e| budget.host_error(DeployStage::Provisioning, Some(name), e))?;
        match existing {
            Some(repo) => {
                tracing::info!(repository = %repo.full_name, "resuming onto existing repository");
                Ok(repo)
            }
            // Taken by an account we cannot see into.
            None => Err(PublishError::Conflict {
                name: name.to_string(),
            }),
        }
    }

    /// Poll `branch` until the host serves it, with exponential backoff.
    ///
    /// Only retryable errors are retried. Running out of attempts or past
    /// the readiness deadline is a provisioning failure; the repository is
    /// left in place.
    pub async fn await_base_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
        budget: &RunBudget,
    ) -> Result<BranchHead, PublishError> {
        let stage = DeployStage::AwaitingBaseRef;
        let ready_by = Instant::now() + self.readiness.deadline();
        let attempts = self.readiness.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 0..attempts {
            budget.check(stage, Some(&repo.name))?;
            if Instant::now() >= ready_by {
                break;
            }

            match self.host.get_branch_ref(repo, branch).await {
                Ok(head) => {
                    tracing::debug!(
                        repository = %repo.name,
                        commit = %head.commit.short(),
                        attempt = attempt + 1,
                        "base ref available"
                    );
                    return Ok(head);
                }
                Err(HostError::Unauthorized(msg)) => return Err(PublishError::Auth(msg)),
                Err(HostError::NotAdmitted) => return Err(budget.refusal(stage, Some(&repo.name))),
                Err(err) if err.is_retryable() => {
                    last_error = err.to_string();
                    if attempt + 1 == attempts {
                        break;
                    }
                    let delay = self
                        .readiness
                        .delay_for(attempt)
                        .min(ready_by.saturating_duration_since(Instant::now()));
                    tracing::warn!(
                        repository = %repo.name,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        "base ref not ready, retrying in {delay:?}: {err}"
                    );
                    budget.wait_backoff(delay, stage, Some(&repo.name)).await?;
                }
                Err(err) => {
                    return Err(PublishError::RepositoryProvisioning {
                        repository: repo.name.clone(),
                        reason: err.to_string(),
                    })
                }
            }
        }

        Err(PublishError::RepositoryProvisioning {
            repository: repo.name.clone(),
            reason: format!("branch {branch} not available: {last_error}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use modelship_host::{HostCall, MemoryHost, MemoryHostOptions};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn quick_policy(max_attempts: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            max_attempts,
            deadline_secs: 5,
        }
    }

    fn budget() -> RunBudget {
        RunBudget::new(Duration::from_secs(30), CancellationToken::new())
    }

    fn bundle() -> FileBundle {
        [("load_model.py", "x"), ("requirements.txt", "y")]
            .into_iter()
            .collect()
    }

    #[test]
    fn content_hash_names_are_stable() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = repository_name(NamingStrategy::ContentHash, "model-deploy", "u1", &bundle(), now);
        let b = repository_name(NamingStrategy::ContentHash, "model-deploy", "u1", &bundle(), now);
        let c = repository_name(NamingStrategy::ContentHash, "model-deploy", "u2", &bundle(), now);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), "model-deploy-".len() + FINGERPRINT_LEN);
    }

    #[test]
    fn timestamp_names_use_millis() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let name = repository_name(NamingStrategy::Timestamp, "model-deploy", "", &bundle(), now);
        assert_eq!(name, "model-deploy-1700000000123");
    }

    #[tokio::test]
    async fn waits_out_readiness_lag() {
        let host = MemoryHost::new(MemoryHostOptions {
            ready_after_reads: 3,
            ..MemoryHostOptions::default()
        });
        let options = RepositoryOptions::default();
        let policy = quick_policy(10);
        let provisioner = Provisioner::new(&host, &options, &policy);

        let repo = provisioner.provision("demo", &budget()).await.unwrap();
        let head = provisioner
            .await_base_ref(&repo, &repo.default_branch, &budget())
            .await
            .unwrap();
        assert_eq!(host.branch_head("demo", "main").await, Some(head.commit));

        let reads = host
            .calls()
            .await
            .iter()
            .filter(|c| matches!(c, HostCall::GetBranchRef(_)))
            .count();
        assert_eq!(reads, 4);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let host = MemoryHost::new(MemoryHostOptions {
            ready_after_reads: 100,
            ..MemoryHostOptions::default()
        });
        let options = RepositoryOptions::default();
        let policy = quick_policy(3);
        let provisioner = Provisioner::new(&host, &options, &policy);

        let repo = provisioner.provision("demo", &budget()).await.unwrap();
        let err = provisioner
            .await_base_ref(&repo, "main", &budget())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::RepositoryProvisioning { ref repository, .. } if repository == "demo"
        ));
        // The repository is left in place.
        assert_eq!(host.repository_names().await, vec!["demo".to_string()]);
    }

    #[tokio::test]
    async fn rejected_credentials_abort_immediately() {
        let host = MemoryHost::new(MemoryHostOptions {
            reject_credentials: true,
            ..MemoryHostOptions::default()
        });
        let options = RepositoryOptions::default();
        let policy = quick_policy(10);
        let provisioner = Provisioner::new(&host, &options, &policy);
        let err = provisioner.provision("demo", &budget()).await.unwrap_err();
        assert!(matches!(err, PublishError::Auth(_)));
        assert_eq!(host.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn content_hash_naming_resumes_on_conflict() {
        let host = MemoryHost::default();
        let options = RepositoryOptions::default();
        let policy = quick_policy(3);
        let provisioner = Provisioner::new(&host, &options, &policy);

        let first = provisioner.provision("demo", &budget()).await.unwrap();
        let second = provisioner.provision("demo", &budget()).await.unwrap();
        assert_eq!(first, second);
        assert!(host
            .calls()
            .await
            .contains(&HostCall::GetRepository("demo".to_string())));
    }

    #[tokio::test]
    async fn timestamp_naming_conflict_is_fatal() {
        let host = MemoryHost::default();
        let options = RepositoryOptions {
            naming: NamingStrategy::Timestamp,
            ..RepositoryOptions::default()
        };
        let policy = quick_policy(3);
        let provisioner = Provisioner::new(&host, &options, &policy);

        provisioner.provision("demo", &budget()).await.unwrap();
        let err = provisioner.provision("demo", &budget()).await.unwrap_err();
        assert!(matches!(err, PublishError::Conflict { ref name } if name == "demo"));
    }

    #[tokio::test]
    async fn expired_budget_makes_no_calls() {
        let host = MemoryHost::default();
        let options = RepositoryOptions::default();
        let policy = quick_policy(3);
        let provisioner = Provisioner::new(&host, &options, &policy);
        let expired = RunBudget::new(Duration::ZERO, CancellationToken::new());

        let err = provisioner.provision("demo", &expired).await.unwrap_err();
        assert!(matches!(err, PublishError::Timeout { .. }));
        assert!(host.calls().await.is_empty());
    }
}
