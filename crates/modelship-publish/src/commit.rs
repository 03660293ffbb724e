use modelship_core::{BranchHead, ObjectHash, RepositoryDescriptor};
use modelship_host::{HostError, RepositoryHost};

use crate::{DeployStage, PublishError, RunBudget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCommit {
    pub commit: ObjectHash,
    /// False when the tree matched the branch tip and nothing was written.
    pub created: bool,
}

/// Creates the deployment commit and moves the branch onto it.
///
/// The ref update is forced. This is only sound while the pipeline is the
/// sole writer of a repository it created for this deployment: a ref that
/// moved between reading the base and this write is overwritten without
/// notice.
pub struct CommitPublisher<'a> {
    host: &'a dyn RepositoryHost,
}

impl<'a> CommitPublisher<'a> {
    pub fn new(host: &'a dyn RepositoryHost) -> Self {
        Self { host }
    }

    pub async fn publish(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
        message: &str,
        tree: &ObjectHash,
        base: &BranchHead,
        budget: &RunBudget,
    ) -> Result<PublishedCommit, PublishError> {
        let stage = DeployStage::Committing;
        if tree == &base.tree {
            tracing::info!(
                repository = %repo.name,
                commit = %base.commit.short(),
                "tree unchanged, branch left as is"
            );
            return Ok(PublishedCommit {
                commit: base.commit.clone(),
                created: false,
            });
        }

        budget.check(stage, Some(&repo.name))?;
        let commit = self
            .host
            .create_commit(repo, message, tree, std::slice::from_ref(&base.commit))
            .await
            .map_err(|e| budget.host_error(stage, Some(&repo.name), e))?;

        budget.check(stage, Some(&repo.name))?;
        self.host
            .update_ref(repo, branch, &commit, true)
            .await
            .map_err(|source| match source {
                HostError::Unauthorized(msg) => PublishError::Auth(msg),
                HostError::NotAdmitted => budget.refusal(stage, Some(&repo.name)),
                source => PublishError::RefUpdate {
                    repository: repo.name.clone(),
                    source,
                },
            })?;

        tracing::info!(
            repository = %repo.name,
            branch,
            commit = %commit.short(),
            "branch updated"
        );
        Ok(PublishedCommit {
            commit,
            created: true,
        })
    }
}
