//! Blob fan-out and tree construction.

use std::sync::Arc;

use modelship_core::{FileBundle, ObjectHash, RepositoryDescriptor, TreeEntry};
use modelship_host::{HostError, RepositoryHost};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::{DeployStage, PublishError, RunBudget};

/// Tree created on the host together with the entries it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTree {
    pub tree: ObjectHash,
    /// Sorted by path.
    pub entries: Vec<TreeEntry>,
}

pub struct ObjectGraphBuilder {
    host: Arc<dyn RepositoryHost>,
    concurrency: usize,
}

impl ObjectGraphBuilder {
    pub fn new(host: Arc<dyn RepositoryHost>, concurrency: usize) -> Self {
        Self {
            host,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload every file as a blob, then create one tree extending `base_tree`.
    ///
    /// The first failed blob aborts the uploads still pending and no tree is
    /// created.
    pub async fn build(
        &self,
        repo: &RepositoryDescriptor,
        base_tree: &ObjectHash,
        bundle: &FileBundle,
        budget: &RunBudget,
    ) -> Result<BuiltTree, PublishError> {
        let mut entries = self.upload_blobs(repo, bundle, budget).await?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        budget.check(DeployStage::BuildingObjects, Some(&repo.name))?;
        let tree = self
            .host
            .create_tree(repo, base_tree, &entries)
            .await
            .map_err(|e| budget.host_error(DeployStage::BuildingObjects, Some(&repo.name), e))?;

        tracing::debug!(
            repository = %repo.name,
            tree = %tree.short(),
            entries = entries.len(),
            "tree created"
        );
        Ok(BuiltTree { tree, entries })
    }

    async fn upload_blobs(
        &self,
        repo: &RepositoryDescriptor,
        bundle: &FileBundle,
        budget: &RunBudget,
    ) -> Result<Vec<TreeEntry>, PublishError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let repo = Arc::new(repo.clone());
        let mut join_set = JoinSet::new();

        for (path, content) in bundle.iter() {
            let host = Arc::clone(&self.host);
            let sem = Arc::clone(&semaphore);
            let repo = Arc::clone(&repo);
            let budget = budget.clone();
            let path = path.to_string();
            let content = content.clone();

            join_set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|_| PublishError::Internal("blob limiter closed".to_string()))?;
                budget.check(DeployStage::BuildingObjects, Some(&repo.name))?;

                let hash = host
                    .create_blob(&repo, &content)
                    .await
                    .map_err(|source| match source {
                        HostError::Unauthorized(msg) => PublishError::Auth(msg),
                        HostError::NotAdmitted => {
                            budget.refusal(DeployStage::BuildingObjects, Some(&repo.name))
                        }
                        source => PublishError::ObjectCreation {
                            path: path.clone(),
                            repository: repo.name.clone(),
                            source,
                        },
                    })?;
                tracing::debug!(path = %path, blob = %hash.short(), "blob created");
                Ok::<TreeEntry, PublishError>(TreeEntry::blob(path, hash))
            });
        }

        let mut entries = Vec::with_capacity(bundle.len());
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(entry)) => entries.push(entry),
                Ok(Err(err)) => {
                    join_set.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    join_set.abort_all();
                    return Err(PublishError::Internal(format!(
                        "blob task panicked: {join_err}"
                    )));
                }
            }
        }
        Ok(entries)
    }
}
