use std::sync::Arc;

use async_trait::async_trait;

use modelship_core::{BranchHead, ObjectHash, RepositoryDescriptor, TreeEntry, Visibility};

use crate::throttle::Admission;
use crate::HostError;

/// Parameters for creating a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRepository {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    /// Seed the default branch with an initial commit.
    pub initialize: bool,
}

/// The remote content-addressed store, one HTTP round trip per call.
///
/// Blob, tree and commit creation are idempotent: the same content always
/// yields the same hash. `create_repository` is not (a second call with the
/// same name fails with [`HostError::Conflict`]), and neither is
/// `update_ref` without `force` once the ref has moved.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// This host, with any wait for request capacity bounded by `admission`.
    /// Hosts that never wait before issuing a call return themselves.
    fn bounded(self: Arc<Self>, admission: Admission) -> Arc<dyn RepositoryHost>;

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryDescriptor, HostError>;

    /// Look up a repository owned by the same namespace `create_repository` writes to.
    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryDescriptor>, HostError>;

    async fn get_branch_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<BranchHead, HostError>;

    async fn create_blob(
        &self,
        repo: &RepositoryDescriptor,
        content: &[u8],
    ) -> Result<ObjectHash, HostError>;

    /// Extend `base_tree` with `entries`; paths already in the base are replaced.
    async fn create_tree(
        &self,
        repo: &RepositoryDescriptor,
        base_tree: &ObjectHash,
        entries: &[TreeEntry],
    ) -> Result<ObjectHash, HostError>;

    async fn create_commit(
        &self,
        repo: &RepositoryDescriptor,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> Result<ObjectHash, HostError>;

    async fn update_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
        commit: &ObjectHash,
        force: bool,
    ) -> Result<(), HostError>;
}
