//! Bounds the number of requests in flight against a host.

use std::sync::Arc;

use async_trait::async_trait;
use modelship_core::{BranchHead, ObjectHash, RepositoryDescriptor, TreeEntry};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::host::{NewRepository, RepositoryHost};
use crate::HostError;

/// How long one caller is prepared to wait for a permit.
#[derive(Debug, Clone)]
pub struct Admission {
    pub deadline: Instant,
    pub cancel: CancellationToken,
}

impl Admission {
    fn closed(&self) -> bool {
        self.cancel.is_cancelled() || Instant::now() >= self.deadline
    }
}

/// A [`RepositoryHost`] that holds a semaphore permit for the duration of each call.
///
/// Several `Throttled` wrappers built with [`Throttled::sharing`] draw from the
/// same pool, so concurrent deployments against one account stay under a
/// single ceiling.
#[derive(Debug)]
pub struct Throttled<H> {
    inner: Arc<H>,
    limiter: Arc<Semaphore>,
    admission: Option<Admission>,
}

impl<H> Throttled<H> {
    pub fn new(inner: H, max_in_flight: usize) -> Self {
        Self::sharing(inner, Arc::new(Semaphore::new(max_in_flight.max(1))))
    }

    pub fn sharing(inner: H, limiter: Arc<Semaphore>) -> Self {
        Self {
            inner: Arc::new(inner),
            limiter,
            admission: None,
        }
    }

    pub fn limiter(&self) -> Arc<Semaphore> {
        Arc::clone(&self.limiter)
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Wait for a permit. With an admission set, give up with
    /// [`HostError::NotAdmitted`] once it closes, even if a permit frees up
    /// at the same moment; the call is then never issued.
    async fn permit(&self) -> Result<SemaphorePermit<'_>, HostError> {
        let Some(admission) = &self.admission else {
            return self
                .limiter
                .acquire()
                .await
                .map_err(|_| HostError::LimiterClosed);
        };

        let permit = tokio::select! {
            permit = self.limiter.acquire() => permit.map_err(|_| HostError::LimiterClosed)?,
            _ = admission.cancel.cancelled() => return Err(HostError::NotAdmitted),
            _ = tokio::time::sleep_until(admission.deadline) => return Err(HostError::NotAdmitted),
        };
        if admission.closed() {
            return Err(HostError::NotAdmitted);
        }
        Ok(permit)
    }
}

#[async_trait]
impl<H: RepositoryHost + 'static> RepositoryHost for Throttled<H> {
    fn bounded(self: Arc<Self>, admission: Admission) -> Arc<dyn RepositoryHost> {
        Arc::new(Throttled {
            inner: Arc::clone(&self.inner),
            limiter: Arc::clone(&self.limiter),
            admission: Some(admission),
        })
    }

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryDescriptor, HostError> {
        let _permit = self.permit().await?;
        self.inner.create_repository(request).await
    }

    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryDescriptor>, HostError> {
        let _permit = self.permit().await?;
        self.inner.get_repository(name).await
    }

    async fn get_branch_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<BranchHead, HostError> {
        let _permit = self.permit().await?;
        self.inner.get_branch_ref(repo, branch).await
    }

    async fn create_blob(
        &self,
        repo: &RepositoryDescriptor,
        content: &[u8],
    ) -> Result<ObjectHash, HostError> {
        let _permit = self.permit().await?;
        self.inner.create_blob(repo, content).await
    }

    async fn create_tree(
        &self,
        repo: &RepositoryDescriptor,
        base_tree: &ObjectHash,
        entries: &[TreeEntry],
    ) -> Result<ObjectHash, HostError> {
        let _permit = self.permit().await?;
        self.inner.create_tree(repo, base_tree, entries).await
    }

    async fn create_commit(
        &self,
        repo: &RepositoryDescriptor,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> Result<ObjectHash, HostError> {
        let _permit = self.permit().await?;
        self.inner.create_commit(repo, message, tree, parents).await
    }

    async fn update_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
        commit: &ObjectHash,
        force: bool,
    ) -> Result<(), HostError> {
        let _permit = self.permit().await?;
        self.inner.update_ref(repo, branch, commit, force).await
    }
}
