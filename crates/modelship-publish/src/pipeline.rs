//! One deployment, end to end.
//!
//! Extract and synthesize the bundle, provision a repository, wait for its
//! branch, upload blobs and a tree, then commit and move the branch. Each
//! stage runs once; a failure anywhere is terminal and nothing is retried
//! across stages. The branch is written last, so an aborted run never
//! leaves it pointing at a partial tree.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use modelship_bundle::{extract_archive, synthesize_manifests};
use modelship_host::RepositoryHost;
use tokio_util::sync::CancellationToken;

use crate::commit::CommitPublisher;
use crate::config::PublishSettings;
use crate::graph::ObjectGraphBuilder;
use crate::provision::{repository_name, Provisioner};
use crate::result::{assemble_result, DeploymentResult};
use crate::state::{DeployStage, DeployState, DeployTracker, StateTransition};
use crate::{PublishError, RunBudget};

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub archive: Bytes,
    pub filename: String,
    /// Feeds content-hash naming so two users uploading the same archive
    /// get separate repositories.
    pub requester: Option<String>,
    /// Timestamp written into generated files; now when unset.
    pub generated_at: Option<DateTime<Utc>>,
    /// Overrides the configured pipeline timeout.
    pub timeout: Option<Duration>,
}

impl DeployRequest {
    pub fn new(archive: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            archive: archive.into(),
            filename: filename.into(),
            requester: None,
            generated_at: None,
            timeout: None,
        }
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

pub struct DeploymentPipeline {
    host: Arc<dyn RepositoryHost>,
    settings: PublishSettings,
    tracker: DeployTracker,
}

impl DeploymentPipeline {
    pub fn new(host: Arc<dyn RepositoryHost>, settings: PublishSettings) -> Self {
        Self {
            host,
            settings,
            tracker: DeployTracker::new(),
        }
    }

    pub fn state(&self) -> &DeployState {
        self.tracker.state()
    }

    pub fn transitions(&self) -> &[StateTransition] {
        self.tracker.transitions()
    }

    /// Run the deployment. `cancel` stops the run before its next stage or
    /// remote call; calls already in flight complete.
    ///
    /// A pipeline runs once. Calling `run` again after it finished is an
    /// [`PublishError::Internal`] error and touches nothing.
    pub async fn run(
        &mut self,
        request: DeployRequest,
        cancel: CancellationToken,
    ) -> Result<DeploymentResult, PublishError> {
        if self.tracker.state().is_terminal() {
            return Err(PublishError::Internal(format!(
                "pipeline already finished as {}",
                self.tracker.state()
            )));
        }
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.settings.pipeline.timeout());
        let budget = RunBudget::new(timeout, cancel);
        tracing::info!(
            archive = %request.filename,
            bytes = request.archive.len(),
            ?timeout,
            "deployment started"
        );

        match self.execute(&request, &budget).await {
            Ok(result) => Ok(result),
            Err(err) => {
                if let Err(state_err) = self.tracker.fail(err.to_string()) {
                    tracing::error!("{state_err}");
                }
                tracing::warn!(
                    stage = ?err.stage(),
                    repository = ?err.repository(),
                    "deployment failed: {err}"
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &mut self,
        request: &DeployRequest,
        budget: &RunBudget,
    ) -> Result<DeploymentResult, PublishError> {
        let settings = &self.settings;
        let host = Arc::clone(&self.host).bounded(budget.admission());

        budget.check(DeployStage::Validating, None)?;
        let bundle = extract_archive(&request.archive, &request.filename, &settings.bundle.limits)?;
        tracing::debug!(
            files = bundle.len(),
            bytes = bundle.total_bytes(),
            "bundle extracted"
        );
        let generated_at = request.generated_at.unwrap_or_else(Utc::now);
        let name = repository_name(
            settings.repository.naming,
            &settings.repository.prefix,
            request.requester.as_deref().unwrap_or_default(),
            &bundle,
            generated_at,
        );
        let bundle = synthesize_manifests(
            bundle,
            &request.filename,
            request.archive.len() as u64,
            generated_at,
            &settings.bundle.manifest,
        );

        self.tracker.enter(DeployStage::Provisioning)?;
        let provisioner = Provisioner::new(
            host.as_ref(),
            &settings.repository,
            &settings.readiness,
        );
        let repo = provisioner.provision(&name, budget).await?;

        self.tracker.enter(DeployStage::AwaitingBaseRef)?;
        let branch = settings
            .repository
            .branch
            .clone()
            .unwrap_or_else(|| repo.default_branch.clone());
        let base = provisioner.await_base_ref(&repo, &branch, budget).await?;

        self.tracker.enter(DeployStage::BuildingObjects)?;
        budget.check(DeployStage::BuildingObjects, Some(&repo.name))?;
        let built = ObjectGraphBuilder::new(Arc::clone(&host), settings.pipeline.blob_concurrency)
            .build(&repo, &base.tree, &bundle, budget)
            .await?;

        self.tracker.enter(DeployStage::Committing)?;
        budget.check(DeployStage::Committing, Some(&repo.name))?;
        let published = CommitPublisher::new(host.as_ref())
            .publish(
                &repo,
                &branch,
                &settings.pipeline.commit_message,
                &built.tree,
                &base,
                budget,
            )
            .await?;

        self.tracker.publish()?;
        Ok(assemble_result(
            &repo,
            built.entries.len(),
            published.commit,
            &settings.pipeline.deploy_url_template,
        ))
    }
}
