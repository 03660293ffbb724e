pub mod budget;
pub mod commit;
pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod provision;
pub mod result;
pub mod state;

pub use budget::RunBudget;
pub use commit::{CommitPublisher, PublishedCommit};
pub use config::{
    BundleOptions, ModelshipConfig, NamingStrategy, PipelineOptions, PublishSettings,
    ReadinessPolicy, RepositoryOptions, ServerConfig,
};
pub use error::PublishError;
pub use graph::{BuiltTree, ObjectGraphBuilder};
pub use pipeline::{DeployRequest, DeploymentPipeline};
pub use provision::{repository_name, Provisioner};
pub use result::{assemble_result, DeploymentResult};
pub use state::{DeployStage, DeployState, DeployTracker, StateTransition};
