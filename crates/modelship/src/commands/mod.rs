pub mod config;
pub mod deploy;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use clap::Subcommand;
use modelship_host::{GitHubHost, RepositoryHost, Throttled};
use modelship_publish::ModelshipConfig;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP deployment service
    Serve(serve::ServeArgs),
    /// Publish one archive and print the result
    Deploy(deploy::DeployArgs),
    /// Print the effective configuration
    Config(config::ConfigArgs),
}

impl Commands {
    pub async fn run(self, config_path: Option<&Path>) -> anyhow::Result<()> {
        let effective = crate::config::load_config(config_path)?;
        match self {
            Commands::Serve(args) => serve::run(args, effective).await,
            Commands::Deploy(args) => deploy::run(args, effective).await,
            Commands::Config(args) => config::run(args, &effective),
        }
    }
}

/// GitHub client behind the per-credential request limiter.
pub(crate) fn build_host(config: &ModelshipConfig) -> anyhow::Result<Arc<dyn RepositoryHost>> {
    if config.host.token.is_none() {
        anyhow::bail!(
            "no host token configured (set MODELSHIP_HOST_TOKEN or [host].token in the config file)"
        );
    }
    let github = GitHubHost::new(&config.host)?;
    Ok(Arc::new(Throttled::new(github, config.host.max_in_flight)))
}
