use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use modelship_publish::{DeployRequest, DeploymentPipeline, ModelshipConfig};
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct DeployArgs {
    /// ZIP or .tar.gz archive containing load_model.py and requirements.txt
    archive: PathBuf,
    /// Requester identity used for repository naming
    #[arg(long)]
    requester: Option<String>,
    /// Overall deadline in seconds (overrides [pipeline].timeout_secs)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

pub async fn run(args: DeployArgs, config: ModelshipConfig) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.archive)
        .await
        .with_context(|| format!("reading {}", args.archive.display()))?;
    let filename = args
        .archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.archive.display().to_string());

    let mut request = DeployRequest::new(bytes, filename);
    if let Some(requester) = args.requester {
        request = request.with_requester(requester);
    }
    if let Some(secs) = args.timeout_secs {
        request = request.with_timeout(Duration::from_secs(secs));
    }

    let host = super::build_host(&config)?;
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, stopping after in-flight calls");
            on_interrupt.cancel();
        }
    });

    let mut pipeline = DeploymentPipeline::new(host, config.publish_settings());
    let result = pipeline.run(request, cancel).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
