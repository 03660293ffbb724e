use clap::Args;
use modelship_publish::ModelshipConfig;
use modelship_server::AppState;

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address (overrides [server].listen)
    #[arg(short, long)]
    listen: Option<String>,
}

pub async fn run(args: ServeArgs, config: ModelshipConfig) -> anyhow::Result<()> {
    let host = super::build_host(&config)?;
    let state = AppState::new(host, &config)?;
    let listen = args.listen.unwrap_or_else(|| config.server.listen.clone());
    let listener = tokio::net::TcpListener::bind(&listen).await?;

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    modelship_server::serve(listener, state).await?;
    Ok(())
}
