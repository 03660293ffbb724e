use clap::Args;
use modelship_publish::ModelshipConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Print the default config file location instead
    #[arg(long)]
    path: bool,
}

pub fn run(args: ConfigArgs, config: &ModelshipConfig) -> anyhow::Result<()> {
    if args.path {
        println!("{}", crate::config::default_config_path()?.display());
        return Ok(());
    }
    print!("{}", crate::config::render_config(config)?);
    Ok(())
}
