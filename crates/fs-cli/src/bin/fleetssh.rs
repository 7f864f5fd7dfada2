use anyhow::Result;
use fs_cli::{cli::Args, interactive::run_interactive, logging::init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse_config()?;
    init_tracing(config.verbosity, config.log_file.as_deref())?;
    let server_id = config.server_id.clone();
    let reason = run_interactive(config).await?;
    info!(%server_id, ?reason, "terminal session finished");
    Ok(())
}
