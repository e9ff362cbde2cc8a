use clap::Parser;
use tracing_subscriber::EnvFilter;

use safe_sentinel::cli::{Cli, Command, run_command, run_doctor_command};
use safe_sentinel::{App, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    safe_sentinel::bootstrap::load_env();
    init_tracing(cli.log_json);

    if matches!(cli.command, Some(Command::Doctor)) {
        return run_doctor_command().await;
    }

    let config = Config::from_env()?;
    tracing::debug!(
        registry = %config.registry.base_url,
        analyzer = %config.analyzer.base_url,
        signer = %config.signer.base_url,
        "configuration loaded"
    );

    run_command(App::new(config), cli.command).await
}

/// Logs go to stderr so the transcript on stdout stays clean.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("safe_sentinel=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
