use clap::Parser;
use mlbpredicts::cli::Cli;
use mlbpredicts::config::AppConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    match cli.run(config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "fatal");
            std::process::exit(e.exit_code());
        }
    }
}
