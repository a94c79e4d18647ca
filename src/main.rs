use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use fire_es::api::{Cli, Command, run_http_server};

/// `FIRE_LOG` wins over `--log-level`, e.g. `FIRE_LOG=fire_es=debug`.
fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env("FIRE_LOG")
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Serve(args) => {
            if let Err(e) = run_http_server(args).await {
                tracing::error!(error = %e, "server error");
                std::process::exit(1);
            }
        }
    }
}
