use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rulegate_server::cli::{self, CliArgs, Command};
use rulegate_server::{app_config, router, startup};

async fn serve(config: &rulegate_core::Config) -> anyhow::Result<()> {
    config.log_summary();

    let state = startup::build_app_state(config, Vec::new())?;
    let app = router::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let mut config = app_config::load_config();

    match args.command {
        None => serve(&config).await?,
        Some(Command::Serve { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(&config).await?;
        }
        Some(Command::Check { artifact }) => {
            for name in cli::check(&config, &artifact)? {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
