//! The `glimpse serve` command.

use clap::Args;
use glimpse_core::{Captioner, Config};

use crate::server::{create_router, shutdown_signal, AppState};

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides `server.host`)
    #[arg(long, env = "GLIMPSE_HOST")]
    pub host: Option<String>,

    /// Port to listen on (overrides `server.port`)
    #[arg(short, long, env = "GLIMPSE_PORT")]
    pub port: Option<u16>,

    /// Model directory (overrides `general.model_dir`)
    #[arg(long)]
    pub model_dir: Option<std::path::PathBuf>,
}

/// Execute the serve command.
///
/// Every artifact is loaded and cross-checked before the listener binds.
pub async fn execute(args: ServeArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.model_dir {
        config.general.model_dir = dir;
    }
    config.validate()?;

    tracing::info!("Loading models from {:?}", config.model_dir());
    let load_config = config.clone();
    let captioner = tokio::task::spawn_blocking(move || Captioner::load(&load_config))
        .await?
        .map_err(|e| anyhow::anyhow!("Cannot start server: {e}"))?;

    let max_upload_bytes = config.server.max_upload_mb.saturating_mul(1024 * 1024);
    let app = create_router(AppState::new(captioner), max_upload_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
