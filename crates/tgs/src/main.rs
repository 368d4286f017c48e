use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tgs_core::{
    config::Config, fetcher::StoryFetcher, ports::StoryService, response::ResponseAssembler,
    session::SessionHandle,
};
use tgs_filehost::TmpFilesHost;
use tgs_http::AppState;
use tgs_mtproto::MtprotoConnector;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "tgs", about = "Fetch Telegram stories over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Log in interactively and write the session file.
    Login,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tgs_core::logging::init("tgs")?;

    let cfg = Config::load().context("loading configuration")?;
    tracing::debug!(config = ?cfg, "configuration loaded");
    let connector = MtprotoConnector::new(cfg.api_id, cfg.api_hash.clone(), cfg.session_file.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Login => {
            let account = tgs_mtproto::login::interactive(&connector)
                .await
                .context("telegram login failed")?;
            println!("Logged in as {account}; session saved to {}", cfg.session_file.display());
            Ok(())
        }
        Command::Serve => serve(cfg, connector).await,
    }
}

async fn serve(cfg: Config, connector: MtprotoConnector) -> anyhow::Result<()> {
    let session = Arc::new(SessionHandle::new(Arc::new(connector)));

    match session.ensure_connected().await {
        Ok(conn) => match conn.account_name().await {
            Ok(name) => tracing::info!(account = %name, "telegram session ready"),
            Err(e) => tracing::warn!(error = %e, "connected but could not read account"),
        },
        Err(e) => tracing::warn!(error = %e, "telegram session not ready; will retry on first request"),
    }

    let fetcher = Arc::new(StoryFetcher::new(session.clone(), cfg.fetch()));
    let shutdown = CancellationToken::new();
    let mut state = AppState::new(fetcher, ResponseAssembler::new(cfg.public_base_url.clone()))
        .with_shutdown(shutdown.clone());
    if cfg.file_host_enabled {
        let host = TmpFilesHost::new(cfg.file_host_upload_url.clone(), cfg.file_host_timeout)
            .context("building file host client")?;
        state = state.with_file_host(Arc::new(host));
    }

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr())
        .await
        .with_context(|| format!("binding {}", cfg.listen_addr()))?;

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                trigger.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    tgs_http::serve(listener, state).await.context("http server failed")?;

    session.shutdown().await;
    tracing::info!("stopped");
    Ok(())
}
