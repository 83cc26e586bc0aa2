//! Shared line document server.
//!
//! Serves one document to every client that connects. With `--file`, the
//! document is loaded at startup and written back on Ctrl-C.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use linesync_collab::server::{ServerConfig, SyncServer};
use linesync_collab::storage::{load_lines, save_lines, StorageError};

#[derive(Parser, Debug)]
#[command(name = "linesync-server")]
#[command(about = "Serve a shared line document over TCP")]
struct Args {
    /// Interface to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 9090)]
    port: u16,

    /// Text file to load at startup and save at shutdown
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Seconds of silence before a client is dropped
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    idle_timeout: u64,
}

fn initial_lines(file: Option<&PathBuf>) -> anyhow::Result<Vec<String>> {
    let Some(path) = file else {
        return Ok(vec![String::new()]);
    };
    match load_lines(path) {
        Ok(lines) => Ok(lines),
        Err(StorageError::NotFound(_)) => {
            log::info!("{} does not exist yet, starting empty", path.display());
            Ok(vec![String::new()])
        }
        Err(e) => Err(e).context("loading document"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        idle_timeout: Duration::from_secs(args.idle_timeout),
        initial_lines: initial_lines(args.file.as_ref())?,
        ..ServerConfig::default()
    };

    let server = SyncServer::bind(config).await?;
    log::info!("Listening on {}", server.local_addr()?);

    let snapshot = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Could not listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    log::info!(
        "Final document: version {} with {} lines",
        snapshot.version,
        snapshot.lines.len()
    );
    if let Some(path) = &args.file {
        save_lines(path, &snapshot.lines).context("saving document")?;
    }
    Ok(())
}
