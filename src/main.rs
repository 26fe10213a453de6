// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podcaster::{DataDir, HeadlessBackend, Podcaster, ReqwestClient, ServiceOptions, serve};

/// Keep a local podcast library and serve it to a front-end
#[derive(Parser, Debug)]
#[command(name = "podcasterd")]
#[command(about = "Keep a local podcast library and serve it to a front-end")]
#[command(version)]
struct Args {
    /// Directory holding the library snapshot, feed list and downloads
    data_dir: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:50051")]
    listen: SocketAddr,

    /// Number of most recent episodes kept per feed
    #[arg(short, long, default_value = "10")]
    max_episodes: usize,

    /// Persist the playback position every n-th client poll
    #[arg(long, default_value = "60")]
    checkpoint_every: u64,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    debug: bool,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let data_dir = DataDir::open(&args.data_dir).context("Data directory is not usable")?;
    let options = ServiceOptions {
        max_episodes_per_podcast: args.max_episodes,
        checkpoint_every: args.checkpoint_every,
    };

    let shutdown = CancellationToken::new();
    let service = Arc::new(
        Podcaster::open(
            data_dir,
            ReqwestClient::new().context("Failed to set up HTTP client")?,
            Box::new(HeadlessBackend::new()),
            options,
            shutdown.clone(),
        )
        .context("Failed to open library")?,
    );

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to listen on {}", args.listen))?;
    info!("Listening on {}", args.listen);

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            on_signal.cancel();
        }
    });

    serve(listener, Arc::clone(&service), shutdown)
        .await
        .context("Server failed")?;

    service.shutdown().await;
    Ok(())
}
