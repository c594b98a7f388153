//! Ramdisk server binary
//!
//! Runs the ramdisk on an in-process kernel and channel transport until
//! SIGTERM or Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! ramdiskfs-server                          # defaults, or ./ramdiskfs.toml if present
//! ramdiskfs-server --config ramdisk.toml
//! ramdiskfs-server --max-files 16 --memory-limit 1048576
//! ramdiskfs-server --selftest               # run one client round-trip, then exit
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use ramdiskfs_core::LocalKernel;
use ramdiskfs_server::constants::DEFAULT_CONFIG_FILE;
use ramdiskfs_server::{Client, Exit, Server, ServerConfig, Signal, Switchboard, channel};
use ramdiskfs_types::{Endpoint, Epoch, OpenFlags, ServiceId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Endpoint used by the built-in self test client.
const SELFTEST_ENDPOINT: Endpoint = Endpoint::new(100);

/// In-memory file server.
#[derive(Parser, Debug)]
#[command(name = "ramdiskfs-server")]
#[command(about = "Message-driven in-memory file server")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File table capacity
    #[arg(long)]
    max_files: Option<usize>,

    /// Initial allocation of a new file, in bytes
    #[arg(long)]
    default_alloc_size: Option<usize>,

    /// Cap on total file memory, in bytes
    #[arg(long)]
    memory_limit: Option<usize>,

    /// Endpoint to receive on
    #[arg(long)]
    endpoint: Option<i32>,

    /// Service id stamped into capabilities
    #[arg(long)]
    service_id: Option<u32>,

    /// Capability epoch
    #[arg(long)]
    epoch: Option<u32>,

    /// Open, write, read back and close one file, then exit
    #[arg(long)]
    selftest: bool,
}

impl Args {
    fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => ServerConfig::load(DEFAULT_CONFIG_FILE)?,
            None => ServerConfig::default(),
        };

        if let Some(n) = self.max_files {
            config.ramdisk.max_files = n;
        }
        if let Some(n) = self.default_alloc_size {
            config.ramdisk.default_alloc_size = n;
        }
        if let Some(n) = self.memory_limit {
            config.ramdisk.memory_limit = Some(n);
        }
        if let Some(ep) = self.endpoint {
            config.endpoint = Endpoint::new(ep);
        }
        if let Some(id) = self.service_id {
            config.service_id = ServiceId::new(id);
        }
        if let Some(epoch) = self.epoch {
            config.epoch = Epoch::new(epoch);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let kernel = Arc::new(LocalKernel::new());
    let (mut port, board) = channel(config.queue_depth);
    let mut server = Server::init_fresh(&config, kernel.clone());

    let serve = tokio::spawn(async move {
        let exit = server.run(&mut port).await;
        (exit, server.stats())
    });

    if args.selftest {
        let outcome = selftest(kernel, &board).await;
        board.signal(Signal::Term).await?;
        outcome?;
    } else {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        board.signal(Signal::Term).await?;
    }

    let (exit, stats) = serve.await.context("server task panicked")?;
    tracing::info!(?exit, files = stats.files, "ramdisk server stopped");
    if exit != Exit::Terminated {
        bail!("server stopped unexpectedly: {exit:?}");
    }
    Ok(())
}

async fn selftest(kernel: Arc<LocalKernel>, board: &Switchboard) -> Result<()> {
    let port = board.connect(SELFTEST_ENDPOINT)?;
    let mut client = Client::new(kernel, port);
    let payload = b"ramdiskfs selftest";

    let file = client.open(b"selftest", OpenFlags::create_exclusive()).await?;
    let written = client.write(&file, 0, payload).await?;
    let back = client.read(&file, 0, payload.len() * 2).await?;
    client.close(&file).await?;

    if written != payload.len() || back != payload {
        bail!("selftest mismatch: wrote {written} bytes, read back {back:?}");
    }
    tracing::info!("selftest passed ({} bytes round-tripped)", written);
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
