//! dynhttp: an embedded HTTP/HTTPS server driven by live configuration.
//!
//! The server's configuration is read from a JSON file and re-applied
//! whenever the file changes: each change tears the running server down
//! and brings up one that matches. Removing the file (or writing `null`)
//! stops the server.
//!
//! Usage:
//!   dynhttp --config dynhttp.json                 # Serve per dynhttp.json
//!   dynhttp --config conf.json --log-threshold info
//!   dynhttp --generate-keystore dev.pem           # Write a dev PEM keystore

mod delivery;
mod hello;
mod keystore;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dynhttp_server::{ConfigurationListener, ServerLifecycle};
use dynhttp_transport::FrontDoor;
use tracing::info;

use crate::delivery::{FileConfigurationSource, SourceHandle};
use crate::hello::HelloFrontDoor;
use crate::logging::{LogThreshold, LoggingConfig};

const DEFAULT_PID: &str = "dynhttp.http";

#[derive(Parser, Debug)]
#[command(name = "dynhttp", about = "Embedded HTTP/HTTPS server with live reconfiguration")]
struct Cli {
    /// Configuration file (JSON object of options); defaults to <data-dir>/dynhttp.json
    #[arg(long)]
    config: Option<PathBuf>,

    /// Identifier of the configuration; names the workspace directory
    #[arg(long, default_value = DEFAULT_PID)]
    pid: String,

    /// Directory for workspaces and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Minimum level that is logged
    #[arg(long, value_enum, default_value_t = LogThreshold::Warn)]
    log_threshold: LogThreshold,

    /// Write logs to a file (defaults to <data-dir>/logs/dynhttp.log if no path given)
    #[arg(long, default_missing_value = "DEFAULT", num_args = 0..=1)]
    log_file: Option<String>,

    /// Enable verbose logging (same as --log-threshold debug)
    #[arg(long)]
    verbose: bool,

    /// Write a self-signed development keystore (PEM) to this path and exit
    #[arg(long)]
    generate_keystore: Option<PathBuf>,
}

fn data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .map(|d| d.join("dynhttp"))
            .unwrap_or_else(|| PathBuf::from(".dynhttp"))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = data_dir(&cli);

    logging::init(&LoggingConfig {
        threshold: if cli.verbose { LogThreshold::Debug } else { cli.log_threshold },
        log_file: cli.log_file.as_ref().map(|arg| {
            if arg == "DEFAULT" {
                data_dir.join("logs/dynhttp.log")
            } else {
                PathBuf::from(arg)
            }
        }),
    })?;

    if let Some(path) = &cli.generate_keystore {
        let fingerprint = keystore::generate(path)?;
        println!("Keystore:    {}", path.display());
        println!("Fingerprint: {fingerprint}");
        println!("Use with ssl.keystore.type = \"PEM\"");
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("dynhttp.json"));
    let workspace_root = data_dir.join("work");

    let lifecycle = Arc::new(ServerLifecycle::new(&workspace_root, Arc::new(HelloFrontDoor::new())));
    let listener = Arc::new(ConfigurationListener::new(&cli.pid, lifecycle));

    println!();
    println!("  dynhttp");
    println!();
    println!("  Configuration: {} (pid {})", config_path.display(), cli.pid);
    println!("  Workspaces:    {}", workspace_root.display());
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    let (source, started) = match FileConfigurationSource::new(config_path, cli.pid.clone())
        .spawn(listener.clone())
        .context("cannot start configuration delivery")
    {
        Ok(source) => (Some(source), Ok(())),
        Err(e) => (None, Err(e)),
    };
    let waited = match started {
        Ok(()) => tokio::signal::ctrl_c().await.context("cannot listen for Ctrl+C"),
        Err(e) => Err(e),
    };

    println!();
    println!("  Shutting down...");
    info!("Shutdown requested");

    let stopped = teardown(source, listener).await;
    waited?;
    stopped?;

    println!("  Server stopped.");
    Ok(())
}

/// Stop delivery, then the server. Lifecycle calls block, and so does
/// dropping the last handle on a running lifecycle, so both happen off the
/// async workers.
async fn teardown<F: FrontDoor>(
    source: Option<SourceHandle>,
    listener: Arc<ConfigurationListener<F>>,
) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || {
        if let Some(source) = source {
            source.stop();
        }
        let stopped = listener.shutdown();
        drop(listener);
        stopped
    })
    .await??;
    Ok(())
}
