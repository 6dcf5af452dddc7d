//! earthd - EarthOS device management daemon
//!
//! Hosts the device registry, installation ledger and update session
//! manager over a file-backed store.
//!
//! Usage:
//!   earthd [OPTIONS] [config.toml]
//!
//! Options:
//!   --data-dir <path>    Override `data_dir` from the config file
//!   --register <name>    Register a device, print its id and exit
//!   --list               Print registered devices and exit
//!
//! Without a config file the daemon runs with defaults rooted at
//! `./earth-data`.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use earth_core::CatalogService;
use earth_registry::{DeviceRegistry, JsonFileStore};
use earth_update::{FileCatalog, FileTransfer, StagingInstaller, StaticCatalog, UpdateSessionManager};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{DaemonConfig, LogFormat};

/// What to do after start-up
enum Command {
    Serve,
    Register(String),
    List,
}

/// Parsed command-line arguments
struct Args {
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        data_dir: None,
        command: Command::Serve,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing argument for --data-dir"))?;
                result.data_dir = Some(PathBuf::from(value));
                i += 2;
            }
            "--register" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing argument for --register"))?;
                result.command = Command::Register(value.clone());
                i += 2;
            }
            "--list" => {
                result.command = Command::List;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                result.config_path = Some(PathBuf::from(arg));
                i += 1;
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(result)
}

fn print_help() {
    eprintln!(
        r#"earthd - EarthOS device management daemon

Usage: earthd [OPTIONS] [config.toml]

Options:
      --data-dir <path>    Override data_dir from the config file
      --register <name>    Register a device, print its id and exit
      --list               Print registered devices and exit
  -h, --help               Print this help message

Examples:
  # Run with defaults (./earth-data, empty catalog)
  earthd

  # Run with config file
  earthd /etc/earthd/config.toml

  # Provision a device
  earthd --register "Living room tablet" /etc/earthd/config.toml
"#
    );
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "earthd=info,earth_registry=info,earth_update=info".into());
    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let mut config = match args.config_path {
        Some(ref path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    init_logging(config.log_format);
    tracing::info!("Starting earthd (EarthOS device management daemon)");
    match args.config_path {
        Some(ref path) => tracing::info!("Loaded config from: {}", path.display()),
        None => tracing::info!("No config file provided, using defaults"),
    }

    let store = JsonFileStore::open(&config.data_dir).await?;
    let registry = DeviceRegistry::new(Arc::new(store));

    match args.command {
        Command::Register(name) => {
            let device = registry.register(&name).await?;
            println!("{}", device.device_id);
            return Ok(());
        }
        Command::List => {
            for device in registry.list().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    device.device_id, device.os_version, device.theme, device.name
                );
            }
            return Ok(());
        }
        Command::Serve => {}
    }

    let catalog: Arc<dyn CatalogService> = match config.catalog.manifest {
        Some(ref manifest) => {
            tracing::info!(manifest = %manifest.display(), "Using file catalog");
            Arc::new(FileCatalog::new(manifest))
        }
        None => {
            tracing::warn!("No catalog manifest configured, no updates will be offered");
            Arc::new(StaticCatalog::default())
        }
    };
    let manager = UpdateSessionManager::new(
        registry,
        catalog,
        Arc::new(FileTransfer::new(&config.catalog.packages_dir)),
        Arc::new(StagingInstaller::new(config.staging_dir())),
        config.update.clone(),
    );

    let devices = manager.registry().list().await?;
    tracing::info!(
        devices = devices.len(),
        data_dir = %config.data_dir.display(),
        "Device registry ready"
    );

    if config.auto_update_interval_secs > 0 {
        let sweeper = manager.clone();
        let period = Duration::from_secs(config.auto_update_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match sweeper.auto_update_sweep().await {
                    Ok(started) if !started.is_empty() => {
                        tracing::info!(sessions = started.len(), "Automatic updates started")
                    }
                    Ok(_) => tracing::debug!("Automatic update sweep found nothing to do"),
                    Err(e) => tracing::warn!(error = %e, "Automatic update sweep failed"),
                }
            }
        });
        tracing::info!(
            interval_secs = config.auto_update_interval_secs,
            "Automatic update sweep enabled"
        );
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
