//! usbmux client daemon
//!
//! Watches the usbmux daemon for attached devices and runs one configured
//! action on every device that matches.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usbmux_client::{ControllerHooks, DeviceController, MuxClient};
use usbmux_core::config::{self, serde_utils::string_list, ClientConfig};

#[derive(Parser)]
#[command(name = "usbmux-client")]
#[command(about = "Runs an action on every device attached through usbmuxd")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// SSH user on the devices
    #[arg(long)]
    user: Option<String>,

    /// SSH password for the devices
    #[arg(long)]
    passwd: Option<String>,

    /// Only handle the device with this UDID
    #[arg(long)]
    udid: Option<String>,

    /// Command to execute, then lines fed to its stdin (comma-separated)
    #[arg(long)]
    command: Option<String>,

    /// Debian package to install
    #[arg(long)]
    update: Option<PathBuf>,

    /// Files to upload: localpath,remotepath,file[,file...]
    #[arg(long)]
    upload: Option<String>,

    /// Reboot the device
    #[arg(long)]
    reboot: bool,

    /// Bundle ID of an app to run
    #[arg(long)]
    apprun: Option<String>,

    /// Path of an ipa to install
    #[arg(long)]
    appinstall: Option<PathBuf>,

    /// Bundle ID of an app to uninstall
    #[arg(long)]
    appuninstall: Option<String>,
}

impl Args {
    /// Command-line values take precedence over the config file
    fn apply(self, config: &mut ClientConfig) {
        if let Some(user) = self.user {
            config.ssh.username = user;
        }
        if let Some(password) = self.passwd {
            config.ssh.password = password;
        }
        if let Some(udid) = self.udid {
            config.controller.target = Some(udid);
        }

        let actions = &mut config.controller.actions;
        if let Some(command) = self.command {
            actions.command = string_list::split(&command);
        }
        if self.update.is_some() {
            actions.package = self.update;
        }
        if let Some(upload) = self.upload {
            actions.upload = string_list::split(&upload);
        }
        if self.apprun.is_some() {
            actions.run_app = self.apprun;
        }
        if self.appinstall.is_some() {
            actions.install_app = self.appinstall;
        }
        if self.appuninstall.is_some() {
            actions.uninstall_app = self.appuninstall;
        }
        actions.reboot |= self.reboot;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut config: ClientConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        tracing::debug!("No config at {}, using defaults", config_path.display());
        ClientConfig::default()
    };
    config
        .apply_env()
        .context("Invalid USBMUXD_SOCKET_ADDRESS")?;
    args.apply(&mut config);

    tracing::info!("usbmux client starting, daemon at {}", config.endpoint);

    let client = MuxClient::from_config(&config);
    let controller = Arc::new(DeviceController::new(
        client,
        &config,
        ControllerHooks::new(),
    ));
    let (listener, driver) = controller.listen().context("Failed to start listener")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;
    tracing::info!("Shutting down");

    listener.close();
    if let Err(e) = driver.await {
        tracing::warn!("Listener task ended abnormally: {}", e);
    }

    Ok(())
}
