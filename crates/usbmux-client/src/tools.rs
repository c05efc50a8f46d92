//! External device tools
//!
//! App launch, install, uninstall and reboot go through the libimobiledevice
//! command-line tools. Each invocation is bounded by a timeout; a tool that
//! exits non-zero or times out is logged, only a failure to launch it at all
//! is returned as an error.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

use usbmux_core::config::ToolsConfig;

/// One tool invocation: program plus arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: &'static str,
    pub args: Vec<String>,
}

impl ToolCommand {
    fn new(program: &'static str, udid: &str, rest: &[&str]) -> Self {
        let mut args = vec!["-u".to_string(), udid.to_string()];
        args.extend(rest.iter().map(|arg| arg.to_string()));
        Self { program, args }
    }

    pub fn product_version(udid: &str) -> Self {
        Self::new("ideviceinfo", udid, &["-k", "ProductVersion"])
    }

    pub fn mount_image(udid: &str, image: &Path) -> Self {
        let image = image.to_string_lossy();
        Self::new("ideviceimagemounter", udid, &[image.as_ref()])
    }

    pub fn launch_app(udid: &str, bundle_id: &str) -> Self {
        Self::new("idevicedebug", udid, &["run", bundle_id])
    }

    pub fn install_app(udid: &str, ipa: &Path) -> Self {
        let ipa = ipa.to_string_lossy();
        Self::new("ideviceinstaller", udid, &["-i", ipa.as_ref()])
    }

    pub fn uninstall_app(udid: &str, bundle_id: &str) -> Self {
        Self::new("ideviceinstaller", udid, &["-U", bundle_id])
    }

    pub fn restart(udid: &str) -> Self {
        Self::new("idevicediagnostics", udid, &["restart"])
    }

    fn command(&self) -> Command {
        let mut command = Command::new(self.program);
        command.args(&self.args).kill_on_drop(true);
        command
    }
}

/// Runs device tools for one device
#[derive(Debug, Clone)]
pub struct ToolRunner {
    udid: String,
    config: ToolsConfig,
}

impl ToolRunner {
    pub fn new(udid: impl Into<String>, config: ToolsConfig) -> Self {
        Self {
            udid: udid.into(),
            config,
        }
    }

    /// `major.minor` of the device's OS version
    pub async fn product_version(&self) -> Result<String> {
        let tool = ToolCommand::product_version(&self.udid);
        let output = tokio::time::timeout(
            self.config.tool_timeout,
            tool.command().stderr(Stdio::null()).output(),
        )
        .await
        .map_err(|_| anyhow!("{} timed out", tool.program))?
        .with_context(|| format!("Failed to launch {}", tool.program))?;

        let text = String::from_utf8_lossy(&output.stdout);
        major_minor(&text).ok_or_else(|| anyhow!("no product version reported for {}", self.udid))
    }

    /// Developer disk image matching the device's OS version
    pub async fn disk_image(&self) -> Result<PathBuf> {
        let version = self.product_version().await?;
        Ok(disk_image_path(&self.config.support_dir, &version))
    }

    /// Mount the developer disk image, then launch `bundle_id`
    pub async fn run_app(&self, bundle_id: &str) -> Result<()> {
        let image = self.disk_image().await?;
        tracing::info!("[{}] Mounting {}", self.udid, image.display());
        self.invoke(ToolCommand::mount_image(&self.udid, &image), self.config.tool_timeout)
            .await?;

        tracing::info!("[{}] Starting {}", self.udid, bundle_id);
        self.invoke(
            ToolCommand::launch_app(&self.udid, bundle_id),
            self.config.run_timeout,
        )
        .await?;
        tracing::info!("[{}] App started", self.udid);
        Ok(())
    }

    pub async fn install_app(&self, ipa: &Path) -> Result<()> {
        tracing::info!("[{}] Installing {}", self.udid, ipa.display());
        self.invoke(ToolCommand::install_app(&self.udid, ipa), self.config.tool_timeout)
            .await?;
        tracing::info!("[{}] App installed", self.udid);
        Ok(())
    }

    pub async fn uninstall_app(&self, bundle_id: &str) -> Result<()> {
        tracing::info!("[{}] Uninstalling {}", self.udid, bundle_id);
        self.invoke(
            ToolCommand::uninstall_app(&self.udid, bundle_id),
            self.config.tool_timeout,
        )
        .await?;
        tracing::info!("[{}] App uninstalled", self.udid);
        Ok(())
    }

    pub async fn reboot(&self) -> Result<()> {
        tracing::info!("[{}] Rebooting", self.udid);
        self.invoke(ToolCommand::restart(&self.udid), self.config.tool_timeout)
            .await
    }

    async fn invoke(&self, tool: ToolCommand, timeout: Duration) -> Result<()> {
        let mut child = tool
            .command()
            .spawn()
            .with_context(|| format!("Failed to launch {}", tool.program))?;

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {}
            Ok(Ok(status)) => {
                tracing::warn!("[{}] {} exited with {}", self.udid, tool.program, status)
            }
            Ok(Err(e)) => tracing::warn!("[{}] {} failed: {}", self.udid, tool.program, e),
            Err(_) => {
                tracing::warn!(
                    "[{}] {} timed out after {:?}",
                    self.udid,
                    tool.program,
                    timeout
                );
                if let Err(e) = child.kill().await {
                    tracing::debug!("Failed to kill {}: {}", tool.program, e);
                }
            }
        }
        Ok(())
    }
}

/// Reduce an OS version such as `14.4.2` to `14.4`
pub fn major_minor(version: &str) -> Option<String> {
    let mut parts = version.trim().split('.');
    let major = parts.next().filter(|p| is_number(p))?;
    let minor = parts.next().filter(|p| is_number(p)).unwrap_or("0");
    Some(format!("{}.{}", major, minor))
}

fn is_number(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

pub fn disk_image_path(support_dir: &Path, version: &str) -> PathBuf {
    support_dir
        .join("DeviceSupport")
        .join(version)
        .join("DeveloperDiskImage.dmg")
}
