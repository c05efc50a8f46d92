//! Per-device worker task

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use usbmux_core::config::{SshConfig, ToolsConfig};
use usbmux_core::ConnectError;

use super::action::{DeviceAction, ShellAction, ToolAction};
use super::PollHook;
use crate::device::Device;

/// Everything a worker needs, shared by all workers of one controller
pub(crate) struct WorkerContext {
    pub(crate) action: DeviceAction,
    pub(crate) ssh: SshConfig,
    pub(crate) tools: ToolsConfig,
    pub(crate) poll: Option<PollHook>,
    pub(crate) poll_retry_delay: Duration,
}

/// Run the configured action once for `device`
pub(crate) async fn run(ctx: Arc<WorkerContext>, device: Device) {
    let result = match &ctx.action {
        DeviceAction::Shell(action) => run_shell(&ctx.ssh, &device, action).await,
        DeviceAction::Tool(action) => run_tool(&ctx.tools, &device, action).await,
        DeviceAction::Poll => {
            if let Some(hook) = &ctx.poll {
                poll(hook, &device, ctx.poll_retry_delay).await;
            }
            return;
        }
        DeviceAction::Idle => return,
    };

    match result {
        Ok(()) => tracing::info!("[{}] {} finished", device.udid, ctx.action.name()),
        Err(e) => tracing::error!("[{}] {} error: {:#}", device.udid, ctx.action.name(), e),
    }
}

async fn run_shell(config: &SshConfig, device: &Device, action: &ShellAction) -> Result<()> {
    let mut shell = device.shell(config);
    shell.connect().await.context("connect ssh")?;

    let result = match action {
        ShellAction::Command { command, stdin } => shell.run(command, stdin).await,
        ShellAction::InstallPackage(package) => shell.install_package(package).await,
        ShellAction::UploadFiles {
            local_dir,
            remote_dir,
            files,
        } => shell.upload_files(local_dir, remote_dir, files).await,
    };

    shell.close().await;
    result
}

async fn run_tool(config: &ToolsConfig, device: &Device, action: &ToolAction) -> Result<()> {
    match action {
        ToolAction::RunApp(bundle_id) => device.run_app(config, bundle_id).await,
        ToolAction::InstallApp(ipa) => device.install_app(config, ipa).await,
        ToolAction::UninstallApp(bundle_id) => device.uninstall_app(config, bundle_id).await,
        ToolAction::Reboot => device.reboot(config).await,
    }
}

/// Call `hook` while the device stays plugged
///
/// Stops on success, on unplug, or when the hook reports that the device
/// port is unavailable. Other failures are retried after `retry_delay`.
pub(crate) async fn poll(hook: &PollHook, device: &Device, retry_delay: Duration) {
    while device.is_plugged() {
        match hook(device.clone()).await {
            Ok(()) => break,
            Err(e) => {
                tracing::warn!("[{}] Poll callback error: {:#}", device.udid, e);
                if is_port_unavailable(&e) {
                    break;
                }
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
    tracing::debug!("[{}] Poll finished", device.udid);
}

/// Whether `err` stems from a port-unavailable connect result
pub fn is_port_unavailable(err: &anyhow::Error) -> bool {
    let text = ConnectError::PortUnavailable.to_string().to_lowercase();
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ConnectError>(),
            Some(ConnectError::PortUnavailable)
        ) || cause.to_string().to_lowercase().contains(&text)
    })
}
