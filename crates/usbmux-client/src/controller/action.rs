//! Per-device action selection
//!
//! The configuration may name several actions; exactly one is chosen, once,
//! when the controller is built. Priority: command, package, upload,
//! run app, install app, uninstall app, reboot, poll callback.

use std::path::PathBuf;

use usbmux_core::config::ActionConfig;

/// Work done over an SSH session to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellAction {
    /// Run `command`, feeding `stdin` line by line
    Command { command: String, stdin: Vec<String> },
    /// Upload and `dpkg -i` a package
    InstallPackage(PathBuf),
    /// Upload `files` from `local_dir` into `remote_dir`
    UploadFiles {
        local_dir: PathBuf,
        remote_dir: String,
        files: Vec<String>,
    },
}

/// Work done through the external device tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolAction {
    RunApp(String),
    InstallApp(PathBuf),
    UninstallApp(String),
    Reboot,
}

/// The single action run for each accepted device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    Shell(ShellAction),
    Tool(ToolAction),
    /// Call the progress hook until it succeeds or the device goes away
    Poll,
    /// Track devices only
    Idle,
}

impl DeviceAction {
    /// Pick the highest-priority configured action
    pub fn resolve(config: &ActionConfig, has_poll_hook: bool) -> Self {
        if let Some((command, stdin)) = config.command.split_first() {
            return Self::Shell(ShellAction::Command {
                command: command.clone(),
                stdin: stdin.to_vec(),
            });
        }
        if let Some(package) = non_empty_path(&config.package) {
            return Self::Shell(ShellAction::InstallPackage(package));
        }
        if let [local_dir, remote_dir, files @ ..] = config.upload.as_slice() {
            if !files.is_empty() {
                return Self::Shell(ShellAction::UploadFiles {
                    local_dir: PathBuf::from(local_dir),
                    remote_dir: remote_dir.clone(),
                    files: files.to_vec(),
                });
            }
        }
        if let Some(bundle) = non_empty(&config.run_app) {
            return Self::Tool(ToolAction::RunApp(bundle));
        }
        if let Some(ipa) = non_empty_path(&config.install_app) {
            return Self::Tool(ToolAction::InstallApp(ipa));
        }
        if let Some(bundle) = non_empty(&config.uninstall_app) {
            return Self::Tool(ToolAction::UninstallApp(bundle));
        }
        if config.reboot {
            return Self::Tool(ToolAction::Reboot);
        }
        if has_poll_hook {
            return Self::Poll;
        }
        Self::Idle
    }

    /// Whether the action needs an SSH session
    pub fn needs_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Shell(ShellAction::Command { .. }) => "exec command",
            Self::Shell(ShellAction::InstallPackage(_)) => "install package",
            Self::Shell(ShellAction::UploadFiles { .. }) => "upload files",
            Self::Tool(ToolAction::RunApp(_)) => "app run",
            Self::Tool(ToolAction::InstallApp(_)) => "app install",
            Self::Tool(ToolAction::UninstallApp(_)) => "app uninstall",
            Self::Tool(ToolAction::Reboot) => "reboot",
            Self::Poll => "poll",
            Self::Idle => "none",
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

fn non_empty_path(value: &Option<PathBuf>) -> Option<PathBuf> {
    value
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty())
        .cloned()
}
