//! Device registry and per-device dispatch
//!
//! The controller is the listener's delegate. Accepted attaches go into the
//! [`DeviceRegistry`] and get one worker task running the configured
//! [`DeviceAction`]; detaches remove the device and flip its plugged flag.

mod action;
mod registry;
mod worker;

pub use action::{DeviceAction, ShellAction, ToolAction};
pub use registry::DeviceRegistry;
pub use worker::is_port_unavailable;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;

use usbmux_core::config::ClientConfig;
use usbmux_core::{DeviceDelegate, EventError, ListenerError};
use usbmux_protocol::DeviceEvent;

use crate::client::MuxClient;
use crate::device::Device;
use crate::listener::MuxListener;
use worker::WorkerContext;

/// Decides whether an attached device is accepted; may set its payload
pub type PlugHook = Arc<dyn Fn(&mut Device) -> bool + Send + Sync>;

/// Called once after a registered device is removed
pub type UnplugHook = Arc<dyn Fn(&Device) + Send + Sync>;

/// Custom per-device work, repeated until it succeeds
pub type PollHook = Arc<dyn Fn(Device) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Optional callbacks for a [`DeviceController`]
#[derive(Clone, Default)]
pub struct ControllerHooks {
    on_plug: Option<PlugHook>,
    on_unplug: Option<UnplugHook>,
    on_progress: Option<PollHook>,
}

impl ControllerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_plug<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Device) -> bool + Send + Sync + 'static,
    {
        self.on_plug = Some(Arc::new(hook));
        self
    }

    pub fn on_unplug<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Device) + Send + Sync + 'static,
    {
        self.on_unplug = Some(Arc::new(hook));
        self
    }

    /// Poll callback, used only when no other action is configured
    pub fn on_progress<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Device) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_progress = Some(Arc::new(move |device| hook(device).boxed()));
        self
    }
}

pub struct DeviceController {
    client: MuxClient,
    target: Option<String>,
    registry: DeviceRegistry,
    on_plug: Option<PlugHook>,
    on_unplug: Option<UnplugHook>,
    worker: Arc<WorkerContext>,
}

impl DeviceController {
    pub fn new(client: MuxClient, config: &ClientConfig, hooks: ControllerHooks) -> Self {
        let action = DeviceAction::resolve(
            &config.controller.actions,
            hooks.on_progress.is_some(),
        );
        tracing::info!("Device action: {}", action.name());

        let target = config
            .controller
            .target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Self {
            client,
            target,
            registry: DeviceRegistry::new(),
            on_plug: hooks.on_plug,
            on_unplug: hooks.on_unplug,
            worker: Arc::new(WorkerContext {
                action,
                ssh: config.ssh.clone(),
                tools: config.tools.clone(),
                poll: hooks.on_progress,
                poll_retry_delay: config.controller.poll_retry_delay,
            }),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn action(&self) -> &DeviceAction {
        &self.worker.action
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Start a listener that feeds this controller
    ///
    /// Returns the listener, for closing it, and the driver task.
    pub fn listen(self: &Arc<Self>) -> Result<(MuxListener, JoinHandle<()>), ListenerError> {
        let delegate: Arc<dyn DeviceDelegate> = Arc::clone(self) as Arc<dyn DeviceDelegate>;
        let listener = self.client.listener(delegate);
        let driver = listener.start()?;
        Ok((listener, driver))
    }
}

impl DeviceDelegate for DeviceController {
    fn device_attached(&self, event: &DeviceEvent) {
        let serial = event.serial();
        if let Some(target) = &self.target {
            if target != serial {
                tracing::info!("Device plugged [{}] but not target", serial);
                return;
            }
        }

        let mut device = Device::from_event(self.client.clone(), event);
        if let Some(on_plug) = &self.on_plug {
            if !on_plug(&mut device) {
                tracing::info!("Device plugged [{}] but rejected", serial);
                return;
            }
        }

        if let Some(previous) = self.registry.insert(device.clone()) {
            tracing::warn!(
                "Session {} attached again, replacing {}",
                previous.id,
                previous.udid
            );
            previous.cancel();
        }
        tracing::info!(
            "Device plugged [{}]: {} {:#x}",
            self.registry.live_count(),
            device.udid,
            device.product
        );

        if self.worker.action != DeviceAction::Idle {
            tokio::spawn(worker::run(Arc::clone(&self.worker), device));
        }
    }

    fn device_detached(&self, event: &DeviceEvent) {
        let Some(device) = self.registry.remove(event.device_id) else {
            tracing::debug!("Detached unknown session {}", event.device_id);
            return;
        };

        device.cancel();
        tracing::info!(
            "Device unplugged [{}]: {}",
            self.registry.live_count(),
            device.udid
        );
        if let Some(on_unplug) = &self.on_unplug {
            on_unplug(&device);
        }
    }

    fn protocol_error(&self, error: &EventError, raw: &[u8]) {
        tracing::warn!("Listener protocol error: {} ({} bytes)", error, raw.len());
        tracing::trace!("Offending payload: {}", String::from_utf8_lossy(raw));
    }
}

impl std::fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("target", &self.target)
            .field("action", &self.worker.action)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
