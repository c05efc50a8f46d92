//! Secure shell over a device tunnel
//!
//! The shell never dials a socket address itself: it asks a [`NetworkDial`]
//! (normally a [`Device`](crate::Device)) for a stream to the device's SSH
//! port and runs the SSH handshake over it.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};

use usbmux_core::config::SshConfig;
use usbmux_core::{NetworkDial, TUNNEL_NETWORK};

/// Where packages are staged before `dpkg -i`
pub const PACKAGE_STAGING_PATH: &str = "/var/mobile/install.deb";

/// SSH session to one device
pub struct DeviceShell {
    dialer: Arc<dyn NetworkDial>,
    config: SshConfig,
    session: Option<Handle<ShellHandler>>,
}

impl DeviceShell {
    pub fn new(dialer: Arc<dyn NetworkDial>, config: SshConfig) -> Self {
        Self {
            dialer,
            config,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Open the tunnel, run the handshake and authenticate with the password
    ///
    /// The whole sequence shares one `connect_timeout` budget.
    pub async fn connect(&mut self) -> Result<()> {
        let timeout = self.config.connect_timeout;
        let session = tokio::time::timeout(timeout, self.open_session())
            .await
            .map_err(|_| anyhow!("SSH connect timed out after {:?}", timeout))??;

        self.session = Some(session);
        Ok(())
    }

    async fn open_session(&self) -> Result<Handle<ShellHandler>> {
        let stream = self
            .dialer
            .dial_network(
                TUNNEL_NETWORK,
                &self.config.port.to_string(),
                self.config.connect_timeout,
            )
            .await
            .context("Failed to open tunnel to SSH port")?;

        let config = Arc::new(Config::default());
        let mut session = client::connect_stream(config, stream, ShellHandler)
            .await
            .context("SSH handshake failed")?;

        tracing::debug!("Authenticating as user '{}'", self.config.username);
        let authenticated = session
            .authenticate_password(self.config.username.clone(), self.config.password.clone())
            .await
            .context("Authentication error")?;
        if !authenticated {
            bail!("unable to authenticate as '{}'", self.config.username);
        }
        Ok(session)
    }

    /// Run `command`, feeding each of `stdin_lines` followed by a newline
    ///
    /// Remote output is copied to local stdout/stderr. Fails unless the
    /// command exits with status 0.
    pub async fn run(&self, command: &str, stdin_lines: &[String]) -> Result<()> {
        let input: String = stdin_lines.iter().map(|line| format!("{}\n", line)).collect();
        self.exec(command, input.as_bytes(), true).await
    }

    /// Stream a local file to `remote`, creating the remote parent directory
    pub async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let file = File::open(local)
            .await
            .with_context(|| format!("Failed to open {}", local.display()))?;
        let size = file.metadata().await.map(|m| m.len()).unwrap_or_default();

        let command = format!(
            "mkdir -p {} && cat > {}",
            shell_quote(remote_parent(remote)),
            shell_quote(remote)
        );
        self.exec(&command, file, false)
            .await
            .with_context(|| format!("Failed to upload {} to {}", local.display(), remote))?;

        tracing::debug!("Uploaded {} ({} bytes) to {}", local.display(), size, remote);
        Ok(())
    }

    /// Upload a Debian package and install it with `dpkg`
    pub async fn install_package(&self, package: &Path) -> Result<()> {
        self.upload(package, PACKAGE_STAGING_PATH).await?;
        self.run("rm -rf /var/lib/dpkg/updates/*", &[]).await?;
        self.run(&format!("dpkg -i {}", shell_quote(PACKAGE_STAGING_PATH)), &[])
            .await
    }

    /// Upload `files`, named relative to `local_dir`, into `remote_dir`
    pub async fn upload_files(
        &self,
        local_dir: &Path,
        remote_dir: &str,
        files: &[String],
    ) -> Result<()> {
        for file in files {
            self.upload(&local_dir.join(file), &remote_join(remote_dir, file))
                .await?;
        }
        Ok(())
    }

    /// Disconnect; a no-op when not connected
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
            {
                tracing::debug!("SSH disconnect failed: {}", e);
            }
        }
    }

    fn session(&self) -> Result<&Handle<ShellHandler>> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("SSH session not connected"))
    }

    async fn exec<R>(&self, command: &str, input: R, echo: bool) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut channel = self
            .session()?
            .channel_open_session()
            .await
            .context("Failed to open session channel")?;

        tracing::debug!("exec: {}", command);
        channel.exec(true, command).await?;
        channel.data(input).await?;
        channel.eof().await?;

        match wait_exit(&mut channel, echo).await? {
            Some(0) => Ok(()),
            Some(code) => bail!("`{}` exited with status {}", command, code),
            None => bail!("`{}` exited without exit status", command),
        }
    }
}

/// Drain a channel until it closes, returning the exit status if one was
/// reported
async fn wait_exit(channel: &mut Channel<Msg>, echo: bool) -> Result<Option<u32>> {
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let mut status = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } if echo => stdout.write_all(data).await?,
            ChannelMsg::ExtendedData { ref data, ext: 1 } if echo => {
                stderr.write_all(data).await?
            }
            ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    if echo {
        stdout.flush().await?;
        stderr.flush().await?;
    }
    Ok(status)
}

struct ShellHandler;

#[async_trait]
impl client::Handler for ShellHandler {
    type Error = anyhow::Error;

    /// The transport is a local USB tunnel, so any host key is accepted
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::trace!("Device host key: {}", server_public_key.fingerprint());
        Ok(true)
    }
}

/// Quote `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Join a remote directory and a relative name with exactly one `/`
pub fn remote_join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}

fn remote_parent(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use usbmux_core::{ConnectError, MuxStream};

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/var/mobile/a b"), "'/var/mobile/a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_remote_join() {
        assert_eq!(remote_join("/var/mobile/", "x.txt"), "/var/mobile/x.txt");
        assert_eq!(remote_join("/var/mobile", "sub/x.txt"), "/var/mobile/sub/x.txt");
        assert_eq!(remote_join("/", "x.txt"), "/x.txt");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent(PACKAGE_STAGING_PATH), "/var/mobile");
        assert_eq!(remote_parent("/install.deb"), "/");
        assert_eq!(remote_parent("install.deb"), ".");
    }

    struct NoDial;

    #[async_trait]
    impl NetworkDial for NoDial {
        async fn dial_network(
            &self,
            _network: &str,
            _address: &str,
            _timeout: Duration,
        ) -> Result<MuxStream, ConnectError> {
            Err(ConnectError::PortUnavailable)
        }
    }

    #[tokio::test]
    async fn test_run_requires_connection() {
        let mut shell = DeviceShell::new(Arc::new(NoDial), SshConfig::default());
        assert!(!shell.is_connected());
        assert!(shell.run("true", &[]).await.is_err());

        let err = shell.connect().await.unwrap_err();
        assert!(err
            .chain()
            .any(|e| matches!(
                e.downcast_ref::<ConnectError>(),
                Some(ConnectError::PortUnavailable)
            )));
        shell.close().await;
    }

    #[tokio::test]
    async fn test_upload_opens_local_file_first() {
        let shell = DeviceShell::new(Arc::new(NoDial), SshConfig::default());
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.deb");
        let err = shell.upload(&missing, "/var/mobile/x").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to open"));

        let present = dir.path().join("present.deb");
        std::fs::write(&present, b"package").unwrap();
        let err = shell.upload(&present, "/var/mobile/x").await.unwrap_err();
        assert!(format!("{:#}", err).contains("SSH session not connected"));
    }

    /// Dial succeeds after `dial_delay` with a stream that never speaks
    struct SilentDial {
        dial_delay: Duration,
        peers: Mutex<Vec<DuplexStream>>,
    }

    #[async_trait]
    impl NetworkDial for SilentDial {
        async fn dial_network(
            &self,
            _network: &str,
            _address: &str,
            _timeout: Duration,
        ) -> Result<MuxStream, ConnectError> {
            tokio::time::sleep(self.dial_delay).await;
            let (client, server) = tokio::io::duplex(4096);
            self.peers.lock().unwrap().push(server);
            Ok(Box::new(client))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_shares_one_timeout() {
        let dialer = Arc::new(SilentDial {
            dial_delay: Duration::from_secs(20),
            peers: Mutex::new(Vec::new()),
        });
        let config = SshConfig {
            connect_timeout: Duration::from_secs(30),
            ..SshConfig::default()
        };
        let mut shell = DeviceShell::new(dialer.clone(), config);

        let start = tokio::time::Instant::now();
        let err = shell.connect().await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
        assert_eq!(dialer.peers.lock().unwrap().len(), 1);
        assert!(!shell.is_connected());
    }
}
