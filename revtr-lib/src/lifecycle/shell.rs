use russh::client;
use russh::keys::ssh_key::PublicKey;
use russh::keys::{load_secret_key, PrivateKey, PrivateKeyWithHashAlg};
use russh::{ChannelMsg, Disconnect};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::HealthConfig;
use crate::error::{Result, RevtrError};
use crate::model::VantagePoint;

/// What a remote command printed and how it exited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Runs a command on a vantage point.
pub trait RemoteShell: Send + Sync {
    fn run(
        &self,
        vp: &VantagePoint,
        command: &str,
    ) -> impl Future<Output = Result<CommandOutput>> + Send;
}

/// Accepts whatever host key the vantage point presents.
struct AnyHostKey;

impl client::Handler for AnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

fn ssh_error(host: &str, e: russh::Error) -> RevtrError {
    RevtrError::RemoteCommandFailed(format!("ssh {host}: {e}"))
}

/// Remote shell over SSH. Host keys are not verified; authentication is by
/// key file.
#[derive(Clone)]
pub struct SshShell {
    user: String,
    key: Option<Arc<PrivateKey>>,
    config: Arc<client::Config>,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl std::fmt::Debug for SshShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshShell")
            .field("user", &self.user)
            .field("has_key", &self.key.is_some())
            .finish()
    }
}

impl SshShell {
    /// Loads the configured key. Without one every command fails.
    pub fn new(cfg: &HealthConfig) -> Result<Self> {
        let key = match &cfg.ssh_key_path {
            Some(path) => Some(Arc::new(load_secret_key(path, None).map_err(|e| {
                RevtrError::Config(format!("Failed to load SSH key {}: {e}", path.display()))
            })?)),
            None => None,
        };
        let command_timeout = Duration::from_secs(cfg.command_timeout_secs);
        let config = client::Config { inactivity_timeout: Some(command_timeout), ..Default::default() };
        Ok(Self {
            user: cfg.ssh_user.clone(),
            key,
            config: Arc::new(config),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs),
            command_timeout,
        })
    }

    async fn connect(&self, host: &str, port: u16) -> Result<client::Handle<AnyHostKey>> {
        let key = self
            .key
            .clone()
            .ok_or_else(|| RevtrError::RemoteCommandFailed("no SSH key configured".to_string()))?;
        let mut session =
            tokio::time::timeout(self.connect_timeout, client::connect(self.config.clone(), (host, port), AnyHostKey))
                .await
                .map_err(|_| RevtrError::RemoteCommandFailed(format!("ssh {host}: connect timed out")))?
                .map_err(|e| ssh_error(host, e))?;

        let hash = session.best_supported_rsa_hash().await.map_err(|e| ssh_error(host, e))?.flatten();
        let auth = session
            .authenticate_publickey(&self.user, PrivateKeyWithHashAlg::new(key, hash))
            .await
            .map_err(|e| ssh_error(host, e))?;
        if !auth.success() {
            return Err(RevtrError::RemoteCommandFailed(format!(
                "ssh {host}: key rejected for {}",
                self.user
            )));
        }
        Ok(session)
    }

    async fn exec(&self, host: &str, port: u16, command: &str) -> Result<CommandOutput> {
        let session = self.connect(host, port).await?;
        let mut channel = session.channel_open_session().await.map_err(|e| ssh_error(host, e))?;
        channel.exec(true, command).await.map_err(|e| ssh_error(host, e))?;

        let mut status = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                // extended data type 1 is stderr
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => {
                    status = Some(i32::try_from(exit_status).unwrap_or(i32::MAX));
                }
                _ => {}
            }
        }
        if let Err(e) = session.disconnect(Disconnect::ByApplication, "", "en").await {
            debug!(host, error = %e, "ssh disconnect failed");
        }

        Ok(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

impl RemoteShell for SshShell {
    async fn run(&self, vp: &VantagePoint, command: &str) -> Result<CommandOutput> {
        let host = if vp.hostname.is_empty() { vp.ip.to_string() } else { vp.hostname.clone() };
        // dropping the session on timeout closes the channel
        tokio::time::timeout(self.command_timeout, self.exec(&host, vp.port, command))
            .await
            .map_err(|_| {
                RevtrError::RemoteCommandFailed(format!(
                    "{command} timed out after {}s",
                    self.command_timeout.as_secs()
                ))
            })?
    }
}
