//! Tunnel provider backed by the ngrok agent CLI.
//!
//! The agent runs as a child process (`ngrok http 127.0.0.1:<port>`)
//! logging JSON to stdout. The public URL is read from its `started tunnel`
//! record; the rest of the log is forwarded to `log::debug!` until the agent
//! exits.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;

use super::{TunnelHandle, TunnelProvider};
use crate::config::WebhookSettings;
use crate::utilities::errors::TunnelError;

/// Environment variable the agent reads its credential from.
const AGENT_TOKEN_ENV: &str = "NGROK_AUTHTOKEN";

/// How long `close` waits for the agent to exit after being killed.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// What one agent log line means for tunnel negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AgentLog {
    Started(String),
    Failed(String),
    Other,
}

/// Address the agent forwards to. The receiver binds loopback IPv4 only,
/// so `localhost` (which may resolve to `::1`) is not used.
pub(crate) fn forward_target(local_port: u16) -> String {
    format!("127.0.0.1:{}", local_port)
}

/// Classify one JSON log line of the agent.
pub(crate) fn parse_agent_log(line: &str) -> AgentLog {
    let Ok(record) = serde_json::from_str::<Value>(line) else {
        return AgentLog::Other;
    };
    let field = |name: &str| record.get(name).and_then(Value::as_str);

    if field("msg") == Some("started tunnel") {
        if let Some(url) = field("url").filter(|u| u.starts_with("https://")) {
            return AgentLog::Started(url.to_string());
        }
    }
    if matches!(field("lvl"), Some("eror") | Some("crit")) {
        let reason = field("err").or(field("msg")).unwrap_or("unknown error");
        return AgentLog::Failed(reason.to_string());
    }
    AgentLog::Other
}

/// Tunnel provider running one ngrok agent per open tunnel.
pub struct NgrokTunnel {
    /// Agent executable.
    cli: String,
    auth_token: Option<String>,
    /// Bound on one negotiation attempt.
    timeout: Duration,
    agent: Mutex<Option<Child>>,
}

impl NgrokTunnel {
    pub fn new(cli: impl Into<String>, auth_token: Option<String>, timeout: Duration) -> Self {
        Self {
            cli: cli.into(),
            auth_token,
            timeout,
            agent: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &WebhookSettings) -> Self {
        Self::new(
            settings.tunnel_cli.clone(),
            settings.tunnel_token.clone(),
            settings.tunnel_timeout,
        )
    }

    fn command(&self, local_port: u16, token: &str) -> Command {
        let mut cmd = Command::new(&self.cli);
        cmd.arg("http")
            .arg(forward_target(local_port))
            .args(["--log", "stdout", "--log-format", "json"])
            .env(AGENT_TOKEN_ENV, token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

async fn wait_for_url(lines: &mut Lines<BufReader<ChildStdout>>) -> Result<String, TunnelError> {
    while let Some(line) = lines.next_line().await? {
        match parse_agent_log(&line) {
            AgentLog::Started(url) => return Ok(url),
            AgentLog::Failed(reason) => return Err(TunnelError::Unavailable(reason)),
            AgentLog::Other => log::trace!("ngrok: {}", line),
        }
    }
    Err(TunnelError::Unavailable(
        "tunnel agent exited before reporting a public URL".to_string(),
    ))
}

#[async_trait]
impl TunnelProvider for NgrokTunnel {
    async fn open(&self, local_port: u16) -> Result<TunnelHandle, TunnelError> {
        let token = self
            .auth_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TunnelError::Unavailable("no tunnel credential configured".to_string()))?;

        let mut agent = self.agent.lock().await;
        if agent.is_some() {
            return Err(TunnelError::Unavailable(
                "a tunnel is already open".to_string(),
            ));
        }

        let mut child = self.command(local_port, token).spawn()?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TunnelError::Unavailable("tunnel agent stdout is not captured".to_string())
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let outcome = match tokio::time::timeout(self.timeout, wait_for_url(&mut lines)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TunnelError::Timeout(self.timeout.as_secs())),
        };
        let public_url = match outcome {
            Ok(url) => url,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                log::debug!("ngrok: {}", line);
            }
        });

        *agent = Some(child);
        log::info!("Tunnel open: {} -> 127.0.0.1:{}", public_url, local_port);
        Ok(TunnelHandle {
            public_url,
            local_port,
        })
    }

    async fn close(&self, handle: &TunnelHandle) -> Result<(), TunnelError> {
        let Some(mut child) = self.agent.lock().await.take() else {
            log::debug!("Tunnel {} already closed", handle.public_url);
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            log::debug!("Tunnel agent had already exited ({})", status);
            return Ok(());
        }
        child.start_kill()?;
        match tokio::time::timeout(KILL_WAIT, child.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => log::warn!("Tunnel agent did not exit within {:?}", KILL_WAIT),
        }
        log::info!("Tunnel {} closed", handle.public_url);
        Ok(())
    }
}

impl Drop for NgrokTunnel {
    fn drop(&mut self) {
        if let Some(child) = self.agent.get_mut() {
            // Best-effort kill on drop
            let _ = child.start_kill();
        }
    }
}
