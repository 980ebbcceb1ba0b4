//! SSH relay for paywalled publisher links.
//!
//! The relay is a dynamic (SOCKS) port forward through a host on an
//! institutional network: `ssh -N -D 127.0.0.1:<port> user@host`. Requests
//! routed through it reach publishers from the host's address. Key-based
//! authentication only; nothing here stores credentials.

use std::process::Stdio;
use std::time::Duration;

use adsdesk_core::ProxyConfig;
use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};

use crate::error::{Result, ScienceError};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[async_trait]
pub trait Relay: Send + Sync {
    /// Opens a tunnel. It stays up for as long as the returned session lives.
    async fn connect(&self) -> Result<RelaySession>;

    fn describe(&self) -> String;
}

/// Live tunnel. Dropping it kills the underlying `ssh` process.
pub struct RelaySession {
    proxy_url: String,
    _child: Child,
}

impl RelaySession {
    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }
}

pub struct SshRelay {
    user: String,
    server: String,
    port: u16,
    connect_timeout: Duration,
    program: String,
}

impl SshRelay {
    /// `None` unless both `ssh_user` and `ssh_server` are set.
    pub fn from_config(proxy: &ProxyConfig) -> Option<Self> {
        if !proxy.is_configured() {
            return None;
        }
        Some(Self {
            user: proxy.ssh_user.as_deref()?.trim().to_string(),
            server: proxy.ssh_server.as_deref()?.trim().to_string(),
            port: proxy.ssh_port,
            connect_timeout: Duration::from_secs(proxy.connect_timeout_secs),
            program: "ssh".to_string(),
        })
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn ssh_args(&self, local_port: u16) -> Vec<String> {
        vec![
            "-N".to_string(),
            "-D".to_string(),
            format!("127.0.0.1:{local_port}"),
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            format!("{}@{}", self.user, self.server),
        ]
    }
}

#[async_trait]
impl Relay for SshRelay {
    async fn connect(&self) -> Result<RelaySession> {
        let local_port = free_local_port()?;
        tracing::debug!(relay = %self.describe(), local_port, "opening SSH tunnel");

        let mut child = Command::new(&self.program)
            .args(self.ssh_args(local_port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScienceError::Relay(format!("cannot start {}: {e}", self.program)))?;

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| ScienceError::Relay(e.to_string()))?
            {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(ScienceError::Relay(format!(
                    "ssh to {} exited ({status}): {}",
                    self.server,
                    stderr.trim()
                )));
            }

            if TcpStream::connect(("127.0.0.1", local_port)).await.is_ok() {
                tracing::info!(relay = %self.describe(), local_port, "SSH tunnel up");
                return Ok(RelaySession {
                    proxy_url: format!("socks5h://127.0.0.1:{local_port}"),
                    _child: child,
                });
            }

            if Instant::now() >= deadline {
                return Err(ScienceError::Relay(format!(
                    "tunnel to {} not ready after {}s",
                    self.server,
                    self.connect_timeout.as_secs()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    fn describe(&self) -> String {
        format!("{}@{}:{}", self.user, self.server, self.port)
    }
}

fn free_local_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| ScienceError::Relay(format!("no free local port: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| ScienceError::Relay(e.to_string()))?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ProxyConfig {
        ProxyConfig {
            ssh_user: Some("astro".to_string()),
            ssh_server: Some("gate.example.edu".to_string()),
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn unconfigured_proxy_has_no_relay() {
        assert!(SshRelay::from_config(&ProxyConfig::default()).is_none());
        let mut half = ProxyConfig::default();
        half.ssh_server = Some("gate.example.edu".to_string());
        assert!(SshRelay::from_config(&half).is_none());
    }

    #[test]
    fn ssh_arguments_open_a_socks_forward() {
        let mut config = proxy();
        config.ssh_port = 2222;
        let relay = SshRelay::from_config(&config).unwrap();
        let args = relay.ssh_args(40000);

        assert_eq!(&args[..3], ["-N", "-D", "127.0.0.1:40000"]);
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("astro@gate.example.edu"));
        assert_eq!(relay.describe(), "astro@gate.example.edu:2222");
    }

    #[tokio::test]
    async fn missing_ssh_binary_is_a_relay_error() {
        let relay = SshRelay::from_config(&proxy())
            .unwrap()
            .with_program("/nonexistent/adsdesk-ssh");
        let err = relay.connect().await.err().unwrap();
        assert!(matches!(err, ScienceError::Relay(msg) if msg.contains("cannot start")));
    }
}
