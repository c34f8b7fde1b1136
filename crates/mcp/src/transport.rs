//! Transport selection and connection establishment.
//!
//! [`TransportSelector`] turns a [`ServerConfig`] into a live [`ToolClient`]:
//! it checks the config against the [`Policy`], hands channel construction to
//! a [`Launcher`], and bounds the whole handshake by a deadline. It has no
//! side effects beyond the connection it returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use policy::{CapabilityRequest, Decision, Policy};
use rmcp::{
    ServiceExt,
    transport::{
        ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
    },
};
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::{McpClient, ToolClient};
use crate::config::{ServerConfig, TransportConfig, TransportKind};
use crate::error::{Error, Result};

/// Default time allowed for spawning/connecting plus the protocol handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the underlying channel for an already validated config.
///
/// Implementations must not outlive the future they return: dropping it
/// before completion has to release everything acquired so far.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, config: &ServerConfig) -> Result<Arc<dyn ToolClient>>;
}

/// Launcher backed by the rmcp transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpLauncher;

#[async_trait]
impl Launcher for RmcpLauncher {
    async fn launch(&self, config: &ServerConfig) -> Result<Arc<dyn ToolClient>> {
        let service = match &config.transport {
            TransportConfig::LocalProcess { command, args, env } => {
                let transport =
                    TokioChildProcess::new(Command::new(command).configure(|cmd| {
                        cmd.args(args).envs(env).kill_on_drop(true);
                    }))?;
                ().serve(transport)
                    .await
                    .map_err(|e| Error::Handshake(e.to_string()))?
            }
            TransportConfig::HttpStream { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                ().serve(transport)
                    .await
                    .map_err(|e| Error::Handshake(e.to_string()))?
            }
            TransportConfig::HttpEvents { url } => {
                let transport = SseClientTransport::start(url.as_str())
                    .await
                    .map_err(|e| Error::Handshake(e.to_string()))?;
                ().serve(transport)
                    .await
                    .map_err(|e| Error::Handshake(e.to_string()))?
            }
        };

        if let Some(info) = service.peer_info() {
            debug!(
                server = %config.name,
                remote = %info.server_info.name,
                version = %info.server_info.version,
                "handshake complete"
            );
        }

        Ok(Arc::new(McpClient::new(config.name.clone(), service)))
    }
}

/// Validates server configs and opens connections to them.
#[derive(Clone)]
pub struct TransportSelector {
    policy: Arc<Policy>,
    deadline: Duration,
    launcher: Arc<dyn Launcher>,
}

impl TransportSelector {
    /// Create a selector using the rmcp transports and the default deadline.
    pub fn new(policy: Policy) -> Self {
        Self {
            policy: Arc::new(policy),
            deadline: DEFAULT_CONNECT_TIMEOUT,
            launcher: Arc::new(RmcpLauncher),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Check a config without touching the network or spawning anything.
    pub fn validate(&self, config: &ServerConfig) -> Result<()> {
        match &config.transport {
            TransportConfig::LocalProcess { command, .. } => {
                let request = CapabilityRequest::exec(command.as_str());
                if let Decision::Deny { reason } = self.policy.check(&request) {
                    debug!(server = %config.name, %reason, "command rejected");
                    return Err(Error::DisallowedCommand(command.clone()));
                }
                Ok(())
            }
            TransportConfig::HttpStream { url } => self.validate_url(TransportKind::HttpStream, url),
            TransportConfig::HttpEvents { url } => self.validate_url(TransportKind::HttpEvents, url),
        }
    }

    fn validate_url(&self, kind: TransportKind, raw: &str) -> Result<()> {
        if raw.trim().is_empty() {
            return Err(Error::MissingUrl(kind));
        }

        let url = Url::parse(raw).map_err(|e| Error::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        let Some(host) = url.host_str() else {
            return Err(Error::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            });
        };

        match self.policy.check(&CapabilityRequest::net_http(host)) {
            Decision::Allow => Ok(()),
            Decision::Deny { .. } => Err(Error::DisallowedHost(host.to_string())),
        }
    }

    /// Validate `config`, then connect and complete the handshake within the
    /// deadline. On expiry the half-open connection is dropped.
    pub async fn open(&self, config: &ServerConfig) -> Result<Arc<dyn ToolClient>> {
        self.validate(config)?;

        info!(server = %config.name, transport = %config.kind(), "connecting to tool server");
        match tokio::time::timeout(self.deadline, self.launcher.launch(config)).await {
            Ok(Ok(client)) => {
                info!(server = %config.name, "tool server connected");
                Ok(client)
            }
            Ok(Err(err)) => {
                warn!(server = %config.name, error = %err, "tool server connect failed");
                Err(err)
            }
            Err(_) => {
                warn!(server = %config.name, deadline = ?self.deadline, "tool server connect timed out");
                Err(Error::ConnectTimeout(self.deadline))
            }
        }
    }
}
