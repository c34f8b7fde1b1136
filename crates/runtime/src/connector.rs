//! Connect and disconnect tool servers for a session.

use std::sync::Arc;

use mcp::{ServerConfig, ToolClient, TransportSelector};
use tracing::{debug, info, warn};

use crate::error::ConnectError;
use crate::registry::{ClientHandle, SessionRegistry};

/// Opens tool-server connections and records them in the registry.
#[derive(Clone)]
pub struct Connector {
    registry: SessionRegistry,
    selector: TransportSelector,
}

impl Connector {
    pub fn new(registry: SessionRegistry, selector: TransportSelector) -> Self {
        Self { registry, selector }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn selector(&self) -> &TransportSelector {
        &self.selector
    }

    /// Connect `server_id` for `session_id`.
    ///
    /// An already connected handle is returned as is. When two connects for
    /// the same pair race, the first connected handle wins and the loser's
    /// client is closed; both callers get the winning handle. Failures are
    /// recorded as an `error` handle unless a connected one is in place.
    pub async fn connect(
        &self,
        session_id: &str,
        server_id: &str,
        config: ServerConfig,
    ) -> Result<Arc<ClientHandle>, ConnectError> {
        if let Err(err) = self.selector.validate(&config) {
            warn!(session = %session_id, server = %server_id, error = %err, "rejected server config");
            self.record_failure(session_id, server_id, config, &err).await;
            return Err(err);
        }

        self.registry.ensure_session(session_id).await;
        if let Some(existing) = self.registry.get_handle(session_id, server_id).await {
            if existing.is_connected() {
                debug!(session = %session_id, server = %server_id, "already connected");
                return Ok(existing);
            }
        }

        let connecting = ClientHandle::connecting(server_id, config.clone());
        if let Err((_, current)) = self
            .registry
            .add_handle_if(session_id, server_id, connecting, not_connected)
            .await
        {
            return Ok(current);
        }

        match self.selector.open(&config).await {
            Ok(client) => {
                self.install_connected(session_id, server_id, config, client)
                    .await
            }
            Err(err) => {
                self.record_failure(session_id, server_id, config, &err).await;
                Err(err)
            }
        }
    }

    /// Disconnect a server. Returns whether a handle was present.
    pub async fn disconnect(&self, session_id: &str, server_id: &str) -> bool {
        self.registry.remove_handle(session_id, server_id).await
    }

    async fn install_connected(
        &self,
        session_id: &str,
        server_id: &str,
        config: ServerConfig,
        client: Arc<dyn ToolClient>,
    ) -> Result<Arc<ClientHandle>, ConnectError> {
        let handle = ClientHandle::connected(server_id, config, client.clone());
        match self
            .registry
            .add_handle_if(session_id, server_id, handle, not_connected)
            .await
        {
            Ok(handle) => {
                info!(session = %session_id, server = %server_id, "server connected");
                Ok(handle)
            }
            Err((_, winner)) => {
                debug!(session = %session_id, server = %server_id, "lost connect race, closing duplicate client");
                if let Err(e) = client.close().await {
                    warn!(server = %server_id, error = %e, "error closing duplicate client");
                }
                Ok(winner)
            }
        }
    }

    async fn record_failure(
        &self,
        session_id: &str,
        server_id: &str,
        config: ServerConfig,
        err: &ConnectError,
    ) {
        let failed = ClientHandle::failed(server_id, config, err);
        if self
            .registry
            .add_handle_if(session_id, server_id, failed, not_connected)
            .await
            .is_err()
        {
            debug!(session = %session_id, server = %server_id, "kept connected handle over failure");
        }
    }
}

fn not_connected(current: Option<&ClientHandle>) -> bool {
    !current.is_some_and(ClientHandle::is_connected)
}
