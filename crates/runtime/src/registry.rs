//! Session-scoped connection registry.
//!
//! A [`SessionRegistry`] maps session ids to the tool-server connections
//! opened on behalf of that session. Sessions are created on first use,
//! kept alive by activity and evicted by a periodic sweep once idle.
//!
//! The registry owns every [`ClientHandle`] stored in it. A handle is closed
//! only by whoever removed it from the map, after the map lock has been
//! released, so two paths can never close the same client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcp::{ServerConfig, ToolClient};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Idle time after which a session is evicted.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Registry timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Connection status of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// One (session, server) connection and its status.
///
/// Handles are immutable; a status change installs a new handle.
pub struct ClientHandle {
    server_id: String,
    config: ServerConfig,
    status: ConnectionStatus,
    client: Option<Arc<dyn ToolClient>>,
    error: Option<String>,
    connected_at: Option<DateTime<Utc>>,
}

impl ClientHandle {
    pub fn connecting(server_id: impl Into<String>, config: ServerConfig) -> Self {
        Self {
            server_id: server_id.into(),
            config,
            status: ConnectionStatus::Connecting,
            client: None,
            error: None,
            connected_at: None,
        }
    }

    pub fn connected(
        server_id: impl Into<String>,
        config: ServerConfig,
        client: Arc<dyn ToolClient>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            config,
            status: ConnectionStatus::Connected,
            client: Some(client),
            error: None,
            connected_at: Some(Utc::now()),
        }
    }

    pub fn failed(
        server_id: impl Into<String>,
        config: ServerConfig,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            config,
            status: ConnectionStatus::Error,
            client: None,
            error: Some(error.to_string()),
            connected_at: None,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// The client, if this handle is connected.
    pub fn client(&self) -> Option<&Arc<dyn ToolClient>> {
        if self.is_connected() {
            self.client.as_ref()
        } else {
            None
        }
    }

    pub fn summary(&self) -> HandleSummary {
        HandleSummary {
            server_id: self.server_id.clone(),
            status: self.status,
            connected_at: self.connected_at.map(|t| t.timestamp_millis()),
            error: self.error.clone(),
        }
    }

    /// Close the owned client, if any. Errors are logged.
    async fn close(&self) {
        let Some(client) = &self.client else {
            return;
        };
        match client.close().await {
            Ok(()) => debug!(server = %self.server_id, "closed client"),
            Err(e) => warn!(server = %self.server_id, error = %e, "error closing client"),
        }
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("server_id", &self.server_id)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

/// Wire view of a handle, as listed for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleSummary {
    pub server_id: String,
    pub status: ConnectionStatus,
    pub connected_at: Option<i64>,
    pub error: Option<String>,
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub client_count: usize,
    /// Seconds since the last activity.
    pub idle_secs: u64,
    /// Seconds since the session was created.
    pub age_secs: u64,
}

/// Snapshot of the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_sessions: usize,
    pub total_clients: usize,
    pub sessions: Vec<SessionInfo>,
}

struct Session {
    handles: HashMap<String, Arc<ClientHandle>>,
    last_activity: Instant,
    created: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            handles: HashMap::new(),
            last_activity: now,
            created: now,
        }
    }

    fn info(&self, id: &str, now: Instant) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            client_count: self.handles.len(),
            idle_secs: now.duration_since(self.last_activity).as_secs(),
            age_secs: now.duration_since(self.created).as_secs(),
        }
    }
}

struct Inner {
    config: RegistryConfig,
    sessions: RwLock<HashMap<String, Session>>,
    sweeping: Mutex<()>,
    shutdown: CancellationToken,
}

/// Process-wide registry of sessions and their tool-server handles.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sessions: RwLock::new(HashMap::new()),
                sweeping: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.inner.config
    }

    /// Return the session, creating it if needed.
    pub async fn ensure_session(&self, session_id: &str) -> SessionInfo {
        let now = Instant::now();
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            info!(session = %session_id, "created session");
            Session::new(now)
        });
        session.info(session_id, now)
    }

    /// Insert or replace the handle for (session, server) and touch the
    /// session. A displaced handle is closed.
    pub async fn add_handle(
        &self,
        session_id: &str,
        server_id: &str,
        handle: ClientHandle,
    ) -> Arc<ClientHandle> {
        let handle = Arc::new(handle);
        let displaced = {
            let now = Instant::now();
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(now));
            session.last_activity = now;
            session.handles.insert(server_id.to_string(), handle.clone())
        };

        debug!(session = %session_id, server = %server_id, status = ?handle.status(), "stored handle");
        if let Some(old) = displaced {
            old.close().await;
        }
        handle
    }

    /// Store `handle` unless `replace` rejects the handle currently in place.
    ///
    /// On rejection nothing changes and the caller gets its handle back
    /// together with the one that stayed. A displaced handle is closed.
    pub(crate) async fn add_handle_if(
        &self,
        session_id: &str,
        server_id: &str,
        handle: ClientHandle,
        replace: impl FnOnce(Option<&ClientHandle>) -> bool,
    ) -> Result<Arc<ClientHandle>, (ClientHandle, Arc<ClientHandle>)> {
        let (handle, displaced) = {
            let now = Instant::now();
            let mut sessions = self.inner.sessions.write().await;
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(now));
            session.last_activity = now;

            let current = session.handles.get(server_id);
            if !replace(current.map(Arc::as_ref)) {
                if let Some(current) = current {
                    return Err((handle, current.clone()));
                }
            }
            let handle = Arc::new(handle);
            let displaced = session.handles.insert(server_id.to_string(), handle.clone());
            (handle, displaced)
        };

        if let Some(old) = displaced {
            old.close().await;
        }
        Ok(handle)
    }

    /// Look up a handle, touching the session on a hit.
    pub async fn get_handle(&self, session_id: &str, server_id: &str) -> Option<Arc<ClientHandle>> {
        let mut sessions = self.inner.sessions.write().await;
        let session = sessions.get_mut(session_id)?;
        let handle = session.handles.get(server_id)?.clone();
        session.last_activity = Instant::now();
        Some(handle)
    }

    /// Remove and close a handle. Returns whether one was present.
    pub async fn remove_handle(&self, session_id: &str, server_id: &str) -> bool {
        let removed = {
            let mut sessions = self.inner.sessions.write().await;
            let Some(session) = sessions.get_mut(session_id) else {
                return false;
            };
            session.last_activity = Instant::now();
            session.handles.remove(server_id)
        };

        match removed {
            Some(handle) => {
                handle.close().await;
                info!(session = %session_id, server = %server_id, "removed handle");
                true
            }
            None => false,
        }
    }

    /// Record activity on a session. Unknown sessions are ignored.
    pub async fn touch(&self, session_id: &str) {
        if let Some(session) = self.inner.sessions.write().await.get_mut(session_id) {
            session.last_activity = Instant::now();
        }
    }

    /// All handles of a session, sorted by server id. Listing a known
    /// session counts as activity.
    pub async fn handles(&self, session_id: &str) -> Vec<Arc<ClientHandle>> {
        let mut sessions = self.inner.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return Vec::new();
        };
        session.last_activity = Instant::now();
        let mut handles: Vec<_> = session.handles.values().cloned().collect();
        handles.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        handles
    }

    /// Delete a session, closing all of its handles.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                info!(session = %session_id, clients = session.handles.len(), "deleting session");
                close_all(session).await;
                true
            }
            None => false,
        }
    }

    /// Evict sessions idle for longer than the idle timeout and close their
    /// handles. Returns the number of sessions evicted.
    ///
    /// Sweeps do not overlap: if one is already running this returns 0
    /// without scanning.
    pub async fn sweep(&self) -> usize {
        let Ok(_guard) = self.inner.sweeping.try_lock() else {
            debug!("sweep already in progress");
            return 0;
        };

        let idle_timeout = self.inner.config.idle_timeout;
        let expired: Vec<(String, Session)> = {
            let now = Instant::now();
            let mut sessions = self.inner.sessions.write().await;
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| now.duration_since(s.last_activity) > idle_timeout)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };

        let count = expired.len();
        if count > 0 {
            info!(sessions = count, "evicting idle sessions");
        }
        for (id, session) in expired {
            debug!(session = %id, "evicted session");
            close_all(session).await;
        }
        count
    }

    /// Spawn the periodic sweep.
    pub fn start_sweeper(&self) -> SweeperHandle {
        let token = self.inner.shutdown.child_token();
        let registry = self.clone();
        let period = self.inner.config.sweep_interval;
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.sweep().await;
                    }
                }
            }
            debug!("sweeper stopped");
        });
        SweeperHandle { token, task }
    }

    pub async fn stats(&self) -> RegistryStats {
        let now = Instant::now();
        let sessions = self.inner.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|(id, s)| s.info(id, now)).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        RegistryStats {
            total_sessions: infos.len(),
            total_clients: infos.iter().map(|s| s.client_count).sum(),
            sessions: infos,
        }
    }

    /// Stop any sweeper and close every session.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let sessions: Vec<Session> = self
            .inner
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, s)| s)
            .collect();
        info!(sessions = sessions.len(), "registry shutting down");
        for session in sessions {
            close_all(session).await;
        }
    }
}

async fn close_all(session: Session) {
    for handle in session.handles.into_values() {
        handle.close().await;
    }
}

/// Handle to the background sweep task.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClient, server_config};

    fn connected(server: &str, client: &Arc<FakeClient>) -> ClientHandle {
        ClientHandle::connected(server, server_config(server), client.clone())
    }

    #[tokio::test]
    async fn get_handle_returns_stored_handle() {
        let registry = SessionRegistry::default();
        let client = FakeClient::new();
        registry.add_handle("u1", "s1", connected("s1", &client)).await;

        let handle = registry.get_handle("u1", "s1").await.unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.server_id(), "s1");
        assert!(handle.client().is_some());

        assert!(registry.get_handle("u1", "other").await.is_none());
        assert!(registry.get_handle("u2", "s1").await.is_none());
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let registry = SessionRegistry::default();
        let a = FakeClient::new();
        let b = FakeClient::new();
        registry.add_handle("alice", "s1", connected("s1", &a)).await;
        registry.add_handle("bob", "s1", connected("s1", &b)).await;

        registry.remove_handle("alice", "s1").await;
        assert_eq!(a.close_count(), 1);
        assert_eq!(b.close_count(), 0);
        assert!(registry.get_handle("bob", "s1").await.is_some());
    }

    #[tokio::test]
    async fn remove_twice_closes_once() {
        let registry = SessionRegistry::default();
        let client = FakeClient::new();
        registry.add_handle("u1", "s1", connected("s1", &client)).await;

        assert!(registry.remove_handle("u1", "s1").await);
        assert!(!registry.remove_handle("u1", "s1").await);
        assert!(!registry.remove_handle("nobody", "s1").await);
        assert_eq!(client.close_count(), 1);
        assert!(registry.get_handle("u1", "s1").await.is_none());
    }

    #[tokio::test]
    async fn replacing_a_handle_closes_the_old_client() {
        let registry = SessionRegistry::default();
        let old = FakeClient::new();
        let new = FakeClient::new();
        registry.add_handle("u1", "s1", connected("s1", &old)).await;
        registry.add_handle("u1", "s1", connected("s1", &new)).await;

        assert_eq!(old.close_count(), 1);
        assert_eq!(new.close_count(), 0);
        assert_eq!(registry.stats().await.total_clients, 1);
    }

    #[tokio::test]
    async fn ensure_session_is_idempotent() {
        let registry = SessionRegistry::default();
        let first = registry.ensure_session("u1").await;
        assert_eq!(first.client_count, 0);
        registry
            .add_handle("u1", "s1", ClientHandle::failed("s1", server_config("s1"), "boom"))
            .await;
        let again = registry.ensure_session("u1").await;
        assert_eq!(again.client_count, 1);
        assert_eq!(registry.stats().await.total_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_only_idle_sessions() {
        let registry = SessionRegistry::new(RegistryConfig {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        });
        let idle = FakeClient::new();
        let active = FakeClient::new();
        registry.add_handle("idle", "s1", connected("s1", &idle)).await;
        registry.add_handle("active", "s1", connected("s1", &active)).await;

        tokio::time::advance(Duration::from_secs(45)).await;
        registry.touch("active").await;
        assert_eq!(registry.sweep().await, 0);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(registry.sweep().await, 1);
        assert_eq!(idle.close_count(), 1);
        assert_eq!(active.close_count(), 0);
        assert!(registry.get_handle("idle", "s1").await.is_none());
        assert!(registry.get_handle("active", "s1").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn exact_idle_timeout_is_not_expired() {
        let registry = SessionRegistry::new(RegistryConfig {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        });
        registry.ensure_session("u1").await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(registry.sweep().await, 0);
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(registry.sweep().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_is_skipped_while_another_runs() {
        let registry = SessionRegistry::new(RegistryConfig {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        });
        let client = FakeClient::new();
        registry.add_handle("u1", "s1", connected("s1", &client)).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let running = registry.inner.sweeping.lock().await;
        assert_eq!(registry.sweep().await, 0);
        assert_eq!(client.close_count(), 0);
        assert_eq!(registry.stats().await.total_sessions, 1);

        drop(running);
        assert_eq!(registry.sweep().await, 1);
        assert_eq!(client.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_handles_keeps_session_alive() {
        let registry = SessionRegistry::new(RegistryConfig {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        });
        let client = FakeClient::new();
        registry.add_handle("u1", "s1", connected("s1", &client)).await;

        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(40)).await;
            assert_eq!(registry.handles("u1").await.len(), 1);
        }
        assert_eq!(registry.sweep().await, 0);
        assert_eq!(client.close_count(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.sweep().await, 1);
        assert_eq!(client.close_count(), 1);
    }

    #[tokio::test]
    async fn handles_are_listed_by_server_id() {
        let registry = SessionRegistry::default();
        registry
            .add_handle("u1", "b", ClientHandle::connecting("b", server_config("b")))
            .await;
        registry
            .add_handle("u1", "a", ClientHandle::failed("a", server_config("a"), "refused"))
            .await;

        let summaries: Vec<_> = registry
            .handles("u1")
            .await
            .iter()
            .map(|h| h.summary())
            .collect();
        assert_eq!(summaries[0].server_id, "a");
        assert_eq!(summaries[0].status, ConnectionStatus::Error);
        assert_eq!(summaries[0].error.as_deref(), Some("refused"));
        assert_eq!(summaries[1].status, ConnectionStatus::Connecting);
        assert!(registry.handles("nobody").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_periodically_and_stops() {
        let registry = SessionRegistry::new(RegistryConfig {
            idle_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
        });
        let client = FakeClient::new();
        registry.add_handle("u1", "s1", connected("s1", &client)).await;

        let sweeper = registry.start_sweeper();
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(client.close_count(), 1);
        assert_eq!(registry.stats().await.total_sessions, 0);
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn delete_and_shutdown_close_everything() {
        let registry = SessionRegistry::default();
        let a = FakeClient::new();
        let b = FakeClient::new();
        let c = FakeClient::new();
        registry.add_handle("u1", "a", connected("a", &a)).await;
        registry.add_handle("u1", "b", connected("b", &b)).await;
        registry.add_handle("u2", "c", connected("c", &c)).await;

        assert!(registry.delete_session("u1").await);
        assert!(!registry.delete_session("u1").await);
        assert_eq!((a.close_count(), b.close_count()), (1, 1));

        let sweeper = registry.start_sweeper();
        registry.shutdown().await;
        sweeper.stop().await;
        assert_eq!(c.close_count(), 1);
        assert_eq!(registry.stats().await.total_sessions, 0);
    }
}
