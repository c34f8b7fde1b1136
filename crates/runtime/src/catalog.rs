//! Tool declarations aggregated across a session's servers.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::model::ToolSpec;
use crate::registry::SessionRegistry;

/// Tools offered to the model for one turn, with the server owning each.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    pub declarations: Vec<ToolSpec>,
    pub owners: HashMap<String, String>,
}

impl ToolCatalog {
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Server owning `tool`, if any.
    pub fn owner(&self, tool: &str) -> Option<&str> {
        self.owners.get(tool).map(String::as_str)
    }

    fn insert(&mut self, server_id: &str, spec: ToolSpec) {
        match self.owners.insert(spec.name.clone(), server_id.to_string()) {
            Some(previous) => {
                debug!(tool = %spec.name, from = %previous, to = %server_id, "tool name shadowed");
                if let Some(slot) = self.declarations.iter_mut().find(|d| d.name == spec.name) {
                    *slot = spec;
                }
            }
            None => self.declarations.push(spec),
        }
    }
}

/// Collect tool declarations from `servers` in order.
///
/// Servers that are not connected, or whose listing fails, are skipped. A
/// name offered by several servers belongs to the last one listed.
pub async fn collect_tools(
    registry: &SessionRegistry,
    session_id: &str,
    servers: &[String],
) -> ToolCatalog {
    let mut catalog = ToolCatalog::default();

    for server_id in servers {
        let Some(client) = registry
            .get_handle(session_id, server_id)
            .await
            .and_then(|handle| handle.client().cloned())
        else {
            warn!(session = %session_id, server = %server_id, "skipping server without connection");
            continue;
        };

        match client.list_tools().await {
            Ok(tools) => {
                registry.touch(session_id).await;
                for tool in tools {
                    catalog.insert(server_id, ToolSpec::from(tool));
                }
            }
            Err(e) => {
                warn!(session = %session_id, server = %server_id, error = %e, "failed to list tools");
            }
        }
    }

    debug!(session = %session_id, tools = catalog.len(), "collected tools");
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClientHandle;
    use crate::testing::{FakeClient, server_config};

    async fn connect(registry: &SessionRegistry, server: &str, client: FakeClient) {
        let handle = ClientHandle::connected(server, server_config(server), client.shared());
        registry.add_handle("u1", server, handle).await;
    }

    fn names(catalog: &ToolCatalog) -> Vec<&str> {
        catalog.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    #[tokio::test]
    async fn merges_servers_in_order() {
        let registry = SessionRegistry::default();
        connect(&registry, "a", FakeClient::default().tool("t1", "").tool("t2", "")).await;
        connect(&registry, "b", FakeClient::default().tool("t3", "")).await;

        let catalog = collect_tools(&registry, "u1", &["a".into(), "b".into()]).await;
        assert_eq!(catalog.len(), 3);
        assert_eq!(names(&catalog), ["t1", "t2", "t3"]);
        assert_eq!(catalog.owner("t1"), Some("a"));
        assert_eq!(catalog.owner("t3"), Some("b"));
    }

    #[tokio::test]
    async fn later_server_owns_repeated_name() {
        let registry = SessionRegistry::default();
        connect(&registry, "a", FakeClient::default().tool("t1", "").tool("t2", "")).await;
        connect(&registry, "b", FakeClient::default().tool("t2", "").tool("t3", "")).await;

        let catalog = collect_tools(&registry, "u1", &["a".into(), "b".into()]).await;
        assert_eq!(names(&catalog), ["t1", "t2", "t3"]);
        assert_eq!(catalog.owner("t2"), Some("b"));
        assert_eq!(catalog.owners.len(), 3);
    }

    #[tokio::test]
    async fn skips_unavailable_servers() {
        let registry = SessionRegistry::default();
        connect(&registry, "a", FakeClient::default().tool("t1", "")).await;
        connect(&registry, "broken", FakeClient::default().tool("t9", "").broken_listing()).await;
        registry
            .add_handle("u1", "failed", ClientHandle::failed("failed", server_config("failed"), "refused"))
            .await;

        let servers = ["missing", "broken", "failed", "a"].map(String::from);
        let catalog = collect_tools(&registry, "u1", &servers).await;
        assert_eq!(names(&catalog), ["t1"]);
        assert_eq!(catalog.owner("t9"), None);
    }

    #[tokio::test]
    async fn empty_request_is_not_an_error() {
        let registry = SessionRegistry::default();
        let catalog = collect_tools(&registry, "nobody", &[]).await;
        assert!(catalog.is_empty());
        assert!(catalog.owners.is_empty());
    }
}
