//! Shared application state for API handlers.

use std::sync::Arc;

use mcp::TransportSelector;
use runtime::{AnthropicBackend, Connector, Orchestrator, SessionRegistry, TurnConfig};
use storage::Store;
use tokio::sync::Mutex;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub registry: SessionRegistry,
    pub connector: Connector,
    pub orchestrator: Orchestrator<AnthropicBackend>,
    pub store: Arc<Mutex<Store>>,
}

impl AppState {
    /// Wire the services described by `config` around an open store.
    pub fn new(config: &Config, store: Store) -> Self {
        let registry = SessionRegistry::new(config.registry.registry_config());
        let selector = TransportSelector::new(config.policy.clone())
            .with_deadline(config.registry.connect_timeout());
        let connector = Connector::new(registry.clone(), selector);

        let mut backend = AnthropicBackend::builder(config.api_key(), &config.backend.model)
            .max_tokens(config.backend.max_tokens);
        if let Some(system) = &config.backend.system {
            backend = backend.system(system);
        }
        let orchestrator = Orchestrator::new(Arc::new(backend.build()), registry.clone())
            .with_config(TurnConfig::from(&config.turn));

        Self {
            registry,
            connector,
            orchestrator,
            store: Arc::new(Mutex::new(store)),
        }
    }
}
