//! Shared application state

use std::sync::Arc;

use helpdesk_shared::HelpdeskStore;

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
    notify::{BroadcastHub, ChangeEmitter, HubEmitter},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn HelpdeskStore>,
    pub hub: Arc<BroadcastHub>,
    pub emitter: Arc<dyn ChangeEmitter>,
    pub jwt_manager: JwtManager,
}

impl AppState {
    /// State with the hub-backed emitter
    pub fn new(config: Config, store: Arc<dyn HelpdeskStore>) -> Self {
        let hub = Arc::new(BroadcastHub::new());
        let emitter = Arc::new(HubEmitter::new(Arc::clone(&hub)));
        Self::with_emitter(config, store, hub, emitter)
    }

    pub fn with_emitter(
        config: Config,
        store: Arc<dyn HelpdeskStore>,
        hub: Arc<BroadcastHub>,
        emitter: Arc<dyn ChangeEmitter>,
    ) -> Self {
        let jwt_manager = JwtManager::new(&config.session_secret, config.session_expiry_hours);
        Self {
            config: Arc::new(config),
            store,
            hub,
            emitter,
            jwt_manager,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
