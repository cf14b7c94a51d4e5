// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    engine::{
        clock::{Clock, SystemClock},
        registry::SessionRegistry,
    },
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub sessions: SessionRegistry,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new<S: Store + 'static>(store: Arc<S>, config: Config) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock<S: Store + 'static>(
        store: Arc<S>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = SessionRegistry::new(store.clone(), store.clone(), clock.clone());
        Self {
            store,
            config,
            sessions,
            clock,
        }
    }

    /// Same as `with_clock`, but sessions are only ticked by hand.
    pub fn with_manual_sessions<S: Store + 'static>(
        store: Arc<S>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let sessions = SessionRegistry::manual(store.clone(), store.clone(), clock.clone());
        Self {
            store,
            config,
            sessions,
            clock,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for SessionRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
