//! Shared state handed to every axum handler: the collaborator set every
//! `Connection` is built from, plus a registry of currently-connected
//! client ids (used to reject a second concurrent session for the same
//! client and to report liveness on `/readyz`).

use std::collections::HashMap;
use std::sync::Arc;

use electric_core::Collaborators;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pub collaborators: Arc<Collaborators>,
    active_clients: Arc<RwLock<HashMap<String, ()>>>,
}

impl AppState {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators: Arc::new(collaborators),
            active_clients: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers `client_id` as active. Returns `false` if a session for
    /// that client is already open.
    pub async fn register_client(&self, client_id: &str) -> bool {
        let mut clients = self.active_clients.write().await;
        if clients.contains_key(client_id) {
            false
        } else {
            clients.insert(client_id.to_owned(), ());
            true
        }
    }

    pub async fn unregister_client(&self, client_id: &str) {
        self.active_clients.write().await.remove(client_id);
    }

    pub async fn active_client_count(&self) -> usize {
        self.active_clients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use electric_test_support::{
        accepting_auth_verifier, empty_snapshot_source, fixed_wal_source, mock_migration_translator,
        mock_schema_cache,
    };

    fn test_collaborators() -> Collaborators {
        Collaborators {
            auth: Arc::new(accepting_auth_verifier()),
            wal: Arc::new(fixed_wal_source(vec![1], vec![0])),
            schema_cache: Arc::new(mock_schema_cache()),
            translator: Arc::new(mock_migration_translator()),
            subscription_data: Arc::new(empty_snapshot_source(vec![1])),
        }
    }

    #[tokio::test]
    async fn registering_the_same_client_twice_is_rejected() {
        let state = AppState::new(test_collaborators());
        assert!(state.register_client("device-1").await);
        assert!(!state.register_client("device-1").await);
        assert_eq!(state.active_client_count().await, 1);

        state.unregister_client("device-1").await;
        assert_eq!(state.active_client_count().await, 0);
        assert!(state.register_client("device-1").await);
    }
}
