//! Registry implementation

use std::collections::HashMap;

use tokio::sync::Mutex;

use super::entry::ClientHandle;
use crate::protocol::{MAX_IDENTITY_SIZE, SYSTEM_SENDER};

/// Registered identities and their connections
///
/// One lock covers reads and writes. Contention grows with the number of
/// connections but there is no lock ordering to get wrong.
pub struct Registry {
    clients: Mutex<HashMap<String, ClientHandle>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `identity` may ever be registered
    pub fn is_valid_identity(identity: &str) -> bool {
        !identity.is_empty() && identity.len() <= MAX_IDENTITY_SIZE && identity != SYSTEM_SENDER
    }

    /// Register a connection under its identity.
    ///
    /// Returns `false` without touching the map if the identity is invalid or
    /// already taken. Check and insert happen under one lock acquisition.
    pub async fn register(&self, handle: ClientHandle) -> bool {
        if !Self::is_valid_identity(handle.identity()) {
            return false;
        }

        let mut clients = self.clients.lock().await;
        if clients.contains_key(handle.identity()) {
            tracing::debug!(
                identity = handle.identity(),
                session_id = handle.session_id(),
                "Identity already registered"
            );
            return false;
        }

        tracing::info!(
            identity = handle.identity(),
            session_id = handle.session_id(),
            peer = %handle.peer_addr(),
            clients = clients.len() + 1,
            "Client registered"
        );
        clients.insert(handle.identity().to_owned(), handle);
        true
    }

    /// Remove `identity` if present. Idempotent.
    ///
    /// When `session_id` is given, the entry is only removed if it belongs to
    /// that session, so a stale handler cannot evict a newer registration.
    pub async fn unregister(&self, identity: &str, session_id: Option<u64>) -> bool {
        let mut clients = self.clients.lock().await;

        let owned = match (clients.get(identity), session_id) {
            (Some(handle), Some(id)) => handle.session_id() == id,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if owned {
            clients.remove(identity);
            tracing::info!(identity, clients = clients.len(), "Client unregistered");
        }
        owned
    }

    /// Consistent copy of every live connection
    pub async fn snapshot(&self) -> Vec<ClientHandle> {
        let clients = self.clients.lock().await;
        clients.values().cloned().collect()
    }

    /// Whether `identity` is currently registered
    pub async fn contains(&self, identity: &str) -> bool {
        self.clients.lock().await.contains_key(identity)
    }

    /// Number of registered clients
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::*;

    fn handle(session_id: u64, identity: &str) -> ClientHandle {
        let (writer, _reader) = tokio::io::duplex(64);
        let peer = SocketAddr::from(([127, 0, 0, 1], 40000 + session_id as u16));
        ClientHandle::new(session_id, identity, peer, 0, writer)
    }

    #[tokio::test]
    async fn test_register_and_reject_duplicate() {
        let registry = Registry::new();

        assert!(registry.register(handle(1, "alice")).await);
        assert!(!registry.register(handle(2, "alice")).await);
        assert_eq!(registry.len().await, 1);

        // The original registration is untouched
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].session_id(), 1);
    }

    #[tokio::test]
    async fn test_reject_invalid_identity() {
        let registry = Registry::new();

        assert!(!registry.register(handle(1, "")).await);
        assert!(!registry.register(handle(2, SYSTEM_SENDER)).await);
        assert!(!registry.register(handle(3, &"x".repeat(MAX_IDENTITY_SIZE + 1))).await);
        assert!(registry.is_empty().await);

        assert!(registry.register(handle(4, &"x".repeat(MAX_IDENTITY_SIZE))).await);
    }

    #[tokio::test]
    async fn test_unregister_idempotent() {
        let registry = Registry::new();
        registry.register(handle(1, "alice")).await;

        assert!(registry.unregister("alice", Some(1)).await);
        assert!(!registry.unregister("alice", Some(1)).await);
        assert!(!registry.unregister("nobody", None).await);
        assert!(!registry.contains("alice").await);

        // Identity is free again
        assert!(registry.register(handle(2, "alice")).await);
    }

    #[tokio::test]
    async fn test_unregister_wrong_session() {
        let registry = Registry::new();
        registry.register(handle(5, "alice")).await;

        assert!(!registry.unregister("alice", Some(4)).await);
        assert!(registry.contains("alice").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_distinct_identities() {
        let registry = Arc::new(Registry::new());

        let tasks: Vec<_> = (0..32u64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.register(handle(i, &format!("user{}", i))).await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(registry.len().await, 32);
        for i in 0..32 {
            assert!(registry.contains(&format!("user{}", i)).await);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_identity() {
        let registry = Arc::new(Registry::new());

        let tasks: Vec<_> = (0..32u64)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.register(handle(i, "alice")).await })
            })
            .collect();

        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(registry.len().await, 1);
    }
}
