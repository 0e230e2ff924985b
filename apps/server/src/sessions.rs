use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    by_connection: HashMap<Uuid, Uuid>,
    /// Reverse index, maintained incrementally so sends to a user never
    /// scan the session table.
    by_user: HashMap<Uuid, HashSet<Uuid>>,
}

/// Maps live connections to authenticated users. A user may hold several
/// connections at once (multiple devices); "online" means at least one.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    /// Record the binding for a freshly authenticated connection. A
    /// connection binds at most once; a repeat bind keeps the original.
    pub fn bind(&self, connection_id: Uuid, user_id: Uuid) {
        let mut inner = self.inner.write();
        if inner.by_connection.contains_key(&connection_id) {
            tracing::debug!(
                component = "sessions",
                %connection_id,
                "ignoring bind on an already-bound connection"
            );
            return;
        }
        inner.by_connection.insert(connection_id, user_id);
        inner.by_user.entry(user_id).or_default().insert(connection_id);
    }

    /// Remove and return the prior binding. Unconditional; called on
    /// disconnect.
    pub fn unbind(&self, connection_id: Uuid) -> Option<Uuid> {
        let mut inner = self.inner.write();
        let user_id = inner.by_connection.remove(&connection_id)?;
        if let Some(connections) = inner.by_user.get_mut(&user_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                inner.by_user.remove(&user_id);
            }
        }
        Some(user_id)
    }

    pub fn user_for(&self, connection_id: Uuid) -> Option<Uuid> {
        self.inner.read().by_connection.get(&connection_id).copied()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.read().by_user.contains_key(&user_id)
    }

    pub fn connections_for(&self, user_id: Uuid) -> Vec<Uuid> {
        self.inner
            .read()
            .by_user
            .get(&user_id)
            .map(|connections| connections.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().by_connection.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_stays_online_while_any_session_remains() {
        let registry = SessionRegistry::default();
        let user = Uuid::new_v4();
        let tab1 = Uuid::new_v4();
        let tab2 = Uuid::new_v4();

        registry.bind(tab1, user);
        registry.bind(tab2, user);
        assert!(registry.is_online(user));
        assert_eq!(registry.connections_for(user).len(), 2);

        assert_eq!(registry.unbind(tab1), Some(user));
        assert!(registry.is_online(user));

        assert_eq!(registry.unbind(tab2), Some(user));
        assert!(!registry.is_online(user));
        assert!(registry.connections_for(user).is_empty());
    }

    #[test]
    fn bind_is_immutable_for_a_connection() {
        let registry = SessionRegistry::default();
        let connection = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.bind(connection, first);
        registry.bind(connection, second);

        assert_eq!(registry.user_for(connection), Some(first));
        assert!(!registry.is_online(second));
    }

    #[test]
    fn unbind_of_unknown_connection_is_none() {
        let registry = SessionRegistry::default();
        assert_eq!(registry.unbind(Uuid::new_v4()), None);
        assert_eq!(registry.session_count(), 0);
    }
}
