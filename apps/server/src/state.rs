use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use dashmap::DashMap;
use shared_proto::ServerEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::CredentialVerifier;
use crate::conversations::ConversationStore;
use crate::directory::UserDirectory;
use crate::router::{EventRouter, Outbound, Target};
use crate::sessions::SessionRegistry;

pub type Tx = mpsc::UnboundedSender<Message>;
pub type PeerMap = Arc<DashMap<Uuid, Tx>>;

/// Shared handles threaded through the transport layer: the per-connection
/// sender map plus the event-routing core.
#[derive(Clone)]
pub struct AppState {
    pub peers: PeerMap,
    pub router: Arc<EventRouter>,
    pub sessions: Arc<SessionRegistry>,
    pub presence_grace: Duration,
}

impl AppState {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, presence_grace: Duration) -> Self {
        let directory = Arc::new(UserDirectory::new(verifier));
        let sessions = Arc::new(SessionRegistry::default());
        let conversations = Arc::new(ConversationStore::default());
        Self {
            peers: Arc::new(DashMap::new()),
            router: Arc::new(EventRouter::new(directory, Arc::clone(&sessions), conversations)),
            sessions,
            presence_grace,
        }
    }

    /// Fan the router's outbound list out to the addressed sockets.
    pub fn deliver(&self, outbound: Vec<Outbound>) {
        for Outbound { target, event } in outbound {
            match target {
                Target::Connection(connection_id) => self.send_to_connection(connection_id, &event),
                Target::User(user_id) => self.send_to_user(user_id, &event),
                Target::All => self.broadcast_all(&event),
            }
        }
    }

    pub fn send_to_connection(&self, connection_id: Uuid, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        if let Some(peer) = self.peers.get(&connection_id) {
            let _ = peer.send(frame);
        }
    }

    /// Deliver to every live connection of the user; a no-op when offline.
    pub fn send_to_user(&self, user_id: Uuid, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        for connection_id in self.sessions.connections_for(user_id) {
            if let Some(peer) = self.peers.get(&connection_id) {
                let _ = peer.send(frame.clone());
            }
        }
    }

    pub fn broadcast_all(&self, event: &ServerEvent) {
        let Some(frame) = encode(event) else { return };
        for peer in self.peers.iter() {
            let _ = peer.value().send(frame.clone());
        }
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(err) => {
            tracing::error!(component = "state", error = %err, "failed to encode outbound event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PlainTextVerifier;
    use shared_proto::{ErrorPayload, UserSummary};

    fn test_state() -> AppState {
        AppState::new(Arc::new(PlainTextVerifier), Duration::from_millis(10))
    }

    fn attach(state: &AppState) -> (Uuid, mpsc::UnboundedReceiver<Message>) {
        let connection_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        state.peers.insert(connection_id, tx);
        (connection_id, rx)
    }

    #[tokio::test]
    async fn user_target_reaches_all_of_their_connections() {
        let state = test_state();
        let user_id = Uuid::new_v4();
        let (tab1, mut rx1) = attach(&state);
        let (tab2, mut rx2) = attach(&state);
        let (_other, mut rx3) = attach(&state);
        state.sessions.bind(tab1, user_id);
        state.sessions.bind(tab2, user_id);

        state.send_to_user(user_id, &ServerEvent::FriendRequestSent);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_reaches_unauthenticated_connections_too() {
        let state = test_state();
        let (_, mut rx) = attach(&state);

        state.broadcast_all(&ServerEvent::UsersUpdate(vec![UserSummary {
            id: Uuid::new_v4(),
            username: "alice".into(),
            avatar: "https://example.com/a.png".into(),
            online: true,
        }]));

        let Message::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        assert!(text.contains("users_update"));
    }

    #[tokio::test]
    async fn send_to_missing_connection_is_a_no_op() {
        let state = test_state();
        state.send_to_connection(
            Uuid::new_v4(),
            &ServerEvent::MessageError(ErrorPayload::new("nope")),
        );
    }
}
