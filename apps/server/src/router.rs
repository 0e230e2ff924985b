use std::sync::Arc;

use shared_proto::{
    ChatHistoryPayload, ClientEvent, DirectMessage, ErrorPayload, FriendRequestDeclinedPayload,
    FriendRequestNotice, GlobalMessage, LoginPayload, LoginSuccessPayload, PrivateMessagePayload,
    RegisterPayload, RegisterSuccessPayload, ServerEvent, UserSummary,
};
use uuid::Uuid;

use crate::conversations::ConversationStore;
use crate::directory::{User, UserDirectory};
use crate::sessions::SessionRegistry;
use crate::validation;

/// Where an outbound event should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Connection(Uuid),
    /// All of the user's live connections; a no-op if the user is offline.
    User(Uuid),
    All,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub event: ServerEvent,
}

impl Outbound {
    fn to_connection(connection_id: Uuid, event: ServerEvent) -> Self {
        Self {
            target: Target::Connection(connection_id),
            event,
        }
    }

    fn to_user(user_id: Uuid, event: ServerEvent) -> Self {
        Self {
            target: Target::User(user_id),
            event,
        }
    }

    fn to_all(event: ServerEvent) -> Self {
        Self {
            target: Target::All,
            event,
        }
    }
}

/// The event-handling core. Holds shared handles to the three stores,
/// owns no state of its own, and turns each inbound event into a list of
/// addressed outbound events for the transport to deliver.
pub struct EventRouter {
    directory: Arc<UserDirectory>,
    sessions: Arc<SessionRegistry>,
    conversations: Arc<ConversationStore>,
}

impl EventRouter {
    pub fn new(
        directory: Arc<UserDirectory>,
        sessions: Arc<SessionRegistry>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            directory,
            sessions,
            conversations,
        }
    }

    pub async fn dispatch(&self, connection_id: Uuid, event: ClientEvent) -> Vec<Outbound> {
        match event {
            ClientEvent::Register(payload) => self.register(connection_id, payload).await,
            ClientEvent::Login(payload) => self.login(connection_id, payload).await,
            ClientEvent::SearchUsers(query) => self.search_users(connection_id, &query),
            ClientEvent::SendFriendRequest(to) => self.send_friend_request(connection_id, to),
            ClientEvent::AcceptFriendRequest(from) => {
                self.accept_friend_request(connection_id, from)
            }
            ClientEvent::DeclineFriendRequest(from) => {
                self.decline_friend_request(connection_id, from)
            }
            ClientEvent::PrivateMessage(payload) => self.private_message(connection_id, payload),
            ClientEvent::LoadChatHistory(friend_id) => {
                self.load_chat_history(connection_id, friend_id)
            }
            ClientEvent::GlobalMessage(text) => self.global_message(connection_id, &text),
            ClientEvent::GetOnlineUsers => {
                vec![Outbound::to_all(ServerEvent::UsersUpdate(
                    self.presence_snapshot(),
                ))]
            }
        }
    }

    /// Transport calls this when a connection closes. Releases the session
    /// binding unconditionally; the presence broadcast is the transport's
    /// job so it can apply the reconnect grace period first.
    pub fn disconnect(&self, connection_id: Uuid) -> Option<Uuid> {
        let user_id = self.sessions.unbind(connection_id)?;
        tracing::info!(
            component = "router",
            %connection_id,
            %user_id,
            sessions = self.sessions.session_count(),
            "session released"
        );
        Some(user_id)
    }

    /// Every registered user with their live online flag, in registration
    /// order. A read-only snapshot; may lag concurrent binds by one cycle.
    pub fn presence_snapshot(&self) -> Vec<UserSummary> {
        self.directory
            .all_users()
            .iter()
            .map(|user| self.summarize(user))
            .collect()
    }

    async fn register(&self, connection_id: Uuid, payload: RegisterPayload) -> Vec<Outbound> {
        if let Err(err) = validation::validate_username(&payload.username) {
            return vec![register_error(connection_id, username_error_message(&err))];
        }
        if validation::validate_password(&payload.password).is_err() {
            return vec![register_error(connection_id, "Username and password are required")];
        }
        if let Some(avatar) = &payload.avatar {
            if validation::validate_avatar_url(avatar).is_err() {
                return vec![register_error(connection_id, "Invalid avatar URL")];
            }
        }
        if self.sessions.user_for(connection_id).is_some() {
            return vec![register_error(connection_id, "Connection is already authenticated")];
        }

        match self
            .directory
            .register(&payload.username, &payload.password, payload.avatar)
            .await
        {
            Ok(user) => {
                self.sessions.bind(connection_id, user.id);
                tracing::info!(
                    component = "router",
                    user_id = %user.id,
                    username = %user.username,
                    "user registered"
                );
                vec![
                    Outbound::to_connection(
                        connection_id,
                        ServerEvent::RegisterSuccess(RegisterSuccessPayload {
                            user: self.summarize(&user),
                        }),
                    ),
                    Outbound::to_all(ServerEvent::UsersUpdate(self.presence_snapshot())),
                ]
            }
            Err(err) => vec![register_error(connection_id, &err.to_string())],
        }
    }

    async fn login(&self, connection_id: Uuid, payload: LoginPayload) -> Vec<Outbound> {
        if let Err(err) = validation::validate_username(&payload.username) {
            return vec![login_error(connection_id, username_error_message(&err))];
        }
        if validation::validate_password(&payload.password).is_err() {
            return vec![login_error(connection_id, "Username and password are required")];
        }
        if self.sessions.user_for(connection_id).is_some() {
            return vec![login_error(connection_id, "Connection is already authenticated")];
        }

        match self
            .directory
            .authenticate(&payload.username, &payload.password)
            .await
        {
            Ok(user) => {
                self.sessions.bind(connection_id, user.id);
                tracing::info!(
                    component = "router",
                    user_id = %user.id,
                    username = %user.username,
                    "user logged in"
                );
                let friends = self
                    .directory
                    .friends_of(user.id)
                    .iter()
                    .map(|friend| self.summarize(friend))
                    .collect();
                let friend_requests = self
                    .directory
                    .pending_requests_for(user.id)
                    .iter()
                    .map(|requester| self.summarize(requester))
                    .collect();
                vec![
                    Outbound::to_connection(
                        connection_id,
                        ServerEvent::LoginSuccess(LoginSuccessPayload {
                            user: self.summarize(&user),
                            friends,
                            friend_requests,
                        }),
                    ),
                    Outbound::to_all(ServerEvent::UsersUpdate(self.presence_snapshot())),
                ]
            }
            Err(err) => vec![login_error(connection_id, &err.to_string())],
        }
    }

    fn search_users(&self, connection_id: Uuid, query: &str) -> Vec<Outbound> {
        let Some(user_id) = self.sessions.user_for(connection_id) else {
            return vec![Outbound::to_connection(
                connection_id,
                ServerEvent::SearchResults(Vec::new()),
            )];
        };
        // Short queries get an empty result set rather than an error.
        if validation::validate_search_query(query).is_err() {
            return vec![Outbound::to_connection(
                connection_id,
                ServerEvent::SearchResults(Vec::new()),
            )];
        }

        let results = self
            .directory
            .search(user_id, query.trim())
            .iter()
            .map(|user| self.summarize(user))
            .collect();
        vec![Outbound::to_connection(
            connection_id,
            ServerEvent::SearchResults(results),
        )]
    }

    fn send_friend_request(&self, connection_id: Uuid, to: Uuid) -> Vec<Outbound> {
        let Some(from) = self.sessions.user_for(connection_id) else {
            return vec![friend_request_error(connection_id, "Not authenticated")];
        };

        match self.directory.send_friend_request(from, to) {
            Ok(()) => {
                let Some(sender) = self.directory.get(from) else {
                    tracing::error!(component = "router", user_id = %from, "bound user missing from directory");
                    return vec![friend_request_error(connection_id, "Internal error")];
                };
                vec![
                    Outbound::to_connection(connection_id, ServerEvent::FriendRequestSent),
                    Outbound::to_user(
                        to,
                        ServerEvent::NewFriendRequest(FriendRequestNotice {
                            from_id: sender.id,
                            from_username: sender.username,
                            from_avatar: sender.avatar,
                        }),
                    ),
                ]
            }
            Err(err) => vec![friend_request_error(connection_id, &err.to_string())],
        }
    }

    fn accept_friend_request(&self, connection_id: Uuid, from: Uuid) -> Vec<Outbound> {
        let Some(by) = self.sessions.user_for(connection_id) else {
            return vec![friend_request_error(connection_id, "Not authenticated")];
        };

        match self.directory.accept_friend_request(by, from) {
            Ok(()) => {
                let (Some(accepter), Some(requester)) =
                    (self.directory.get(by), self.directory.get(from))
                else {
                    tracing::error!(component = "router", "accepted request between unknown users");
                    return vec![friend_request_error(connection_id, "Internal error")];
                };
                vec![
                    Outbound::to_user(by, ServerEvent::FriendAdded(self.summarize(&requester))),
                    Outbound::to_user(from, ServerEvent::FriendAdded(self.summarize(&accepter))),
                    Outbound::to_all(ServerEvent::UsersUpdate(self.presence_snapshot())),
                ]
            }
            Err(err) => vec![friend_request_error(connection_id, &err.to_string())],
        }
    }

    fn decline_friend_request(&self, connection_id: Uuid, from: Uuid) -> Vec<Outbound> {
        let Some(by) = self.sessions.user_for(connection_id) else {
            return vec![friend_request_error(connection_id, "Not authenticated")];
        };

        self.directory.decline_friend_request(by, from);
        vec![Outbound::to_connection(
            connection_id,
            ServerEvent::FriendRequestDeclined(FriendRequestDeclinedPayload { user_id: from }),
        )]
    }

    fn private_message(&self, connection_id: Uuid, payload: PrivateMessagePayload) -> Vec<Outbound> {
        let Some(from) = self.sessions.user_for(connection_id) else {
            return vec![message_error(connection_id, "Not authenticated")];
        };
        if validation::validate_message_text(&payload.text).is_err() {
            return vec![message_error(connection_id, "Message text is required")];
        }
        if !self.directory.are_friends(from, payload.to) {
            return vec![message_error(connection_id, "This user is not in your friends")];
        }

        let (time, timestamp) = clock_now();
        let message = DirectMessage {
            id: Uuid::new_v4(),
            from,
            to: payload.to,
            text: payload.text,
            time,
            timestamp,
        };
        self.conversations.append(from, payload.to, message.clone());

        vec![
            Outbound::to_user(from, ServerEvent::NewPrivateMessage(message.clone())),
            Outbound::to_user(payload.to, ServerEvent::NewPrivateMessage(message)),
        ]
    }

    fn load_chat_history(&self, connection_id: Uuid, friend_id: Uuid) -> Vec<Outbound> {
        let Some(user_id) = self.sessions.user_for(connection_id) else {
            return vec![message_error(connection_id, "Not authenticated")];
        };

        let messages = self.conversations.history(user_id, friend_id);
        vec![Outbound::to_connection(
            connection_id,
            ServerEvent::ChatHistory(ChatHistoryPayload {
                friend_id,
                messages,
            }),
        )]
    }

    fn global_message(&self, connection_id: Uuid, text: &str) -> Vec<Outbound> {
        let Some(from) = self.sessions.user_for(connection_id) else {
            return vec![message_error(connection_id, "Not authenticated")];
        };
        if validation::validate_message_text(text).is_err() {
            return vec![message_error(connection_id, "Message text is required")];
        }
        let Some(sender) = self.directory.get(from) else {
            tracing::error!(component = "router", user_id = %from, "bound user missing from directory");
            return vec![message_error(connection_id, "Internal error")];
        };

        let (time, timestamp) = clock_now();
        vec![Outbound::to_all(ServerEvent::NewGlobalMessage(
            GlobalMessage {
                id: Uuid::new_v4(),
                from,
                username: sender.username,
                avatar: sender.avatar,
                text: text.to_string(),
                time,
                timestamp,
            },
        ))]
    }

    fn summarize(&self, user: &User) -> UserSummary {
        UserSummary {
            id: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            online: self.sessions.is_online(user.id),
        }
    }
}

fn clock_now() -> (String, i64) {
    let now = chrono::Local::now();
    (now.format("%H:%M:%S").to_string(), now.timestamp_millis())
}

fn username_error_message(err: &validator::ValidationError) -> &'static str {
    if err.code == "username_length" {
        "Username is too long"
    } else {
        "Username and password are required"
    }
}

fn register_error(connection_id: Uuid, message: &str) -> Outbound {
    Outbound::to_connection(
        connection_id,
        ServerEvent::RegisterError(ErrorPayload::new(message)),
    )
}

fn login_error(connection_id: Uuid, message: &str) -> Outbound {
    Outbound::to_connection(
        connection_id,
        ServerEvent::LoginError(ErrorPayload::new(message)),
    )
}

fn friend_request_error(connection_id: Uuid, message: &str) -> Outbound {
    Outbound::to_connection(
        connection_id,
        ServerEvent::FriendRequestError(ErrorPayload::new(message)),
    )
}

fn message_error(connection_id: Uuid, message: &str) -> Outbound {
    Outbound::to_connection(
        connection_id,
        ServerEvent::MessageError(ErrorPayload::new(message)),
    )
}
