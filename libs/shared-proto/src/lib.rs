//! Wire protocol shared between the chat server and its clients.
//!
//! Every frame on the socket is a JSON object of the form
//! `{"type": "<event name>", "payload": ...}`; the `payload` field is
//! omitted for payload-less events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user, with a live presence flag.
///
/// Used for presence broadcasts, search results, friend lists,
/// pending-request lists and the `user` field of auth responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar: String,
    pub online: bool,
}

/// A friend-to-friend message. Persisted in the conversation store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub text: String,
    /// Human-readable send time (`%H:%M:%S`).
    pub time: String,
    /// Unix milliseconds at send time.
    pub timestamp: i64,
}

/// A global-room message. Never persisted; sender display fields are
/// denormalized at send time so the record survives later profile edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMessage {
    pub id: Uuid,
    pub from: Uuid,
    pub username: String,
    pub avatar: String,
    pub text: String,
    pub time: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessagePayload {
    pub to: Uuid,
    pub text: String,
}

/// Events a client may send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    Register(RegisterPayload),
    Login(LoginPayload),
    SearchUsers(String),
    SendFriendRequest(Uuid),
    AcceptFriendRequest(Uuid),
    DeclineFriendRequest(Uuid),
    PrivateMessage(PrivateMessagePayload),
    LoadChatHistory(Uuid),
    GlobalMessage(String),
    GetOnlineUsers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSuccessPayload {
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginSuccessPayload {
    pub user: UserSummary,
    pub friends: Vec<UserSummary>,
    pub friend_requests: Vec<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequestNotice {
    pub from_id: Uuid,
    pub from_username: String,
    pub from_avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequestDeclinedPayload {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryPayload {
    pub friend_id: Uuid,
    pub messages: Vec<DirectMessage>,
}

/// Events the server may push to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    RegisterSuccess(RegisterSuccessPayload),
    RegisterError(ErrorPayload),
    LoginSuccess(LoginSuccessPayload),
    LoginError(ErrorPayload),
    SearchResults(Vec<UserSummary>),
    FriendRequestSent,
    FriendRequestError(ErrorPayload),
    NewFriendRequest(FriendRequestNotice),
    FriendAdded(UserSummary),
    FriendRequestDeclined(FriendRequestDeclinedPayload),
    NewPrivateMessage(DirectMessage),
    MessageError(ErrorPayload),
    ChatHistory(ChatHistoryPayload),
    NewGlobalMessage(GlobalMessage),
    UsersUpdate(Vec<UserSummary>),
}
