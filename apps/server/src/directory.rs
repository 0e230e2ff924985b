use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::auth::CredentialVerifier;

/// Registered account record. The digest never leaves this module; public
/// views are built by the router as `UserSummary` values.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_digest: String,
    pub avatar: String,
    pub friends: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Username already taken")]
    UsernameTaken,
    #[error("User not found")]
    UnknownUser,
    #[error("Invalid password")]
    BadPassword,
    #[error("You are already friends with this user")]
    AlreadyFriends,
    #[error("Friend request already sent")]
    AlreadyRequested,
    #[error("Cannot send a friend request to yourself")]
    SelfRequest,
    #[error("No such friend request")]
    NoSuchRequest,
    #[error("Internal error")]
    Internal,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    /// Registration order, for stable listing and search output.
    order: Vec<Uuid>,
    /// Exact-match (case-sensitive) username index.
    by_username: HashMap<String, Uuid>,
    /// Pending requests: target user id -> requester ids in arrival order.
    requests: HashMap<Uuid, Vec<Uuid>>,
}

/// Owns the registered users and the friendship/request graph.
///
/// All read-then-write sequences run under a single write-lock
/// acquisition, so concurrent conflicting calls serialize here.
pub struct UserDirectory {
    verifier: Arc<dyn CredentialVerifier>,
    inner: RwLock<Inner>,
}

impl UserDirectory {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            verifier,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create an account. The password is hashed on the blocking pool
    /// before the uniqueness check + insert run atomically.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        avatar: Option<String>,
    ) -> Result<User, DirectoryError> {
        // Fail fast before paying for the hash; checked again under the
        // write lock below.
        if self.inner.read().by_username.contains_key(username) {
            return Err(DirectoryError::UsernameTaken);
        }

        let digest = self.hash_password(password).await?;

        let mut inner = self.inner.write();
        if inner.by_username.contains_key(username) {
            return Err(DirectoryError::UsernameTaken);
        }

        let mut id = Uuid::new_v4();
        while inner.users.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let user = User {
            id,
            username: username.to_string(),
            password_digest: digest,
            avatar: avatar.unwrap_or_else(|| default_avatar(username)),
            friends: Vec::new(),
            created_at: Utc::now(),
        };

        inner.by_username.insert(user.username.clone(), id);
        inner.order.push(id);
        inner.users.insert(id, user.clone());
        Ok(user)
    }

    /// Exact username lookup, then digest verification on the blocking
    /// pool. No lock is held while the verifier runs.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, DirectoryError> {
        let user = {
            let inner = self.inner.read();
            inner
                .by_username
                .get(username)
                .and_then(|id| inner.users.get(id))
                .cloned()
        }
        .ok_or(DirectoryError::UnknownUser)?;

        let verifier = Arc::clone(&self.verifier);
        let digest = user.password_digest.clone();
        let candidate = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verifier.verify(&candidate, &digest))
            .await
            .map_err(|err| {
                tracing::error!(component = "directory", error = %err, "verify task panicked");
                DirectoryError::Internal
            })?
            .map_err(|_| DirectoryError::Internal)?;

        if !matches {
            return Err(DirectoryError::BadPassword);
        }

        // The friend set may have moved on while the verifier ran.
        Ok(self.get(user.id).unwrap_or(user))
    }

    /// Case-insensitive substring search, excluding the caller and the
    /// caller's existing friends, in registration order.
    pub fn search(&self, excluding: Uuid, query: &str) -> Vec<User> {
        let needle = query.to_lowercase();
        let inner = self.inner.read();
        let friends = inner
            .users
            .get(&excluding)
            .map(|user| user.friends.clone())
            .unwrap_or_default();

        inner
            .order
            .iter()
            .filter_map(|id| inner.users.get(id))
            .filter(|user| {
                user.id != excluding
                    && !friends.contains(&user.id)
                    && user.username.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }

    pub fn send_friend_request(&self, from: Uuid, to: Uuid) -> Result<(), DirectoryError> {
        if from == to {
            return Err(DirectoryError::SelfRequest);
        }

        let mut inner = self.inner.write();
        if !inner.users.contains_key(&from) || !inner.users.contains_key(&to) {
            return Err(DirectoryError::UnknownUser);
        }
        let already_friends = inner
            .users
            .get(&from)
            .is_some_and(|user| user.friends.contains(&to));
        if already_friends {
            return Err(DirectoryError::AlreadyFriends);
        }

        let pending = inner.requests.entry(to).or_default();
        if pending.contains(&from) {
            return Err(DirectoryError::AlreadyRequested);
        }
        pending.push(from);
        Ok(())
    }

    /// Remove the pending request (both directions, if both exist) and
    /// establish the mutual friendship in one atomic step.
    pub fn accept_friend_request(&self, by: Uuid, from: Uuid) -> Result<(), DirectoryError> {
        let mut inner = self.inner.write();

        let position = inner
            .requests
            .get(&by)
            .and_then(|pending| pending.iter().position(|id| *id == from))
            .ok_or(DirectoryError::NoSuchRequest)?;
        if let Some(pending) = inner.requests.get_mut(&by) {
            pending.remove(position);
        }
        if let Some(reverse) = inner.requests.get_mut(&from) {
            reverse.retain(|id| *id != by);
        }

        let accepter = inner.users.get_mut(&by).ok_or(DirectoryError::UnknownUser)?;
        if !accepter.friends.contains(&from) {
            accepter.friends.push(from);
        }
        let requester = inner
            .users
            .get_mut(&from)
            .ok_or(DirectoryError::UnknownUser)?;
        if !requester.friends.contains(&by) {
            requester.friends.push(by);
        }
        Ok(())
    }

    /// Lenient by design: declining a request that does not exist is a
    /// no-op success.
    pub fn decline_friend_request(&self, by: Uuid, from: Uuid) {
        let mut inner = self.inner.write();
        if let Some(pending) = inner.requests.get_mut(&by) {
            pending.retain(|id| *id != from);
        }
    }

    pub fn get(&self, user_id: Uuid) -> Option<User> {
        self.inner.read().users.get(&user_id).cloned()
    }

    pub fn all_users(&self) -> Vec<User> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.users.get(id))
            .cloned()
            .collect()
    }

    pub fn friends_of(&self, user_id: Uuid) -> Vec<User> {
        let inner = self.inner.read();
        inner
            .users
            .get(&user_id)
            .map(|user| {
                user.friends
                    .iter()
                    .filter_map(|id| inner.users.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn pending_requests_for(&self, user_id: Uuid) -> Vec<User> {
        let inner = self.inner.read();
        inner
            .requests
            .get(&user_id)
            .map(|pending| {
                pending
                    .iter()
                    .filter_map(|id| inner.users.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn are_friends(&self, a: Uuid, b: Uuid) -> bool {
        self.inner
            .read()
            .users
            .get(&a)
            .is_some_and(|user| user.friends.contains(&b))
    }

    async fn hash_password(&self, password: &str) -> Result<String, DirectoryError> {
        let verifier = Arc::clone(&self.verifier);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || verifier.hash(&password))
            .await
            .map_err(|err| {
                tracing::error!(component = "directory", error = %err, "hash task panicked");
                DirectoryError::Internal
            })?
            .map_err(|_| DirectoryError::Internal)
    }
}

/// Fallback avatar when registration supplies none.
pub fn default_avatar(username: &str) -> String {
    format!(
        "https://ui-avatars.com/api/?name={}&background=667eea&color=fff",
        urlencoding::encode(username)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PlainTextVerifier;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(PlainTextVerifier))
    }

    async fn register(directory: &UserDirectory, username: &str) -> User {
        directory
            .register(username, "secret", None)
            .await
            .expect("registration should succeed")
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_without_a_second_account() {
        let directory = directory();
        register(&directory, "alice").await;

        let err = directory.register("alice", "other", None).await.unwrap_err();
        assert_eq!(err, DirectoryError::UsernameTaken);
        assert_eq!(directory.all_users().len(), 1);
    }

    #[tokio::test]
    async fn case_sensitive_registration_allows_bob_and_lowercase_bob() {
        let directory = directory();
        register(&directory, "Bob").await;
        register(&directory, "bob").await;
        assert_eq!(directory.all_users().len(), 2);
    }

    #[tokio::test]
    async fn authenticate_checks_existence_then_password() {
        let directory = directory();
        let alice = register(&directory, "alice").await;

        let user = directory.authenticate("alice", "secret").await.unwrap();
        assert_eq!(user.id, alice.id);

        assert_eq!(
            directory.authenticate("nobody", "secret").await.unwrap_err(),
            DirectoryError::UnknownUser
        );
        assert_eq!(
            directory.authenticate("alice", "wrong").await.unwrap_err(),
            DirectoryError::BadPassword
        );
    }

    #[tokio::test]
    async fn register_never_stores_the_plaintext_password() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        assert_ne!(alice.password_digest, "secret");
    }

    #[tokio::test]
    async fn missing_avatar_falls_back_to_generated_url() {
        let directory = directory();
        let user = directory
            .register("mr bob", "secret", None)
            .await
            .unwrap();
        assert_eq!(
            user.avatar,
            "https://ui-avatars.com/api/?name=mr%20bob&background=667eea&color=fff"
        );

        let custom = directory
            .register("carol", "secret", Some("https://example.com/c.png".into()))
            .await
            .unwrap();
        assert_eq!(custom.avatar, "https://example.com/c.png");
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_skips_caller_and_friends() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        let bob = register(&directory, "Bob").await;
        register(&directory, "bobby").await;

        let results = directory.search(alice.id, "bob");
        let names: Vec<&str> = results.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["Bob", "bobby"]);

        // After befriending Bob, he disappears from Alice's results.
        directory.send_friend_request(bob.id, alice.id).unwrap();
        directory.accept_friend_request(alice.id, bob.id).unwrap();
        let names: Vec<String> = directory
            .search(alice.id, "bob")
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["bobby"]);
    }

    #[tokio::test]
    async fn friend_request_is_not_duplicated_on_resend() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        let bob = register(&directory, "bob").await;

        directory.send_friend_request(alice.id, bob.id).unwrap();
        assert_eq!(
            directory.send_friend_request(alice.id, bob.id).unwrap_err(),
            DirectoryError::AlreadyRequested
        );

        let pending = directory.pending_requests_for(bob.id);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, alice.id);
    }

    #[tokio::test]
    async fn self_and_unknown_requests_are_rejected() {
        let directory = directory();
        let alice = register(&directory, "alice").await;

        assert_eq!(
            directory.send_friend_request(alice.id, alice.id).unwrap_err(),
            DirectoryError::SelfRequest
        );
        assert_eq!(
            directory
                .send_friend_request(alice.id, Uuid::new_v4())
                .unwrap_err(),
            DirectoryError::UnknownUser
        );
    }

    #[tokio::test]
    async fn accept_makes_friendship_symmetric_and_clears_both_directions() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        let bob = register(&directory, "bob").await;

        directory.send_friend_request(alice.id, bob.id).unwrap();
        directory.send_friend_request(bob.id, alice.id).unwrap();
        directory.accept_friend_request(bob.id, alice.id).unwrap();

        assert!(directory.are_friends(alice.id, bob.id));
        assert!(directory.are_friends(bob.id, alice.id));
        assert!(directory.pending_requests_for(alice.id).is_empty());
        assert!(directory.pending_requests_for(bob.id).is_empty());
    }

    #[tokio::test]
    async fn request_to_an_existing_friend_is_a_conflict() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        let bob = register(&directory, "bob").await;

        directory.send_friend_request(alice.id, bob.id).unwrap();
        directory.accept_friend_request(bob.id, alice.id).unwrap();

        assert_eq!(
            directory.send_friend_request(alice.id, bob.id).unwrap_err(),
            DirectoryError::AlreadyFriends
        );
    }

    #[tokio::test]
    async fn accept_without_a_pending_request_fails() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        let bob = register(&directory, "bob").await;

        assert_eq!(
            directory.accept_friend_request(bob.id, alice.id).unwrap_err(),
            DirectoryError::NoSuchRequest
        );
    }

    #[tokio::test]
    async fn decline_is_idempotent() {
        let directory = directory();
        let alice = register(&directory, "alice").await;
        let bob = register(&directory, "bob").await;

        directory.send_friend_request(alice.id, bob.id).unwrap();
        directory.decline_friend_request(bob.id, alice.id);
        assert!(directory.pending_requests_for(bob.id).is_empty());
        assert!(!directory.are_friends(alice.id, bob.id));

        // Declining again (or declining nothing) stays a no-op.
        directory.decline_friend_request(bob.id, alice.id);
        directory.decline_friend_request(alice.id, Uuid::new_v4());
    }

    #[tokio::test]
    async fn listings_preserve_registration_order() {
        let directory = directory();
        register(&directory, "alice").await;
        register(&directory, "bob").await;
        register(&directory, "carol").await;

        let names: Vec<String> = directory
            .all_users()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }
}
