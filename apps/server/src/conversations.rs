use std::collections::HashMap;

use parking_lot::RwLock;
use shared_proto::DirectMessage;
use uuid::Uuid;

/// Canonical, order-independent key for a two-party conversation: the
/// pair of user ids sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(Uuid, Uuid);

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Append-only per-pair message history, created lazily on first append.
/// The store-level write lock sequences appends for a pair.
#[derive(Default)]
pub struct ConversationStore {
    inner: RwLock<HashMap<PairKey, Vec<DirectMessage>>>,
}

impl ConversationStore {
    pub fn append(&self, a: Uuid, b: Uuid, message: DirectMessage) {
        self.inner
            .write()
            .entry(PairKey::new(a, b))
            .or_default()
            .push(message);
    }

    /// Full ordered history for the pair; empty if they never spoke.
    pub fn history(&self, a: Uuid, b: Uuid) -> Vec<DirectMessage> {
        self.inner
            .read()
            .get(&PairKey::new(a, b))
            .cloned()
            .unwrap_or_default()
    }
}
