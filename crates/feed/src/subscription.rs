//! Topic membership registries.
//!
//! Registries hold weak session references so a subscription never extends a
//! session's lifetime. Promotion happens transiently at delivery time; a
//! failed promotion removes the entry, and `count` prunes as it counts so
//! the report reflects released sessions on its next call.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::session::{Session, SessionId};

/// Membership registry for one scalar topic.
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    inner: Arc<Mutex<HashMap<SessionId, Weak<dyn Session>>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. Re-subscribing is a no-op.
    pub fn subscribe(&self, session: &Arc<dyn Session>) {
        self.inner.lock().insert(session.id(), Arc::downgrade(session));
    }

    /// Removes a session.
    pub fn unsubscribe(&self, session_id: SessionId) {
        self.inner.lock().remove(&session_id);
    }

    /// Promotes all live members, dropping entries whose owner released them.
    pub fn live(&self) -> Vec<Arc<dyn Session>> {
        let mut inner = self.inner.lock();
        let mut live = Vec::with_capacity(inner.len());
        inner.retain(|_, weak| match weak.upgrade() {
            Some(session) => {
                live.push(session);
                true
            },
            None => false,
        });
        live
    }

    /// Number of live members; prunes released sessions.
    pub fn count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.retain(|_, weak| weak.strong_count() > 0);
        inner.len()
    }
}

/// Membership registry for a keyed topic family.
#[derive(Clone)]
pub(crate) struct KeyedSubscribers<K> {
    inner: Arc<Mutex<HashMap<K, HashMap<SessionId, Weak<dyn Session>>>>>,
}

impl<K: Eq + Hash + Clone> KeyedSubscribers<K> {
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn subscribe(&self, key: K, session: &Arc<dyn Session>) {
        self.inner
            .lock()
            .entry(key)
            .or_default()
            .insert(session.id(), Arc::downgrade(session));
    }

    /// Removes a session from one key. Unknown keys are a no-op.
    pub fn unsubscribe(&self, key: &K, session_id: SessionId) {
        let mut inner = self.inner.lock();
        if let Some(members) = inner.get_mut(key) {
            members.remove(&session_id);
            if members.is_empty() {
                inner.remove(key);
            }
        }
    }

    /// Promotes the live members of one key.
    pub fn live(&self, key: &K) -> Vec<Arc<dyn Session>> {
        let mut inner = self.inner.lock();
        let Some(members) = inner.get_mut(key) else {
            return Vec::new();
        };
        let mut live = Vec::with_capacity(members.len());
        members.retain(|_, weak| match weak.upgrade() {
            Some(session) => {
                live.push(session);
                true
            },
            None => false,
        });
        if members.is_empty() {
            inner.remove(key);
        }
        live
    }

    /// Total live entries across all keys; prunes released sessions and
    /// empty keys.
    pub fn count(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut total = 0;
        inner.retain(|_, members| {
            members.retain(|_, weak| weak.strong_count() > 0);
            total += members.len();
            !members.is_empty()
        });
        total
    }
}
