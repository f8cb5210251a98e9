//! Session state store shared by every host generation.
//!
//! A host is rebuilt on each reload, but the store it writes to is handed
//! from one generation to the next, so session state survives reloads.
//! The bounded LRU of recently used sessions lives here too, under the same
//! lock as the backing map, so every generation reads the same records.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde_json::{Map, Value};

/// (ruleset, sid)
pub type SessionKey = (String, String);

/// Everything the engine keeps for one session of one ruleset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    pub state: Map<String, Value>,
    pub facts: Vec<Value>,
    pub events: u64,
}

impl SessionRecord {
    pub fn new(sid: &str) -> Self {
        let mut state = Map::new();
        state.insert("sid".to_string(), Value::String(sid.to_string()));
        Self {
            state,
            facts: Vec::new(),
            events: 0,
        }
    }
}

/// Session records: recently used ones in a bounded LRU, the rest spilled
/// into a plain map.
pub struct Sessions {
    hot: LruCache<SessionKey, SessionRecord>,
    cold: HashMap<SessionKey, SessionRecord>,
}

impl Sessions {
    fn new(cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            hot: LruCache::new(capacity),
            cold: HashMap::new(),
        }
    }

    fn get(&mut self, key: &SessionKey) -> Option<SessionRecord> {
        if let Some(record) = self.hot.get(key) {
            return Some(record.clone());
        }
        self.cold.get(key).cloned()
    }

    /// Read-modify-write one session. A missing session starts from
    /// [`SessionRecord::new`].
    pub fn update<T>(
        &mut self,
        ruleset: &str,
        sid: &str,
        f: impl FnOnce(&mut SessionRecord) -> T,
    ) -> T {
        let key = (ruleset.to_string(), sid.to_string());
        if let Some(record) = self.hot.get_mut(&key) {
            return f(record);
        }
        let mut record = self
            .cold
            .remove(&key)
            .unwrap_or_else(|| SessionRecord::new(sid));
        let out = f(&mut record);
        if let Some((evicted_key, evicted)) = self.hot.push(key, record) {
            self.cold.insert(evicted_key, evicted);
        }
        out
    }
}

/// In-memory session store.
pub struct StateStore {
    sessions: Mutex<Sessions>,
}

pub type SharedStateStore = Arc<StateStore>;

impl StateStore {
    /// `cache_size` bounds the LRU of recently used sessions (minimum 1).
    pub fn new(cache_size: usize) -> Self {
        Self {
            sessions: Mutex::new(Sessions::new(cache_size)),
        }
    }

    pub fn shared(cache_size: usize) -> SharedStateStore {
        Arc::new(Self::new(cache_size))
    }

    pub fn load(&self, ruleset: &str, sid: &str) -> Option<SessionRecord> {
        self.lock().get(&(ruleset.to_string(), sid.to_string()))
    }

    pub fn update<T>(
        &self,
        ruleset: &str,
        sid: &str,
        f: impl FnOnce(&mut SessionRecord) -> T,
    ) -> T {
        self.lock().update(ruleset, sid, f)
    }

    /// Run `f` with the store locked, so a group of updates lands atomically.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Sessions) -> T) -> T {
        f(&mut self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions.lock().expect("sessions lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_carries_its_sid() {
        let record = SessionRecord::new("s1");
        assert_eq!(record.state.get("sid"), Some(&Value::String("s1".into())));
        assert_eq!(record.events, 0);
    }

    #[test]
    fn updates_are_scoped_by_ruleset_and_sid() {
        let store = StateStore::new(8);
        store.update("t1", "a", |record| record.events = 3);

        assert_eq!(store.load("t1", "a").map(|r| r.events), Some(3));
        assert_eq!(store.load("t1", "b"), None);
        assert_eq!(store.load("t2", "a"), None);
    }

    #[test]
    fn evicted_sessions_are_kept() {
        let store = StateStore::new(1);
        store.update("t1", "a", |record| record.events = 1);
        store.update("t1", "b", |record| record.events = 2);
        assert_eq!(store.transaction(|sessions| sessions.hot.len()), 1);

        store.update("t1", "a", |record| record.events += 10);
        assert_eq!(store.load("t1", "a").map(|r| r.events), Some(11));
        assert_eq!(store.load("t1", "b").map(|r| r.events), Some(2));
    }

    #[test]
    fn transaction_applies_every_update() {
        let store = StateStore::new(4);
        store.transaction(|sessions| {
            sessions.update("t1", "0", |record| record.events += 1);
            sessions.update("t1", "0", |record| record.events += 1);
        });
        assert_eq!(store.load("t1", "0").map(|r| r.events), Some(2));
    }
}
