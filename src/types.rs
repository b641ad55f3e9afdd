use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, RwLock},
};

use crate::{error::IndexError, utils::HandyRwLock};

// Type alias, not a new type, cannot define methods on it
pub type Pod<T> = Arc<RwLock<T>>;

pub type ResultPod<T> = Result<Pod<T>, IndexError>;
pub type IndexResult = Result<(), IndexError>;

/// A HashMap wrapper whose entries can be altered through a shared
/// reference.
pub struct ConcurrentHashMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V> ConcurrentHashMap<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_inner(&self) -> &RwLock<HashMap<K, V>> {
        &self.inner
    }

    /// Run `action` on the value of `key`, inserting the default value
    /// first when the key is not present.
    pub fn alter_value<F>(&self, key: &K, action: F)
    where
        V: Default,
        F: FnOnce(&mut V),
    {
        let mut inner = self.inner.wl();
        let value = inner.entry(key.clone()).or_insert_with(V::default);
        action(value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.wl().remove(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.rl().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.rl().len()
    }

    pub fn clear(&self) {
        self.inner.wl().clear();
    }
}
