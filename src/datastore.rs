//! # Datastore Trait and LRU Wrapper
//!
//! [`DataStore`] is the capability boundary for keyed read access:
//! `get`/`contains`/`close`, nothing else. [`LruDataStore`] wraps any store
//! with a bounded least-recently-used cache behind one coarse [`Mutex`], so
//! concurrent `get`s of the same key perform at most one inner lookup and
//! repeated access to a working set skips the inner store entirely.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use crate::error::{Result, StoreError};
use crate::trace::sff::{MmapReader, SffRead};

/// Keyed read access to a record source.
pub trait DataStore {
    /// The lookup key.
    type Key;
    /// The record value.
    type Value;

    /// Fetches the value for a key. `Ok(None)` when the key is absent.
    fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>>;

    /// Whether the key is present, ideally without materializing the value.
    fn contains(&self, key: &Self::Key) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Releases the store; every later access fails.
    fn close(&mut self) -> Result<()>;
}

struct CacheState<K, V> {
    map: HashMap<K, V>,
    // Recency order, least recently used at the front.
    order: VecDeque<K>,
    closed: bool,
}

/// A bounded LRU cache in front of an owned inner store.
///
/// One [`Mutex`] guards the cache and serializes inner lookups; callers
/// needing shared access clone an `Arc<LruDataStore<_>>`.
pub struct LruDataStore<D: DataStore> {
    inner: D,
    capacity: usize,
    state: Mutex<CacheState<D::Key, D::Value>>,
}

impl<D> LruDataStore<D>
where
    D: DataStore,
    D::Key: Eq + Hash + Clone,
    D::Value: Clone,
{
    /// Wraps `inner` with a cache holding at most `capacity` values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ZeroCapacity`] for a capacity of zero.
    pub fn new(inner: D, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(StoreError::ZeroCapacity.into());
        }
        Ok(Self {
            inner,
            capacity,
            state: Mutex::new(CacheState {
                map: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                closed: false,
            }),
        })
    }

    /// Maximum number of cached values.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of values currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The wrapped store.
    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState<D::Key, D::Value>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D> DataStore for LruDataStore<D>
where
    D: DataStore,
    D::Key: Eq + Hash + Clone,
    D::Value: Clone,
{
    type Key = D::Key;
    type Value = D::Value;

    fn get(&self, key: &Self::Key) -> Result<Option<Self::Value>> {
        let mut state = self.lock();
        if state.closed {
            return Err(StoreError::Closed.into());
        }
        if let Some(value) = state.map.get(key).cloned() {
            // Refresh recency.
            state.order.retain(|k| k != key);
            state.order.push_back(key.clone());
            return Ok(Some(value));
        }

        // The inner lookup happens under the lock, so a second caller asking
        // for the same key waits here and then hits the cache.
        let Some(value) = self.inner.get(key)? else {
            return Ok(None);
        };
        if state.map.len() == self.capacity {
            if let Some(evicted) = state.order.pop_front() {
                state.map.remove(&evicted);
            }
        }
        state.map.insert(key.clone(), value.clone());
        state.order.push_back(key.clone());
        Ok(Some(value))
    }

    fn contains(&self, key: &Self::Key) -> Result<bool> {
        let state = self.lock();
        if state.closed {
            return Err(StoreError::Closed.into());
        }
        if state.map.contains_key(key) {
            return Ok(true);
        }
        self.inner.contains(key)
    }

    fn close(&mut self) -> Result<()> {
        {
            let mut state = self.lock();
            state.closed = true;
            state.map.clear();
            state.order.clear();
        }
        self.inner.close()
    }
}

/// Name-keyed access to the reads of a memory-mapped flowgram file.
impl DataStore for MmapReader {
    type Key = String;
    type Value = SffRead;

    fn get(&self, key: &String) -> Result<Option<SffRead>> {
        self.get_by_name(key).transpose()
    }

    fn contains(&self, key: &String) -> Result<bool> {
        Ok(self.contains_name(key))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::error::Error;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// An in-memory store counting how often each key is fetched.
    struct CountingStore {
        values: HashMap<u32, String>,
        fetches: RefCell<HashMap<u32, usize>>,
        closed: bool,
    }

    impl CountingStore {
        fn with(pairs: &[(u32, &str)]) -> Self {
            Self {
                values: pairs.iter().map(|&(k, v)| (k, v.to_owned())).collect(),
                fetches: RefCell::new(HashMap::new()),
                closed: false,
            }
        }

        fn fetches_of(&self, key: u32) -> usize {
            self.fetches.borrow().get(&key).copied().unwrap_or(0)
        }
    }

    impl DataStore for CountingStore {
        type Key = u32;
        type Value = String;

        fn get(&self, key: &u32) -> crate::error::Result<Option<String>> {
            if self.closed {
                return Err(StoreError::Closed.into());
            }
            *self.fetches.borrow_mut().entry(*key).or_insert(0) += 1;
            Ok(self.values.get(key).cloned())
        }

        fn close(&mut self) -> crate::error::Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[test]
    fn repeated_gets_fetch_once() -> Result<()> {
        let store = LruDataStore::new(CountingStore::with(&[(1, "one"), (2, "two")]), 4)?;
        assert_eq!(store.get(&1)?.as_deref(), Some("one"));
        assert_eq!(store.get(&1)?.as_deref(), Some("one"));
        assert_eq!(store.get(&1)?.as_deref(), Some("one"));
        assert_eq!(store.inner().fetches_of(1), 1);
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn absent_keys_are_not_cached() -> Result<()> {
        let store = LruDataStore::new(CountingStore::with(&[(1, "one")]), 4)?;
        assert_eq!(store.get(&9)?, None);
        assert_eq!(store.get(&9)?, None);
        assert_eq!(store.inner().fetches_of(9), 2);
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn eviction_follows_recency() -> Result<()> {
        let pairs = [(1, "one"), (2, "two"), (3, "three")];
        let store = LruDataStore::new(CountingStore::with(&pairs), 2)?;
        store.get(&1)?;
        store.get(&2)?;
        // Touch 1 so 2 becomes the eviction candidate.
        store.get(&1)?;
        store.get(&3)?;
        assert_eq!(store.len(), 2);

        store.get(&1)?;
        assert_eq!(store.inner().fetches_of(1), 1, "1 stayed cached");
        store.get(&2)?;
        assert_eq!(store.inner().fetches_of(2), 2, "2 was evicted and refetched");
        Ok(())
    }

    #[test]
    fn contains_does_not_fetch() -> Result<()> {
        let store = LruDataStore::new(CountingStore::with(&[(1, "one")]), 2)?;
        assert!(store.contains(&1)?);
        assert!(!store.contains(&9)?);
        assert_eq!(store.inner().fetches_of(1), 1, "default contains delegates to get");
        assert!(store.is_empty(), "contains never populates the cache");
        Ok(())
    }

    #[test]
    fn closed_store_rejects_access() -> Result<()> {
        let mut store = LruDataStore::new(CountingStore::with(&[(1, "one")]), 2)?;
        store.get(&1)?;
        store.close()?;
        assert!(matches!(
            store.get(&1).unwrap_err(),
            Error::StoreError(StoreError::Closed)
        ));
        assert!(matches!(
            store.contains(&1).unwrap_err(),
            Error::StoreError(StoreError::Closed)
        ));
        Ok(())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            LruDataStore::new(CountingStore::with(&[]), 0).err().unwrap(),
            Error::StoreError(StoreError::ZeroCapacity)
        ));
    }
}
