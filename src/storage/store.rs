//! Shared In-Memory Store
//!
//! One [`Store`] instance holds all keyed state behind a single
//! reader/writer lock. Four tables share the lock: scalar strings, their
//! expiration deadlines, double-ended lists and unordered sets. String keys
//! and list/set keys are independent namespaces; a list operation never
//! consults the string table and vice versa.
//!
//! ## Expiry model
//!
//! Deadlines apply to string keys only and live in their own table. A key can
//! exist without a deadline (no TTL). Expiry is enforced two ways:
//!
//! 1. **Lazy**: GET, EXISTS, INCR, DECR and EX evict a passed-deadline key
//!    before acting, so the operation behaves as if the key never existed.
//!    SET and DEL skip the check — overwrite and deletion are unconditional.
//! 2. **Swept**: a background task periodically calls [`Store::sweep_expired`]
//!    to reclaim keys that are never read again (see the `expiry` module).
//!
//! Overwriting a key with SET does **not** clear a pre-existing deadline;
//! the new content inherits the old countdown. Callers that want a fresh
//! lifetime must reissue EX.
//!
//! ## Locking discipline
//!
//! Reads that cannot evict take the shared lock. Anything that may mutate,
//! including the lazy eviction a read can trigger, takes the exclusive lock.
//! Lookups use an optimistic read-lock pass first and only upgrade when an
//! expired entry is actually found. No lock is ever held across I/O.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Semantic failures surfaced to the command layer.
///
/// The `Display` text of each variant is exactly the message clients see
/// after the `ERR ` prefix.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    KeyNotFound,

    #[error("list is empty")]
    ListEmpty,

    #[error("set is empty")]
    SetEmpty,

    #[error("value is not a number")]
    NotANumber,

    #[error("increment or decrement would overflow")]
    Overflow,
}

/// The four tables guarded by the store lock.
#[derive(Debug, Default)]
struct Tables {
    strings: HashMap<Bytes, Bytes>,
    /// Deadlines for keys in `strings`; absence means no TTL
    expirations: HashMap<Bytes, Instant>,
    lists: HashMap<Bytes, VecDeque<Bytes>>,
    sets: HashMap<Bytes, HashSet<Bytes>>,
}

impl Tables {
    /// True if `key` has a deadline that has passed.
    fn deadline_passed(&self, key: &Bytes) -> bool {
        self.expirations
            .get(key)
            .is_some_and(|deadline| Instant::now() >= *deadline)
    }

    /// Removes `key` from both string tables if its deadline has passed.
    fn evict_if_expired(&mut self, key: &Bytes) {
        if self.deadline_passed(key) {
            self.strings.remove(key);
            self.expirations.remove(key);
        }
    }
}

/// The shared in-memory store.
///
/// Designed to be wrapped in an `Arc` and shared across all connection
/// tasks plus the background sweeper. All operations are thread-safe and
/// serialized per instance by the inner lock.
///
/// # Example
///
/// ```
/// use krill::storage::Store;
/// use bytes::Bytes;
///
/// let store = Store::new();
/// store.set(Bytes::from("name"), Bytes::from("krill"));
/// assert_eq!(store.get(&Bytes::from("name")), Ok(Bytes::from("krill")));
/// ```
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // String operations
    // ========================================================================

    /// Upserts a string key.
    ///
    /// Never consults the deadline table: an expired-but-unswept key is
    /// simply overwritten, and a live deadline on `key` stays in force.
    pub fn set(&self, key: Bytes, value: Bytes) {
        let mut tables = self.tables.write().unwrap();
        tables.strings.insert(key, value);
    }

    /// Looks up a string key, lazily evicting it first if expired.
    pub fn get(&self, key: &Bytes) -> Result<Bytes, StoreError> {
        // Fast path: shared lock for live keys
        {
            let tables = self.tables.read().unwrap();
            match tables.strings.get(key) {
                Some(value) if !tables.deadline_passed(key) => return Ok(value.clone()),
                Some(_) => {}
                None => return Err(StoreError::KeyNotFound),
            }
        }

        // Expired under the read lock: upgrade, re-check, evict
        let mut tables = self.tables.write().unwrap();
        tables.evict_if_expired(key);
        tables
            .strings
            .get(key)
            .cloned()
            .ok_or(StoreError::KeyNotFound)
    }

    /// Removes each key from the string and deadline tables.
    ///
    /// Unconditional and idempotent; unknown keys are ignored. List and set
    /// entries under the same names are untouched.
    pub fn delete(&self, keys: &[Bytes]) {
        let mut tables = self.tables.write().unwrap();
        for key in keys {
            tables.strings.remove(key);
            tables.expirations.remove(key);
        }
    }

    /// Reports whether a string key exists, lazily evicting it first.
    pub fn exists(&self, key: &Bytes) -> bool {
        {
            let tables = self.tables.read().unwrap();
            match tables.strings.get(key) {
                Some(_) if !tables.deadline_passed(key) => return true,
                Some(_) => {}
                None => return false,
            }
        }

        let mut tables = self.tables.write().unwrap();
        tables.evict_if_expired(key);
        tables.strings.contains_key(key)
    }

    /// Adds `delta` to the integer stored at `key`.
    ///
    /// The current value must parse as a base-10 signed integer; a missing
    /// key is a [`StoreError::NotANumber`] error, not an implicit zero, so
    /// INCR never creates keys.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().unwrap();
        tables.evict_if_expired(key);

        let current = tables.strings.get(key).ok_or(StoreError::NotANumber)?;
        let parsed: i64 = std::str::from_utf8(current)
            .map_err(|_| StoreError::NotANumber)?
            .parse()
            .map_err(|_| StoreError::NotANumber)?;

        let next = parsed.checked_add(delta).ok_or(StoreError::Overflow)?;
        tables
            .strings
            .insert(key.clone(), Bytes::from(next.to_string()));
        Ok(next)
    }

    /// Sets the deadline of an existing string key to `seconds` from now.
    ///
    /// The key is lazily evicted first; setting a TTL on a key that just
    /// expired reports [`StoreError::KeyNotFound`]. Reissuing overwrites any
    /// prior deadline. Zero or negative `seconds` produce an
    /// already-passed deadline.
    pub fn expire_in(&self, key: &Bytes, seconds: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        tables.evict_if_expired(key);

        if !tables.strings.contains_key(key) {
            return Err(StoreError::KeyNotFound);
        }

        tables.expirations.insert(key.clone(), deadline_in(seconds));
        Ok(())
    }

    /// Returns the remaining lifetime of a key's deadline.
    ///
    /// Keys without a deadline entry report [`StoreError::KeyNotFound`], even
    /// when the string itself exists. A passed deadline evicts the key as a
    /// side effect and reports a zero remainder.
    pub fn ttl(&self, key: &Bytes) -> Result<Duration, StoreError> {
        let mut tables = self.tables.write().unwrap();

        let deadline = *tables.expirations.get(key).ok_or(StoreError::KeyNotFound)?;
        let now = Instant::now();

        if now >= deadline {
            tables.strings.remove(key);
            tables.expirations.remove(key);
            return Ok(Duration::ZERO);
        }

        Ok(deadline - now)
    }

    /// Evicts every string key whose deadline has passed.
    ///
    /// Called by the background sweeper. Keys without a deadline entry are
    /// never touched; sweeping twice in a row is a no-op the second time.
    ///
    /// Returns the number of evicted keys.
    pub fn sweep_expired(&self) -> u64 {
        let mut tables = self.tables.write().unwrap();
        let now = Instant::now();

        let expired: Vec<Bytes> = tables
            .expirations
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            tables.strings.remove(key);
            tables.expirations.remove(key);
        }

        expired.len() as u64
    }

    // ========================================================================
    // List operations
    // ========================================================================

    /// Pushes a value onto the front of the list at `key`, creating the list
    /// if absent. Returns the resulting length.
    pub fn push_front(&self, key: Bytes, value: Bytes) -> usize {
        let mut tables = self.tables.write().unwrap();
        let list = tables.lists.entry(key).or_default();
        list.push_front(value);
        list.len()
    }

    /// Pushes a value onto the back of the list at `key`, creating the list
    /// if absent. Returns the resulting length.
    pub fn push_back(&self, key: Bytes, value: Bytes) -> usize {
        let mut tables = self.tables.write().unwrap();
        let list = tables.lists.entry(key).or_default();
        list.push_back(value);
        list.len()
    }

    /// Pops from the front of the list at `key`.
    ///
    /// An absent list is [`StoreError::KeyNotFound`]; a present-but-drained
    /// list is [`StoreError::ListEmpty`]. The entry itself persists once
    /// created, even at length zero.
    pub fn pop_front(&self, key: &Bytes) -> Result<Bytes, StoreError> {
        let mut tables = self.tables.write().unwrap();
        let list = tables.lists.get_mut(key).ok_or(StoreError::KeyNotFound)?;
        list.pop_front().ok_or(StoreError::ListEmpty)
    }

    /// Pops from the back of the list at `key`; errors as [`Store::pop_front`].
    pub fn pop_back(&self, key: &Bytes) -> Result<Bytes, StoreError> {
        let mut tables = self.tables.write().unwrap();
        let list = tables.lists.get_mut(key).ok_or(StoreError::KeyNotFound)?;
        list.pop_back().ok_or(StoreError::ListEmpty)
    }

    // ========================================================================
    // Set operations
    // ========================================================================

    /// Inserts a member into the set at `key`, creating the set if absent.
    ///
    /// Returns true if the member was newly added.
    pub fn sadd(&self, key: Bytes, member: Bytes) -> bool {
        let mut tables = self.tables.write().unwrap();
        tables.sets.entry(key).or_default().insert(member)
    }

    /// Removes a member from the set at `key`.
    ///
    /// An absent set is [`StoreError::KeyNotFound`]; removing a member that
    /// is not present is a successful no-op. The set entry persists even
    /// when it becomes empty.
    pub fn srem(&self, key: &Bytes, member: &Bytes) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap();
        let set = tables.sets.get_mut(key).ok_or(StoreError::KeyNotFound)?;
        set.remove(member);
        Ok(())
    }

    /// Enumerates the members of the set at `key`, in no particular order.
    ///
    /// An absent set is [`StoreError::KeyNotFound`]; an empty one is
    /// [`StoreError::SetEmpty`]. Sets carry no deadlines, so this is a pure
    /// shared-lock read.
    pub fn smembers(&self, key: &Bytes) -> Result<Vec<Bytes>, StoreError> {
        let tables = self.tables.read().unwrap();
        let set = tables.sets.get(key).ok_or(StoreError::KeyNotFound)?;
        if set.is_empty() {
            return Err(StoreError::SetEmpty);
        }
        Ok(set.iter().cloned().collect())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of live string keys (expired-but-unswept keys included).
    pub fn string_key_count(&self) -> usize {
        self.tables.read().unwrap().strings.len()
    }

    /// Number of keys carrying a deadline.
    pub fn expiration_count(&self) -> usize {
        self.tables.read().unwrap().expirations.len()
    }
}

/// Absolute deadline `seconds` from now; zero or negative seconds land in
/// the past (clamped to process start at the extreme).
fn deadline_in(seconds: i64) -> Instant {
    let now = Instant::now();
    if seconds >= 0 {
        now + Duration::from_secs(seconds as u64)
    } else {
        now.checked_sub(Duration::from_secs(seconds.unsigned_abs()))
            .unwrap_or(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_set_then_get() {
        let store = Store::new();
        store.set(b("name"), b("krill"));
        assert_eq!(store.get(&b("name")), Ok(b("krill")));
        // No expiration side effect
        assert_eq!(store.ttl(&b("name")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_get_missing_key() {
        let store = Store::new();
        assert_eq!(store.get(&b("nope")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_set_overwrites() {
        let store = Store::new();
        store.set(b("k"), b("one"));
        store.set(b("k"), b("two"));
        assert_eq!(store.get(&b("k")), Ok(b("two")));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        store.delete(&[b("k"), b("never-existed")]);
        store.delete(&[b("k")]);
        assert_eq!(store.get(&b("k")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_delete_clears_deadline() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        store.expire_in(&b("k"), 100).unwrap();
        store.delete(&[b("k")]);
        assert_eq!(store.expiration_count(), 0);
    }

    #[test]
    fn test_incr_decr() {
        let store = Store::new();
        store.set(b("n"), b("41"));
        assert_eq!(store.incr_by(&b("n"), 1), Ok(42));
        assert_eq!(store.incr_by(&b("n"), -1), Ok(41));
        assert_eq!(store.get(&b("n")), Ok(b("41")));
    }

    #[test]
    fn test_incr_missing_key_does_not_create() {
        let store = Store::new();
        assert_eq!(store.incr_by(&b("n"), 1), Err(StoreError::NotANumber));
        assert_eq!(store.get(&b("n")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_incr_non_numeric_value() {
        let store = Store::new();
        store.set(b("n"), b("forty-two"));
        assert_eq!(store.incr_by(&b("n"), 1), Err(StoreError::NotANumber));
    }

    #[test]
    fn test_incr_negative_value() {
        let store = Store::new();
        store.set(b("n"), b("-5"));
        assert_eq!(store.incr_by(&b("n"), 1), Ok(-4));
    }

    #[test]
    fn test_incr_overflow() {
        let store = Store::new();
        store.set(b("n"), b(&i64::MAX.to_string()));
        assert_eq!(store.incr_by(&b("n"), 1), Err(StoreError::Overflow));
        // Value untouched on overflow
        assert_eq!(store.get(&b("n")), Ok(b(&i64::MAX.to_string())));
    }

    #[test]
    fn test_expire_missing_key() {
        let store = Store::new();
        assert_eq!(store.expire_in(&b("k"), 10), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        store.expire_in(&b("k"), 0).unwrap();
        assert_eq!(store.get(&b("k")), Err(StoreError::KeyNotFound));
        // Lazy eviction removed the deadline too
        assert_eq!(store.expiration_count(), 0);
    }

    #[test]
    fn test_negative_ttl_expires_immediately() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        store.expire_in(&b("k"), -30).unwrap();
        assert!(!store.exists(&b("k")));
    }

    #[test]
    fn test_set_keeps_existing_deadline() {
        // Overwriting content does not reset the countdown
        let store = Store::new();
        store.set(b("k"), b("old"));
        store.expire_in(&b("k"), -1).unwrap();
        store.set(b("k"), b("new"));
        assert_eq!(store.get(&b("k")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_expire_reissue_overwrites_deadline() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        store.expire_in(&b("k"), -1).unwrap();
        // The first deadline passed, so the key is gone and the reissue fails
        assert_eq!(store.expire_in(&b("k"), 100), Err(StoreError::KeyNotFound));

        store.set(b("k2"), b("v"));
        store.expire_in(&b("k2"), 1).unwrap();
        store.expire_in(&b("k2"), 3600).unwrap();
        let remaining = store.ttl(&b("k2")).unwrap();
        assert!(remaining > Duration::from_secs(3000));
    }

    #[test]
    fn test_ttl_without_deadline() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        assert_eq!(store.ttl(&b("k")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_ttl_passed_deadline_evicts_and_reports_zero() {
        let store = Store::new();
        store.set(b("k"), b("v"));
        store.expire_in(&b("k"), -5).unwrap();
        assert_eq!(store.ttl(&b("k")), Ok(Duration::ZERO));
        assert_eq!(store.string_key_count(), 0);
        assert_eq!(store.expiration_count(), 0);
    }

    #[test]
    fn test_sweep_evicts_without_access() {
        let store = Store::new();
        store.set(b("dead"), b("v"));
        store.expire_in(&b("dead"), -1).unwrap();
        store.set(b("alive"), b("v"));
        store.expire_in(&b("alive"), 3600).unwrap();
        store.set(b("no-ttl"), b("v"));

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.string_key_count(), 2);
        assert!(store.exists(&b("alive")));
        assert!(store.exists(&b("no-ttl")));

        // Idempotent: nothing new to evict
        assert_eq!(store.sweep_expired(), 0);
    }

    #[test]
    fn test_list_push_pop_ordering() {
        let store = Store::new();
        store.push_front(b("l"), b("a"));
        store.push_back(b("l"), b("b"));
        assert_eq!(store.pop_front(&b("l")), Ok(b("a")));
        assert_eq!(store.pop_back(&b("l")), Ok(b("b")));
    }

    #[test]
    fn test_drained_list_entry_persists() {
        let store = Store::new();
        store.push_front(b("l"), b("only"));
        store.pop_front(&b("l")).unwrap();
        // Drained, not deleted: pops now report empty, not missing
        assert_eq!(store.pop_front(&b("l")), Err(StoreError::ListEmpty));
        assert_eq!(store.pop_back(&b("l")), Err(StoreError::ListEmpty));
    }

    #[test]
    fn test_pop_missing_list() {
        let store = Store::new();
        assert_eq!(store.pop_front(&b("l")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_list_and_string_namespaces_are_independent() {
        let store = Store::new();
        store.set(b("k"), b("scalar"));
        store.push_back(b("k"), b("element"));
        assert_eq!(store.get(&b("k")), Ok(b("scalar")));
        assert_eq!(store.pop_back(&b("k")), Ok(b("element")));
    }

    #[test]
    fn test_sadd_deduplicates() {
        let store = Store::new();
        assert!(store.sadd(b("s"), b("m")));
        assert!(!store.sadd(b("s"), b("m")));
        assert_eq!(store.smembers(&b("s")), Ok(vec![b("m")]));
    }

    #[test]
    fn test_srem_absent_member_is_noop() {
        let store = Store::new();
        store.sadd(b("s"), b("m"));
        assert_eq!(store.srem(&b("s"), &b("ghost")), Ok(()));
        assert_eq!(store.smembers(&b("s")), Ok(vec![b("m")]));
    }

    #[test]
    fn test_srem_missing_set() {
        let store = Store::new();
        assert_eq!(store.srem(&b("s"), &b("m")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_emptied_set_entry_persists() {
        let store = Store::new();
        store.sadd(b("s"), b("m"));
        store.srem(&b("s"), &b("m")).unwrap();
        assert_eq!(store.smembers(&b("s")), Err(StoreError::SetEmpty));
    }

    #[test]
    fn test_smembers_missing_set() {
        let store = Store::new();
        assert_eq!(store.smembers(&b("s")), Err(StoreError::KeyNotFound));
    }

    #[test]
    fn test_concurrent_incr_loses_no_updates() {
        let store = Arc::new(Store::new());
        store.set(b("counter"), b("0"));

        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        store.incr_by(&Bytes::from_static(b"counter"), 1).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let total = (THREADS * PER_THREAD) as i64;
        assert_eq!(store.get(&b("counter")), Ok(b(&total.to_string())));
    }
}
