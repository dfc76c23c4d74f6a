//! Cached, reference-counted subscriptions.
//!
//! Each distinct query (id plus parameters) gets one cache entry holding
//! the computed value in an [`Atom`]. Further subscribers to an equal
//! query share the entry; the entry is recomputed after every state
//! change and its watchers fire only when the recomputed value differs
//! from the cached one. The last [`Subscription`] handle to drop removes
//! the entry and disposes its cell.

use std::marker::PhantomData;
use std::sync::Arc;

use reflow_core::{Atom, DynValue, Query, Unwatch};
use tracing::{debug, trace};

use crate::registry::SubHandler;

type EqFn = Arc<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync>;
pub(crate) type RetainFn = Arc<dyn Fn(u64, isize) + Send + Sync>;

struct CacheEntry<Db> {
    key: u64,
    query: Query,
    refs: usize,
    cell: Atom<DynValue>,
    values_equal: EqFn,
    compute: Arc<dyn Fn(&Db, &Query) -> DynValue + Send + Sync>,
}

/// The per-store subscription cache. Lives behind the store's lock; all
/// methods are plain `&mut` and release no watcher notifications while
/// the caller's lock is held except through [`Atom`], which snapshots its
/// watchers before calling them.
pub(crate) struct SubscriptionCache<Db> {
    entries: Vec<CacheEntry<Db>>,
    next_key: u64,
}

impl<Db> SubscriptionCache<Db> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_key: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Find or create the entry for `query`, bump its refcount, and hand
    /// back `(key, cell)` for the subscription handle.
    pub(crate) fn subscribe(
        &mut self,
        query: Query,
        handler: &SubHandler<Db>,
        db: &Db,
    ) -> (u64, Atom<DynValue>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.query == query) {
            entry.refs += 1;
            trace!(query_id = %query.id(), refs = entry.refs, "subscription cache hit");
            return (entry.key, entry.cell.clone());
        }

        let key = self.next_key;
        self.next_key += 1;
        let initial = (handler.compute)(db, &query);
        let cell = Atom::with_value(initial);
        debug!(query_id = %query.id(), "subscription cache miss, computing");
        self.entries.push(CacheEntry {
            key,
            query,
            refs: 1,
            cell: cell.clone(),
            values_equal: Arc::clone(&handler.values_equal),
            compute: Arc::clone(&handler.compute),
        });
        (key, cell)
    }

    /// Adjust the refcount of one entry. At zero the entry is evicted and
    /// its cell disposed, so late watcher registrations become inert.
    pub(crate) fn retain(&mut self, key: u64, delta: isize) {
        let Some(index) = self.entries.iter().position(|e| e.key == key) else {
            return;
        };
        let entry = &mut self.entries[index];
        if delta >= 0 {
            entry.refs += delta.unsigned_abs();
            return;
        }
        entry.refs = entry.refs.saturating_sub(delta.unsigned_abs());
        if entry.refs == 0 {
            let entry = self.entries.swap_remove(index);
            trace!(query_id = %entry.query.id(), "evicting unused subscription");
            entry.cell.dispose();
        }
    }

    /// Snapshot the live entries for recomputation. The store runs the
    /// plan after releasing the cache lock, so compute functions and
    /// watchers never execute with the lock held.
    pub(crate) fn refresh_plan(&self) -> Vec<Recompute<Db>> {
        self.entries
            .iter()
            .map(|entry| Recompute {
                query: entry.query.clone(),
                cell: entry.cell.clone(),
                values_equal: Arc::clone(&entry.values_equal),
                compute: Arc::clone(&entry.compute),
            })
            .collect()
    }

    /// Recompute every live entry against the new state. Entries whose
    /// value is equal to the cached one are left untouched, so their
    /// watchers never fire.
    #[cfg(test)]
    pub(crate) fn refresh(&self, db: &Db) {
        for item in self.refresh_plan() {
            item.run(db);
        }
    }

    #[cfg(test)]
    pub(crate) fn refs(&self, key: u64) -> Option<usize> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.refs)
    }
}

/// One entry's recomputation unit, detached from the cache.
pub(crate) struct Recompute<Db> {
    query: Query,
    cell: Atom<DynValue>,
    values_equal: EqFn,
    compute: Arc<dyn Fn(&Db, &Query) -> DynValue + Send + Sync>,
}

impl<Db> Recompute<Db> {
    /// Recompute against `db`, resetting the cell only on a value change.
    pub(crate) fn run(&self, db: &Db) {
        let next = (self.compute)(db, &self.query);
        let unchanged = self
            .cell
            .deref()
            .is_some_and(|prev| (self.values_equal)(&prev, &next));
        if !unchanged {
            self.cell.reset(next);
        }
    }
}

/// A live handle onto one cached query value.
///
/// Cheap to clone; every clone counts as one more subscriber and dropping
/// the last one evicts the cache entry. The value type `V` was verified
/// against the registered handler when the subscription was created.
pub struct Subscription<V> {
    cell: Atom<DynValue>,
    key: u64,
    retain: RetainFn,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Subscription<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cell: Atom<DynValue>, key: u64, retain: RetainFn) -> Self {
        Self {
            cell,
            key,
            retain,
            _marker: PhantomData,
        }
    }

    /// The current value of the query.
    // The compute fn's output type was checked against `V` at subscribe
    // time, and the cell always holds a value while the entry is live.
    #[allow(clippy::expect_used)]
    #[must_use]
    pub fn deref(&self) -> V {
        let value = self.cell.deref().expect("subscription cell holds a value");
        value
            .downcast_ref::<V>()
            .expect("subscription value type verified at subscribe time")
            .clone()
    }

    /// Release this handle, decrementing the shared entry's refcount.
    /// Dropping the handle does the same; this form reads better at call
    /// sites that release deliberately, e.g. component teardown.
    pub fn dispose(self) {}

    /// Watch for changes to the query value. The watcher fires only when
    /// a state change actually produced a different value. Returns a
    /// handle that removes the watcher when invoked (or dropped, if the
    /// subscription itself is later evicted).
    pub fn watch(&self, watcher: impl Fn(Option<&V>, &V) + Send + Sync + 'static) -> Unwatch {
        self.cell.watch(move |prev, next| {
            let prev = prev.and_then(|p| p.downcast_ref::<V>());
            if let Some(next) = next.downcast_ref::<V>() {
                watcher(prev, next);
            }
        })
    }
}

impl<V> Clone for Subscription<V> {
    fn clone(&self) -> Self {
        (self.retain)(self.key, 1);
        Self {
            cell: self.cell.clone(),
            key: self.key,
            retain: Arc::clone(&self.retain),
            _marker: PhantomData,
        }
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        (self.retain)(self.key, -1);
    }
}

impl<V> std::fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use std::any::TypeId;

    use super::*;

    fn count_handler() -> SubHandler<i64> {
        SubHandler {
            compute: Arc::new(|db, _| Arc::new(*db)),
            value_type: TypeId::of::<i64>(),
            values_equal: Arc::new(|a, b| a.downcast_ref::<i64>() == b.downcast_ref::<i64>()),
        }
    }

    #[test]
    fn equal_queries_share_one_entry() {
        let mut cache: SubscriptionCache<i64> = SubscriptionCache::new();
        let handler = count_handler();

        let (k1, _c1) = cache.subscribe(Query::new("count"), &handler, &1);
        let (k2, _c2) = cache.subscribe(Query::new("count"), &handler, &1);
        assert_eq!(k1, k2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.refs(k1), Some(2));
    }

    #[test]
    fn distinct_params_get_distinct_entries() {
        let mut cache: SubscriptionCache<i64> = SubscriptionCache::new();
        let handler = count_handler();

        let (k1, _c1) = cache.subscribe(Query::with_params("nth", 1_u32), &handler, &1);
        let (k2, _c2) = cache.subscribe(Query::with_params("nth", 2_u32), &handler, &1);
        assert_ne!(k1, k2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn releasing_the_last_ref_evicts_and_disposes() {
        let mut cache: SubscriptionCache<i64> = SubscriptionCache::new();
        let handler = count_handler();

        let (key, cell) = cache.subscribe(Query::new("count"), &handler, &1);
        cache.retain(key, 1);
        cache.retain(key, -1);
        assert_eq!(cache.len(), 1);

        cache.retain(key, -1);
        assert_eq!(cache.len(), 0);
        assert!(cell.is_disposed());
    }

    #[test]
    fn refresh_skips_entries_with_equal_values() {
        let mut cache: SubscriptionCache<i64> = SubscriptionCache::new();
        let handler = count_handler();
        let (_key, cell) = cache.subscribe(Query::new("count"), &handler, &1);

        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        let _unwatch = cell.watch(move |_, _| {
            fired2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        cache.refresh(&1); // same value, no notification
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);

        cache.refresh(&2);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_clone_and_drop_adjust_the_refcount() {
        use std::sync::Mutex;

        let cache = Arc::new(Mutex::new(SubscriptionCache::<i64>::new()));
        let handler = count_handler();
        let (key, cell) = cache.lock().unwrap().subscribe(Query::new("count"), &handler, &7);

        let cache2 = Arc::clone(&cache);
        let retain: RetainFn = Arc::new(move |key, delta| {
            cache2.lock().unwrap().retain(key, delta);
        });

        let sub: Subscription<i64> = Subscription::new(cell, key, retain);
        assert_eq!(sub.deref(), 7);

        let clone = sub.clone();
        assert_eq!(cache.lock().unwrap().refs(key), Some(2));
        drop(clone);
        assert_eq!(cache.lock().unwrap().refs(key), Some(1));
        drop(sub);
        assert_eq!(cache.lock().unwrap().len(), 0);
    }
}
