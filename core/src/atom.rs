//! Mutable, watchable reference cells.
//!
//! An [`Atom`] is the single primitive for mutable state in reflow. The
//! store keeps the application state in one atom, and every subscription is
//! backed by another. Atoms are synchronous: `reset`/`swap` notify all
//! current watchers before returning.

use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Watcher callback, invoked with `(previous, next)` on every mutation.
type Watcher<T> = Arc<dyn Fn(Option<&T>, &T) + Send + Sync>;

struct AtomInner<T> {
    value: Option<T>,
    watchers: Vec<(u64, Watcher<T>)>,
    next_watcher_id: u64,
    disposed: bool,
}

/// A mutable reference cell with change notification.
///
/// Cloning an `Atom` produces another handle to the same cell.
///
/// # Guarantees
///
/// - Watchers observe every `reset`/`swap` exactly once, in registration
///   order.
/// - The watcher list is snapshotted at the start of a notification pass,
///   so unwatching during a pass does not affect that pass.
/// - `reset` notifies even when the new value equals the old one;
///   suppressing redundant notifications is the caller's job (the
///   subscription cache does exactly that).
///
/// # Example
///
/// ```
/// use reflow_core::Atom;
///
/// let atom = Atom::with_value(1);
/// let unwatch = atom.watch(|prev, next| {
///     assert_eq!(prev, Some(&1));
///     assert_eq!(next, &2);
/// });
/// atom.reset(2);
/// unwatch.unwatch();
/// ```
pub struct Atom<T> {
    inner: Arc<Mutex<AtomInner<T>>>,
}

impl<T> Atom<T> {
    /// Create an empty atom.
    #[must_use]
    pub fn new() -> Self {
        Self::from_option(None)
    }

    /// Create an atom seeded with an initial value.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        Self::from_option(Some(value))
    }

    fn from_option(value: Option<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AtomInner {
                value,
                watchers: Vec::new(),
                next_watcher_id: 0,
                disposed: false,
            })),
        }
    }

    /// Register a watcher, returning a handle that removes it again.
    ///
    /// Watchers receive `(previous, next)`. `previous` is `None` when the
    /// atom was empty before the mutation. A disposed atom ignores further
    /// watches and returns an inert handle.
    pub fn watch(&self, watcher: impl Fn(Option<&T>, &T) + Send + Sync + 'static) -> Unwatch
    where
        T: Send + 'static,
    {
        let mut inner = lock(&self.inner);
        if inner.disposed {
            return Unwatch::inert();
        }
        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;
        inner.watchers.push((id, Arc::new(watcher)));
        drop(inner);

        let cell = Arc::downgrade(&self.inner);
        Unwatch {
            remove: Box::new(move || {
                if let Some(cell) = Weak::upgrade(&cell) {
                    lock(&cell).watchers.retain(|(watcher_id, _)| *watcher_id != id);
                }
            }),
        }
    }

    /// Number of currently registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        lock(&self.inner).watchers.len()
    }

    /// Clear the value and all watchers.
    ///
    /// After disposal `deref` returns `None`, mutators are no-ops, and new
    /// watches are ignored.
    pub fn dispose(&self) {
        let mut inner = lock(&self.inner);
        inner.value = None;
        inner.watchers.clear();
        inner.disposed = true;
    }

    /// Whether this atom has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.inner).disposed
    }
}

impl<T: Clone> Atom<T> {
    /// Return a clone of the current value, or `None` if the atom is empty
    /// or disposed.
    #[must_use]
    #[allow(clippy::should_implement_trait)] // deref is the established name for reading a reactive cell
    pub fn deref(&self) -> Option<T> {
        lock(&self.inner).value.clone()
    }

    /// Replace the value and synchronously notify all current watchers.
    pub fn reset(&self, value: T) {
        let (prev, watchers) = {
            let mut inner = lock(&self.inner);
            if inner.disposed {
                return;
            }
            let prev = inner.value.replace(value.clone());
            let watchers: Vec<Watcher<T>> =
                inner.watchers.iter().map(|(_, w)| Arc::clone(w)).collect();
            (prev, watchers)
        };
        // The lock is released before watchers run so they may freely call
        // back into this atom.
        for watcher in watchers {
            watcher(prev.as_ref(), &value);
        }
    }

    /// Functional update: `reset(f(deref()))`.
    ///
    /// `f` receives `None` when the atom is empty.
    pub fn swap(&self, f: impl FnOnce(Option<T>) -> T) {
        if lock(&self.inner).disposed {
            return;
        }
        let current = self.deref();
        self.reset(f(current));
    }
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Atom<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Atom")
            .field("has_value", &inner.value.is_some())
            .field("watchers", &inner.watchers.len())
            .field("disposed", &inner.disposed)
            .finish()
    }
}

/// Handle returned by [`Atom::watch`] that removes the watcher again.
///
/// Calling [`Unwatch::unwatch`] more than once is a no-op.
pub struct Unwatch {
    remove: Box<dyn Fn() + Send + Sync>,
}

impl Unwatch {
    /// Remove the watcher this handle was created for.
    pub fn unwatch(&self) {
        (self.remove)();
    }

    fn inert() -> Self {
        Self {
            remove: Box::new(|| {}),
        }
    }
}

impl std::fmt::Debug for Unwatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Unwatch")
    }
}

fn lock<T>(inner: &Mutex<AtomInner<T>>) -> std::sync::MutexGuard<'_, AtomInner<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn deref_returns_the_current_value() {
        let atom = Atom::with_value(42);
        assert_eq!(atom.deref(), Some(42));
    }

    #[test]
    fn a_new_atom_without_a_value_is_empty() {
        let atom: Atom<i32> = Atom::new();
        assert_eq!(atom.deref(), None);
    }

    #[test]
    fn reset_replaces_the_value() {
        let atom = Atom::with_value(1);
        atom.reset(2);
        assert_eq!(atom.deref(), Some(2));
    }

    #[test]
    fn swap_applies_a_function_to_the_value() {
        let atom = Atom::with_value(2);
        atom.swap(|v| v.unwrap() * 10);
        assert_eq!(atom.deref(), Some(20));
    }

    #[test]
    fn watchers_are_notified_with_prev_and_next() {
        let atom = Atom::with_value(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        atom.watch(move |prev, next| {
            log.lock().unwrap().push((prev.copied(), *next));
        });

        atom.reset(2);
        atom.reset(3);
        assert_eq!(*seen.lock().unwrap(), vec![(Some(1), 2), (Some(2), 3)]);
    }

    #[test]
    fn watchers_run_in_registration_order() {
        let atom = Atom::with_value(0);
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            atom.watch(move |_, _| order.lock().unwrap().push(tag));
        }

        atom.reset(1);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn reset_notifies_even_when_the_value_is_equal() {
        let atom = Atom::with_value(7);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        atom.watch(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        atom.reset(7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unwatch_removes_exactly_that_watcher() {
        let atom = Atom::with_value(0);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let unwatch = atom.watch(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&calls);
        atom.watch(move |_, _| {
            counter.fetch_add(10, Ordering::SeqCst);
        });

        atom.reset(1);
        unwatch.unwatch();
        atom.reset(2);
        assert_eq!(calls.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn unwatch_is_idempotent() {
        let atom = Atom::with_value(0);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let unwatch = atom.watch(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        unwatch.unwatch();
        unwatch.unwatch();
        atom.reset(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(atom.watcher_count(), 0);
    }

    #[test]
    fn unwatching_during_notification_does_not_affect_the_current_pass() {
        let atom = Atom::with_value(0);
        let calls = Arc::new(AtomicUsize::new(0));

        let unwatch_slot: Arc<Mutex<Option<Unwatch>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&unwatch_slot);
        atom.watch(move |_, _| {
            // Removes the *second* watcher mid-pass.
            if let Some(unwatch) = slot.lock().unwrap().as_ref() {
                unwatch.unwatch();
            }
        });
        let counter = Arc::clone(&calls);
        let unwatch = atom.watch(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        *unwatch_slot.lock().unwrap() = Some(unwatch);

        // The second watcher still observes this reset, but not later ones.
        atom.reset(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        atom.reset(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_clears_value_and_watchers() {
        let atom = Atom::with_value(5);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        atom.watch(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        atom.dispose();
        assert_eq!(atom.deref(), None);
        assert_eq!(atom.watcher_count(), 0);

        // Mutators are no-ops after disposal, and new watches are ignored.
        atom.reset(6);
        atom.swap(|_| 7);
        assert_eq!(atom.deref(), None);
        let counter = Arc::clone(&calls);
        atom.watch(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(atom.watcher_count(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clones_share_the_same_cell() {
        let atom = Atom::with_value(1);
        let other = atom.clone();
        other.reset(9);
        assert_eq!(atom.deref(), Some(9));
    }
}
