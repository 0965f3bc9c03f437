//! Scoped read projections over a store's state.
//!
//! A [`KeySelector`] caches the projection of a single key and is
//! invalidated only by events that touch that key. A [`CollectionView`]
//! re-projects the whole collection only when membership changes. Both are
//! registered with [`Store::observe`](crate::Store::observe) and never
//! mutate state: they are derived indexes, not a second source of truth.
//!
//! # Example
//!
//! ```ignore
//! let selector = Arc::new(KeySelector::new(project_todo));
//! store.observe(selector.clone());
//!
//! let mut rx = store.state(|s| selector.watch(s, id)).await;
//! rx.changed().await?;
//! ```

use crate::observer::Observer;
use scoped_store_core::scope::{Scope, Scoped};
use scoped_store_core::SmallVec;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Callback invoked with the new value of a key (`None` once removed)
pub type Listener<V> = Arc<dyn Fn(Option<&V>) + Send + Sync>;

/// Handle identifying a registered listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Slot<V> {
    value: watch::Sender<Option<V>>,
    listeners: Vec<(ListenerId, Listener<V>)>,
}

impl<V> Slot<V> {
    fn new(initial: Option<V>) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            value,
            listeners: Vec::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.value.receiver_count() == 0 && self.listeners.is_empty()
    }
}

/// Per-key memoized projection
///
/// Holds one cache slot per key somebody is interested in. When the store
/// reports events scoped to a key, that slot is re-projected from the new
/// state; watchers and listeners are notified only if the projected value
/// actually changed. Events for other keys never touch the slot.
///
/// Slots with no live watchers and no listeners are dropped on the next
/// invalidation of their key, on `unlisten`, or on an explicit `prune`.
pub struct KeySelector<S, K, V> {
    project: fn(&S, &K) -> Option<V>,
    slots: Mutex<HashMap<K, Slot<V>>>,
    next_listener: AtomicU64,
}

impl<S, K, V> KeySelector<S, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    /// Create a selector from a projection of one key out of the state
    #[must_use]
    pub fn new(project: fn(&S, &K) -> Option<V>) -> Self {
        Self {
            project,
            slots: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Current value for `key`
    ///
    /// Served from the cache when the key is being watched, otherwise
    /// projected directly. Either way it equals the projection of `state`.
    #[must_use]
    pub fn read(&self, state: &S, key: &K) -> Option<V> {
        let slots = self.lock();
        match slots.get(key) {
            Some(slot) => slot.value.borrow().clone(),
            None => (self.project)(state, key),
        }
    }

    /// Watch the value of `key`
    ///
    /// The receiver starts with the current value marked as seen and is
    /// marked changed each time the key's value changes.
    pub fn watch(&self, state: &S, key: K) -> watch::Receiver<Option<V>> {
        let mut slots = self.lock();
        self.slot(&mut slots, state, key).value.subscribe()
    }

    /// Register a callback for changes to `key`
    ///
    /// The callback runs after the store applied a change to this key and
    /// receives the new value. It is never called for other keys.
    pub fn listen<F>(&self, state: &S, key: K, listener: F) -> ListenerId
    where
        F: Fn(Option<&V>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut slots = self.lock();
        self.slot(&mut slots, state, key)
            .listeners
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener previously registered for `key`
    ///
    /// Returns false if no such listener exists.
    pub fn unlisten(&self, key: &K, id: ListenerId) -> bool {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return false;
        };

        let before = slot.listeners.len();
        slot.listeners.retain(|(existing, _)| *existing != id);
        let removed = slot.listeners.len() != before;

        if slot.is_idle() {
            slots.remove(key);
        }
        removed
    }

    /// Drop every slot nobody is watching or listening to
    ///
    /// Returns the number of slots dropped.
    pub fn prune(&self) -> usize {
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_idle());
        before - slots.len()
    }

    /// Number of keys currently cached
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no key is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot<'a>(
        &self,
        slots: &'a mut HashMap<K, Slot<V>>,
        state: &S,
        key: K,
    ) -> &'a mut Slot<V> {
        match slots.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let initial = (self.project)(state, entry.key());
                entry.insert(Slot::new(initial))
            },
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, A, K, V> Observer<S, A> for KeySelector<S, K, V>
where
    A: Scoped<Key = K>,
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + PartialEq + Send + Sync,
{
    fn on_change(&self, state: &S, events: &[A]) {
        let mut fired: Vec<(Listener<V>, Option<V>)> = Vec::new();

        {
            let mut slots = self.lock();
            let mut visited: SmallVec<[K; 4]> = SmallVec::new();

            let touched = events.iter().flat_map(Scoped::scopes).filter_map(|scope| match scope {
                Scope::Key(key) => Some(key),
                Scope::Collection => None,
            });

            for key in touched {
                if visited.contains(&key) {
                    continue;
                }
                visited.push(key.clone());

                let Some(slot) = slots.get_mut(&key) else {
                    continue;
                };

                let next = (self.project)(state, &key);
                let changed = slot.value.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        current.clone_from(&next);
                        true
                    }
                });
                if !changed {
                    continue;
                }

                metrics::counter!("selector.notifications").increment(1);

                if slot.is_idle() {
                    slots.remove(&key);
                    continue;
                }

                fired.extend(
                    slot.listeners
                        .iter()
                        .map(|(_, listener)| (Arc::clone(listener), next.clone())),
                );
            }
        }

        tracing::trace!(listeners = fired.len(), "Selector invalidated");

        // Listeners run without the slot lock so they may read the selector
        for (listener, value) in fired {
            listener(value.as_ref());
        }
    }
}

/// Collection-scoped projection
///
/// Re-projects the whole state only when an event touches
/// [`Scope::Collection`], i.e. when membership changes. Value-only changes
/// under a key leave it untouched.
pub struct CollectionView<S, V> {
    project: fn(&S) -> V,
    value: watch::Sender<V>,
}

impl<S, V> CollectionView<S, V> {
    /// Create a view seeded from the given state
    #[must_use]
    pub fn new(state: &S, project: fn(&S) -> V) -> Self {
        let (value, _) = watch::channel(project(state));
        Self { project, value }
    }

    /// Watch the projected collection
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<V> {
        self.value.subscribe()
    }

    /// Current projected value
    #[must_use]
    pub fn current(&self) -> V
    where
        V: Clone,
    {
        self.value.borrow().clone()
    }
}

impl<S, A, V> Observer<S, A> for CollectionView<S, V>
where
    A: Scoped,
    A::Key: PartialEq,
    V: Send + Sync,
{
    fn on_change(&self, state: &S, events: &[A]) {
        if events.iter().any(Scoped::touches_collection) {
            self.value.send_replace((self.project)(state));
            tracing::trace!("Collection view refreshed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use scoped_store_core::smallvec;
    use std::collections::BTreeMap;

    #[derive(Debug, Default)]
    struct Board {
        cells: BTreeMap<u8, char>,
    }

    #[derive(Debug)]
    enum Change {
        Placed(u8),
        Repainted(u8),
        Erased(u8),
    }

    impl Scoped for Change {
        type Key = u8;

        fn scopes(&self) -> SmallVec<[Scope<u8>; 2]> {
            match self {
                Self::Placed(k) | Self::Erased(k) => smallvec![Scope::Collection, Scope::Key(*k)],
                Self::Repainted(k) => smallvec![Scope::Key(*k)],
            }
        }
    }

    fn cell(board: &Board, key: &u8) -> Option<char> {
        board.cells.get(key).copied()
    }

    fn keys(board: &Board) -> Vec<u8> {
        board.cells.keys().copied().collect()
    }

    fn recorder() -> (Arc<Mutex<Vec<Option<char>>>>, impl Fn(Option<&char>) + Send + Sync) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |value: Option<&char>| {
            sink.lock().unwrap().push(value.copied());
        })
    }

    #[test]
    fn test_watch_notified_for_its_key_only() {
        let mut board = Board::default();
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let mut rx = selector.watch(&board, 1);

        board.cells.insert(2, 'b');
        selector.on_change(&board, &[Change::Placed(2)]);
        assert!(!rx.has_changed().unwrap());

        board.cells.insert(1, 'a');
        selector.on_change(&board, &[Change::Placed(1)]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some('a'));
    }

    #[test]
    fn test_listener_lifecycle() {
        let mut board = Board::default();
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let (calls, listener) = recorder();
        selector.listen(&board, 1, listener);

        board.cells.insert(1, 'a');
        selector.on_change(&board, &[Change::Placed(1)]);
        board.cells.insert(1, 'z');
        selector.on_change(&board, &[Change::Repainted(1)]);
        board.cells.remove(&1);
        selector.on_change(&board, &[Change::Erased(1)]);

        assert_eq!(*calls.lock().unwrap(), vec![Some('a'), Some('z'), None]);
    }

    #[test]
    fn test_other_keys_never_fire_listener() {
        let mut board = Board::default();
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let (calls, listener) = recorder();
        selector.listen(&board, 7, listener);

        board.cells.insert(1, 'a');
        selector.on_change(&board, &[Change::Placed(1)]);
        board.cells.insert(1, 'b');
        selector.on_change(&board, &[Change::Repainted(1)]);
        board.cells.remove(&1);
        selector.on_change(&board, &[Change::Erased(1)]);

        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unchanged_value_is_not_renotified() {
        let mut board = Board::default();
        board.cells.insert(1, 'a');
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let (calls, listener) = recorder();
        selector.listen(&board, 1, listener);

        selector.on_change(&board, &[Change::Repainted(1)]);

        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unlisten_stops_callbacks_and_prunes() {
        let mut board = Board::default();
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let (calls, listener) = recorder();
        let id = selector.listen(&board, 1, listener);
        assert_eq!(selector.len(), 1);

        assert!(selector.unlisten(&1, id));
        assert!(!selector.unlisten(&1, id));
        assert!(selector.is_empty());

        board.cells.insert(1, 'a');
        selector.on_change(&board, &[Change::Placed(1)]);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dropped_watchers_are_pruned() {
        let board = Board::default();
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let rx = selector.watch(&board, 1);
        let _kept = selector.watch(&board, 2);
        drop(rx);

        assert_eq!(selector.prune(), 1);
        assert_eq!(selector.len(), 1);
    }

    #[test]
    fn test_read_matches_projection() {
        let mut board = Board::default();
        let selector: KeySelector<Board, u8, char> = KeySelector::new(cell);
        let _rx = selector.watch(&board, 1);

        assert_eq!(selector.read(&board, &1), None);

        board.cells.insert(1, 'a');
        board.cells.insert(2, 'b');
        selector.on_change(&board, &[Change::Placed(1), Change::Placed(2)]);

        assert_eq!(selector.read(&board, &1), cell(&board, &1));
        assert_eq!(selector.read(&board, &2), cell(&board, &2));
    }

    #[test]
    fn test_collection_view_ignores_value_changes() {
        let mut board = Board::default();
        let view: CollectionView<Board, Vec<u8>> = CollectionView::new(&board, keys);
        let mut rx = view.watch();

        board.cells.insert(1, 'a');
        Observer::<Board, Change>::on_change(&view, &board, &[Change::Placed(1)]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![1]);

        board.cells.insert(1, 'b');
        Observer::<Board, Change>::on_change(&view, &board, &[Change::Repainted(1)]);
        assert!(!rx.has_changed().unwrap());

        board.cells.remove(&1);
        Observer::<Board, Change>::on_change(&view, &board, &[Change::Erased(1)]);
        assert!(rx.has_changed().unwrap());
        assert!(view.current().is_empty());
    }
}
