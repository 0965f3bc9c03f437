//! The todo store: canonical state plus scoped subscriptions.
//!
//! [`TodoStore`] wraps a generic [`Store`] running the [`TodoReducer`] and
//! registers two derived indexes with it: a per-id selector and a
//! collection view of the live ids. Every mutation is a [`TodoAction`]
//! sent through the store, so observers see each change exactly once and in
//! order. Ids only enter the store through [`TodoStore::add`].

use crate::config::TodoConfig;
use crate::error::TodoError;
use crate::reducer::{TodoEnvironment, TodoReducer};
use crate::types::{TodoAction, TodoId, TodoRecord, TodoState};
use scoped_store_core::environment::RandomIds;
use scoped_store_core::Events;
use scoped_store_runtime::{CollectionView, KeySelector, ListenerId, Observer, Store, StoreConfig};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Per-id projection of the todo state
pub type TodoSelector = KeySelector<TodoState, TodoId, TodoRecord>;

/// Live ids, refreshed on membership changes only
pub type TodoListView = CollectionView<TodoState, Vec<TodoId>>;

type TodoRuntime = Store<TodoState, TodoAction, TodoEnvironment, TodoReducer>;

/// Projects the record stored under `id`
fn project_todo(state: &TodoState, id: &TodoId) -> Option<TodoRecord> {
    state.get(id).cloned()
}

/// Projects the sorted set of live ids
fn project_ids(state: &TodoState) -> Vec<TodoId> {
    let mut ids = state.ids();
    ids.sort_unstable();
    ids
}

/// Handle for a callback registered with [`TodoStore::subscribe`]
///
/// The callback stays registered while the handle is alive. Dropping the
/// handle detaches it, as does [`Subscription::unsubscribe`].
#[must_use = "dropping the subscription detaches the callback immediately"]
pub struct Subscription {
    selector: Arc<TodoSelector>,
    id: TodoId,
    listener: Option<ListenerId>,
}

impl Subscription {
    /// The todo this subscription follows
    #[must_use]
    pub const fn id(&self) -> &TodoId {
        &self.id
    }

    /// Detach the callback
    ///
    /// Returns false if it was already detached.
    pub fn unsubscribe(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        self.listener
            .take()
            .is_some_and(|listener| self.selector.unlisten(&self.id, listener))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

/// Todo store
///
/// Cloning is cheap; clones share state and subscriptions.
///
/// # Example
///
/// ```ignore
/// let store = TodoStore::from_config(&TodoConfig::from_env());
///
/// let id = store.add("Buy milk").await?;
/// let subscription = store.subscribe(id, |todo| println!("{todo:?}")).await;
///
/// store.toggle(id).await?;
/// subscription.unsubscribe();
/// ```
#[derive(Clone)]
pub struct TodoStore {
    store: TodoRuntime,
    environment: TodoEnvironment,
    selector: Arc<TodoSelector>,
    list: Arc<TodoListView>,
}

impl TodoStore {
    /// Create an empty store with default configuration
    #[must_use]
    pub fn new(environment: TodoEnvironment) -> Self {
        Self::with_config(environment, &TodoConfig::default())
    }

    /// Create an empty store using random ids
    #[must_use]
    pub fn from_config(config: &TodoConfig) -> Self {
        Self::with_config(TodoEnvironment::new(Arc::new(RandomIds)), config)
    }

    /// Create an empty store with an injected environment
    #[must_use]
    pub fn with_config(environment: TodoEnvironment, config: &TodoConfig) -> Self {
        let state = TodoState::new();
        let selector = Arc::new(TodoSelector::new(project_todo));
        let list = Arc::new(TodoListView::new(&state, project_ids));

        let store = Store::with_config(
            state,
            TodoReducer::new().with_min_title_chars(config.min_title_chars),
            environment.clone(),
            StoreConfig::default().with_broadcast_capacity(config.event_capacity),
        );
        let selector_observer: Arc<dyn Observer<TodoState, TodoAction>> = selector.clone();
        let list_observer: Arc<dyn Observer<TodoState, TodoAction>> = list.clone();
        store.observe(selector_observer);
        store.observe(list_observer);

        tracing::debug!(
            min_title_chars = config.min_title_chars,
            event_capacity = config.event_capacity,
            "Todo store created"
        );

        Self {
            store,
            environment,
            selector,
            list,
        }
    }

    /// Send an action through the reducer
    ///
    /// Crate-private so that callers cannot choose ids: `AddTodo` is only
    /// built by [`add`](Self::add) from the injected generator.
    #[tracing::instrument(skip(self, action), fields(action = action.name(), id = %action.id()))]
    pub(crate) async fn send(&self, action: TodoAction) -> Result<Events<TodoAction>, TodoError> {
        let result = self.store.send(action).await;
        match &result {
            Ok(events) if events.is_empty() => tracing::debug!("No change"),
            Ok(events) => tracing::debug!(events = events.len(), "Applied"),
            Err(error) => tracing::debug!(%error, "Rejected"),
        }
        result
    }

    /// Add a todo and return its fresh id
    ///
    /// # Errors
    ///
    /// - [`TodoError::Validation`] if the title is too short
    /// - [`TodoError::DuplicateId`] if the id generator repeated a live id
    /// - [`TodoError::Removed`] if the id generator repeated a removed id
    pub async fn add(&self, title: impl Into<String>) -> Result<TodoId, TodoError> {
        let id = self.environment.next_id();
        self.send(TodoAction::AddTodo {
            id,
            title: title.into(),
        })
        .await?;
        Ok(id)
    }

    /// Remove a todo
    ///
    /// Returns false, and notifies nobody, if no todo has this id.
    ///
    /// # Errors
    ///
    /// Never fails today; the `Result` keeps the mutator signatures uniform.
    pub async fn remove(&self, id: TodoId) -> Result<bool, TodoError> {
        let events = self.send(TodoAction::RemoveTodo { id }).await?;
        Ok(!events.is_empty())
    }

    /// Flip the done flag of a todo and return its new value
    ///
    /// # Errors
    ///
    /// [`TodoError::NotFound`] if no todo has this id.
    pub async fn toggle(&self, id: TodoId) -> Result<bool, TodoError> {
        let events = self.send(TodoAction::ToggleTodo { id }).await?;
        events
            .iter()
            .find_map(|event| match event {
                TodoAction::TodoDoneChanged { done, .. } => Some(*done),
                _ => None,
            })
            .ok_or(TodoError::NotFound(id))
    }

    /// Set the done flag of a todo
    ///
    /// Returns true if the flag changed. An unchanged flag notifies nobody.
    ///
    /// # Errors
    ///
    /// [`TodoError::NotFound`] if no todo has this id.
    pub async fn set_done(&self, id: TodoId, done: bool) -> Result<bool, TodoError> {
        let events = self.send(TodoAction::SetDone { id, done }).await?;
        Ok(!events.is_empty())
    }

    /// Replay previously emitted events
    ///
    /// Commands in the input are skipped. Events already reflected in the
    /// state, or about an id that has since been removed, are accepted
    /// without notifying anyone; a removed todo never comes back. Stops at
    /// the first rejected event, leaving the earlier ones applied.
    ///
    /// Returns the number of events that changed state.
    ///
    /// # Errors
    ///
    /// The first rejection, e.g. [`TodoError::NotFound`] for a done change of
    /// an absent todo.
    pub async fn replay<I>(&self, events: I) -> Result<usize, TodoError>
    where
        I: IntoIterator<Item = TodoAction>,
    {
        let mut applied = 0;
        for event in events {
            if !event.is_event() {
                tracing::warn!(action = event.name(), "Skipping command during replay");
                continue;
            }
            applied += self.send(event).await?.len();
        }
        Ok(applied)
    }

    /// Copy of the todo with this id
    pub async fn get_one(&self, id: TodoId) -> Option<TodoRecord> {
        self.store.state(|s| s.get(&id).cloned()).await
    }

    /// Copy of every todo, in no particular order
    pub async fn get_all(&self) -> Vec<TodoRecord> {
        self.store.state(TodoState::snapshot).await
    }

    /// Number of todos
    pub async fn count(&self) -> usize {
        self.store.state(TodoState::count).await
    }

    /// Number of done todos
    pub async fn completed_count(&self) -> usize {
        self.store.state(TodoState::completed_count).await
    }

    /// Read one todo through the per-id selector
    ///
    /// Always equal to [`get_one`](Self::get_one).
    pub async fn read(&self, id: TodoId) -> Option<TodoRecord> {
        self.store.state(|s| self.selector.read(s, &id)).await
    }

    /// Watch one todo
    ///
    /// The receiver holds the current record (`None` when absent) and is
    /// marked changed only when this todo is added, changes, or is removed.
    pub async fn watch(&self, id: TodoId) -> watch::Receiver<Option<TodoRecord>> {
        self.store.state(|s| self.selector.watch(s, id)).await
    }

    /// Register a callback for one todo
    ///
    /// The callback runs synchronously after each change to this todo, with
    /// the new record or `None` once it is removed. It must not block. It
    /// stays registered until the returned handle is dropped or
    /// unsubscribed.
    pub async fn subscribe<F>(&self, id: TodoId, callback: F) -> Subscription
    where
        F: Fn(Option<&TodoRecord>) + Send + Sync + 'static,
    {
        let listener = self
            .store
            .state(|s| self.selector.listen(s, id, callback))
            .await;
        tracing::debug!(%id, "Subscribed");

        Subscription {
            selector: Arc::clone(&self.selector),
            id,
            listener: Some(listener),
        }
    }

    /// Detach a callback
    ///
    /// Same as [`Subscription::unsubscribe`].
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        subscription.unsubscribe()
    }

    /// Watch the set of live ids, sorted
    ///
    /// Marked changed on add and remove only; done changes do not affect it.
    #[must_use]
    pub fn watch_list(&self) -> watch::Receiver<Vec<TodoId>> {
        self.list.watch()
    }

    /// Stream of every event applied by this store
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<TodoAction> {
        self.store.subscribe_events()
    }

    /// Number of ids with a live watcher or callback
    #[must_use]
    pub fn watched_count(&self) -> usize {
        self.selector.prune();
        self.selector.len()
    }
}

impl std::fmt::Debug for TodoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodoStore")
            .field("watched", &self.selector.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use scoped_store_testing::mocks::{FixedId, SequentialIds};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    fn test_store() -> TodoStore {
        TodoStore::new(TodoEnvironment::new(Arc::new(SequentialIds::new())))
    }

    #[tokio::test]
    async fn add_returns_sequential_ids() {
        let store = test_store();

        let a = store.add("Buy milk").await.unwrap();
        let b = store.add("Walk dog").await.unwrap();

        assert_eq!(*a.as_uuid(), Uuid::from_u128(1));
        assert_eq!(*b.as_uuid(), Uuid::from_u128(2));
        assert_eq!(
            store.get_one(a).await,
            Some(TodoRecord::new(a, "Buy milk".to_string()))
        );
    }

    #[tokio::test]
    async fn add_rejects_short_title_and_keeps_state() {
        let store = test_store();

        let error = store.add("x").await.unwrap_err();

        assert_eq!(
            error,
            TodoError::Validation(ValidationError::TitleTooShort { min: 2, actual: 1 })
        );
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn configured_minimum_applies() {
        let env = TodoEnvironment::new(Arc::new(SequentialIds::new()));
        let store = TodoStore::with_config(env, &TodoConfig::default().with_min_title_chars(5));

        assert!(store.add("Milk").await.is_err());
        assert!(store.add("Bread").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_generated_id_is_rejected() {
        let fixed = Uuid::from_u128(42);
        let store = TodoStore::new(TodoEnvironment::new(Arc::new(FixedId(fixed))));

        store.add("Buy milk").await.unwrap();
        let error = store.add("Walk dog").await.unwrap_err();

        assert_eq!(error, TodoError::DuplicateId(TodoId::from_uuid(fixed)));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn toggle_returns_new_value() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();

        assert!(store.toggle(id).await.unwrap());
        assert!(!store.toggle(id).await.unwrap());
    }

    #[tokio::test]
    async fn remove_twice_is_noop() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();

        assert!(store.remove(id).await.unwrap());
        assert!(!store.remove(id).await.unwrap());
        assert_eq!(store.get_one(id).await, None);
    }

    #[tokio::test]
    async fn set_done_reports_change() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();

        assert!(store.set_done(id, true).await.unwrap());
        assert!(!store.set_done(id, true).await.unwrap());
        assert_eq!(store.completed_count().await, 1);
    }

    #[tokio::test]
    async fn read_matches_get_one() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();
        let _rx = store.watch(id).await;

        store.toggle(id).await.unwrap();

        assert_eq!(store.read(id).await, store.get_one(id).await);
        let missing = TodoId::from_uuid(Uuid::from_u128(99));
        assert_eq!(store.read(missing).await, None);
    }

    #[tokio::test]
    async fn subscribe_fires_for_own_id_only() {
        let store = test_store();
        let a = store.add("Buy milk").await.unwrap();
        let b = store.add("Walk dog").await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = store
            .subscribe(b, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        store.toggle(a).await.unwrap();
        store.add("Read book").await.unwrap();
        store.remove(a).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        store.toggle(b).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(subscription.unsubscribe());
        store.toggle(b).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscriber_sees_removal_as_absent() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store
            .subscribe(id, move |todo| sink.lock().unwrap().push(todo.cloned()))
            .await;

        store.remove(id).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![None]);
        assert!(store.unsubscribe(subscription));
    }

    #[tokio::test]
    async fn watch_list_ignores_done_changes() {
        let store = test_store();
        let mut list = store.watch_list();
        assert!(list.borrow_and_update().is_empty());

        let id = store.add("Buy milk").await.unwrap();
        assert!(list.has_changed().unwrap());
        assert_eq!(*list.borrow_and_update(), vec![id]);

        store.toggle(id).await.unwrap();
        assert!(!list.has_changed().unwrap());

        store.remove(id).await.unwrap();
        assert!(list.has_changed().unwrap());
        assert!(list.borrow_and_update().is_empty());
    }

    #[tokio::test]
    async fn event_stream_carries_applied_events() {
        let store = test_store();
        let mut events = store.subscribe_events();

        let id = store.add("Buy milk").await.unwrap();
        store.toggle(id).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), TodoAction::TodoAdded { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            TodoAction::TodoDoneChanged { id, done: true }
        );
    }

    #[tokio::test]
    async fn replay_rebuilds_state_and_skips_commands() {
        let source = test_store();
        let mut stream = source.subscribe_events();
        let a = source.add("Buy milk").await.unwrap();
        let b = source.add("Walk dog").await.unwrap();
        source.toggle(a).await.unwrap();
        source.remove(b).await.unwrap();

        let mut log = Vec::new();
        while let Ok(event) = stream.try_recv() {
            log.push(event);
        }
        log.push(TodoAction::ToggleTodo { id: a });

        let copy = test_store();
        assert_eq!(copy.replay(log.clone()).await.unwrap(), 4);
        assert_eq!(copy.get_all().await, source.get_all().await);

        // Everything in the log is already reflected
        assert_eq!(copy.replay(log).await.unwrap(), 0);
        assert_eq!(copy.get_all().await, source.get_all().await);
    }

    #[tokio::test]
    async fn removed_todo_never_comes_back() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _subscription = store
            .subscribe(id, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        store.remove(id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let replayed = store
            .replay([
                TodoAction::AddTodo {
                    id,
                    title: "Back again".to_string(),
                },
                TodoAction::TodoAdded {
                    record: TodoRecord::new(id, "Ghost".to_string()),
                },
                TodoAction::TodoDoneChanged { id, done: true },
            ])
            .await
            .unwrap();

        assert_eq!(replayed, 0);
        assert_eq!(store.get_one(id).await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store
                .send(TodoAction::AddTodo {
                    id,
                    title: "Back again".to_string(),
                })
                .await
                .unwrap_err(),
            TodoError::Removed(id)
        );
    }

    #[tokio::test]
    async fn generator_repeating_removed_id_is_rejected() {
        let fixed = Uuid::from_u128(7);
        let store = TodoStore::new(TodoEnvironment::new(Arc::new(FixedId(fixed))));
        let id = store.add("Buy milk").await.unwrap();
        store.remove(id).await.unwrap();

        assert_eq!(store.add("Walk dog").await.unwrap_err(), TodoError::Removed(id));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn title_whitespace_counts_toward_minimum() {
        let store = test_store();

        let id = store.add("a ").await.unwrap();

        assert_eq!(store.get_one(id).await.unwrap().title, "a ");
    }

    #[tokio::test]
    async fn dropped_subscription_is_detached() {
        let store = test_store();

        for _ in 0..100 {
            let id = store.add("Buy milk").await.unwrap();
            drop(store.subscribe(id, |_| {}).await);
            store.remove(id).await.unwrap();
        }
        assert_eq!(store.count().await, 0);
        assert_eq!(store.watched_count(), 0);

        let id = store.add("Walk dog").await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subscription = store
            .subscribe(id, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert_eq!(store.watched_count(), 1);

        drop(subscription);
        store.toggle(id).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.watched_count(), 0);
    }

    #[tokio::test]
    async fn idle_watchers_are_pruned() {
        let store = test_store();
        let id = store.add("Buy milk").await.unwrap();

        let rx = store.watch(id).await;
        assert_eq!(store.watched_count(), 1);

        drop(rx);
        assert_eq!(store.watched_count(), 0);
    }
}
