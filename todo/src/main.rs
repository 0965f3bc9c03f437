//! Command-line demo of the todo store.
//!
//! Adds two todos, follows one of them with a scoped subscription, toggles
//! and removes, then prints the remaining todos as JSON.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use todo::{TodoConfig, TodoStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo=debug,scoped_store_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TodoConfig::from_env();
    tracing::info!(?config, "Starting todo demo");

    let store = TodoStore::from_config(&config);
    let mut list = store.watch_list();

    let milk = store.add("Buy milk").await?;
    let dog = store.add("Walk dog").await?;
    tracing::info!(todos = store.count().await, "Todos added");

    let dog_notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&dog_notifications);
    let subscription = store
        .subscribe(dog, move |todo| {
            counter.fetch_add(1, Ordering::Relaxed);
            tracing::info!(?todo, "Walk dog changed");
        })
        .await;

    let done = store.toggle(milk).await?;
    tracing::info!(%milk, done, "Toggled Buy milk");
    tracing::info!(
        notifications = dog_notifications.load(Ordering::Relaxed),
        "Walk dog subscriber after toggling another todo"
    );

    store.remove(dog).await?;
    subscription.unsubscribe();
    tracing::info!(
        notifications = dog_notifications.load(Ordering::Relaxed),
        "Walk dog subscriber after its removal"
    );

    if let Err(error) = store.add("x").await {
        tracing::warn!(%error, "Add rejected");
    }

    if list.has_changed()? {
        let ids = list.borrow_and_update().clone();
        tracing::info!(?ids, "List membership");
    }
    tracing::info!(
        completed = store.completed_count().await,
        total = store.count().await,
        "Demo complete"
    );

    println!("{}", serde_json::to_string_pretty(&store.get_all().await)?);
    Ok(())
}
