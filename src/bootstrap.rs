use crate::application::services::{Dispatcher, LedgerWriter};
use crate::config::Config;
use crate::domain::ports::{Directory, Ledger};
use crate::infrastructure::persistence::Database;
use crate::shared::events::{EventBroadcaster, LocalEventBroadcaster};
use std::sync::Arc;

/// Composition root: wires storage, write-through worker, event fan-out and
/// the dispatcher into a ready-to-embed handle. The returned dispatcher is
/// cheap to clone; one per process is the intended shape.
pub async fn build_dispatcher(config: &Config) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connection established");

    db.ensure_schema().await?;
    tracing::info!("Ledger schema ensured");

    let directory: Arc<dyn Directory> = Arc::new(db.clone());
    let ledger: Arc<dyn Ledger> = Arc::new(db.clone());

    let broadcaster: Arc<dyn EventBroadcaster> =
        Arc::new(LocalEventBroadcaster::new(config.event_channel_capacity));
    tracing::info!(
        "Event broadcaster initialized with capacity {}",
        config.event_channel_capacity
    );

    let writer = LedgerWriter::spawn(ledger.clone());
    tracing::info!("Ledger write-through worker started");

    let dispatcher = Dispatcher::new(
        directory,
        ledger,
        broadcaster,
        writer,
        config.dispatch_options(),
    );
    tracing::info!("Dispatcher ready");

    Ok(dispatcher)
}
