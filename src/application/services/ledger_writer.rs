use crate::domain::entities::{Agent, Call, QueueEntry};
use crate::domain::ports::Ledger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

/// A single write-through unit of work. Commands are applied strictly in
/// submission order, which is what keeps the ledger a faithful (if slightly
/// delayed) copy of the in-memory dispatch tables.
#[derive(Debug)]
pub enum LedgerCommand {
    SaveCall(Call),
    SaveAgent(Agent),
    ReplaceQueue(Vec<QueueEntry>),
    /// Acknowledge once every previously submitted command has been applied.
    Flush(oneshot::Sender<()>),
}

/// Cheap cloneable handle the dispatcher holds. Submitting never blocks and
/// never fails call handling; a ledger outage degrades durability, not
/// dispatch.
#[derive(Clone)]
pub struct LedgerWriterHandle {
    sender: mpsc::UnboundedSender<LedgerCommand>,
}

impl LedgerWriterHandle {
    pub fn submit(&self, command: LedgerCommand) {
        if self.sender.send(command).is_err() {
            tracing::error!("Ledger writer task is gone, dropping write");
        }
    }

    /// Barrier for tests and shutdown: resolves once the writer has worked
    /// through everything submitted before this call.
    pub async fn flush(&self) {
        let (done, acked) = oneshot::channel();
        if self.sender.send(LedgerCommand::Flush(done)).is_ok() {
            let _ = acked.await;
        }
    }
}

/// Background task draining dispatcher write-through commands into the
/// ledger. Each command gets a bounded retry with short backoff; a command
/// that still fails is logged and dropped so the queue keeps moving.
pub struct LedgerWriter;

impl LedgerWriter {
    pub fn spawn(ledger: Arc<dyn Ledger>) -> LedgerWriterHandle {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            tracing::info!("Ledger writer started");
            while let Some(command) = receiver.recv().await {
                match command {
                    LedgerCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                    command => Self::apply_with_retry(ledger.as_ref(), command).await,
                }
            }
            tracing::info!("Ledger writer stopped");
        });

        LedgerWriterHandle { sender }
    }

    async fn apply_with_retry(ledger: &dyn Ledger, command: LedgerCommand) {
        for attempt in 0..=MAX_RETRIES {
            let result = match &command {
                LedgerCommand::SaveCall(call) => ledger.save_call(call).await,
                LedgerCommand::SaveAgent(agent) => ledger.save_agent(agent).await,
                LedgerCommand::ReplaceQueue(entries) => ledger.replace_queue(entries).await,
                LedgerCommand::Flush(_) => return,
            };

            match result {
                Ok(()) => return,
                Err(err) if attempt < MAX_RETRIES => {
                    let delay_ms = RETRY_DELAYS_MS[attempt as usize];
                    tracing::warn!(
                        "Ledger write failed on attempt {} ({}), retrying in {}ms",
                        attempt + 1,
                        err,
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(err) => {
                    tracing::error!(
                        "Ledger write dropped after {} attempts: {}",
                        MAX_RETRIES + 1,
                        err
                    );
                    return;
                }
            }
        }
    }
}
