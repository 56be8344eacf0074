//! Asynchronous propagation of committed writes into a read model.

use std::sync::Arc;
use std::time::Duration;

use configstore_readdb::{ProjectionEvent, ProjectionSink};
use tokio::sync::{mpsc, watch};

use crate::error::{SecretsError, SecretsResult};

const CHANNEL_CAPACITY: usize = 256;

/// Events committed together, applied to the read model as one unit.
#[derive(Debug, Clone)]
pub struct ProjectionBatch {
    /// Commit sequence number, strictly increasing from 1.
    pub sequence: u64,
    pub events: Vec<ProjectionEvent>,
}

/// Projector tunables.
#[derive(Debug, Clone)]
pub struct ProjectionOptions {
    /// Delay inserted before each batch is applied.
    pub propagation_delay: Duration,
    /// Retries after a failed apply before the projector stops.
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::ZERO,
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Sending half used by the write path.
#[derive(Debug, Clone)]
pub struct ProjectionPublisher {
    tx: mpsc::Sender<ProjectionBatch>,
}

impl ProjectionPublisher {
    /// Queues a batch for projection.
    ///
    /// # Errors
    ///
    /// Returns `Projection` if the projector has stopped.
    pub async fn publish(&self, batch: ProjectionBatch) -> SecretsResult<()> {
        let sequence = batch.sequence;
        self.tx.send(batch).await.map_err(|_| {
            SecretsError::Projection(format!("projector stopped, batch {sequence} not queued"))
        })
    }

    /// Reserves a slot for one batch.
    ///
    /// Once the permit is held, sending cannot fail, so a caller can reserve
    /// before mutating anything and send afterwards.
    ///
    /// # Errors
    ///
    /// Returns `Projection` if the projector has stopped.
    pub async fn reserve(&self) -> SecretsResult<ProjectionPermit<'_>> {
        self.tx
            .reserve()
            .await
            .map(|permit| ProjectionPermit { permit })
            .map_err(|_| SecretsError::Projection("projector stopped".into()))
    }
}

/// A reserved slot in the projection queue.
#[derive(Debug)]
pub struct ProjectionPermit<'a> {
    permit: mpsc::Permit<'a, ProjectionBatch>,
}

impl ProjectionPermit<'_> {
    pub fn send(self, batch: ProjectionBatch) {
        self.permit.send(batch);
    }
}

/// Background task applying batches in commit order.
///
/// The last applied sequence number is observable through a watch channel.
/// If a batch still fails after the configured retries the projector stops,
/// leaving the read model at the last fully applied batch, and waiters are
/// woken with an error.
#[derive(Debug, Clone)]
pub struct Projector {
    applied: watch::Receiver<u64>,
}

impl Projector {
    /// Spawns the projector onto the current Tokio runtime.
    ///
    /// The task runs until every publisher is dropped or a batch cannot be
    /// applied.
    pub fn spawn(
        sink: Arc<dyn ProjectionSink>,
        options: ProjectionOptions,
    ) -> (ProjectionPublisher, Self) {
        let (batch_tx, batch_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (applied_tx, applied_rx) = watch::channel(0);

        tokio::spawn(run(sink, options, batch_rx, applied_tx));

        (
            ProjectionPublisher { tx: batch_tx },
            Self {
                applied: applied_rx,
            },
        )
    }

    /// Sequence number of the last batch visible in the read model.
    pub fn applied_sequence(&self) -> u64 {
        *self.applied.borrow()
    }

    /// Waits until the batch with `sequence` has been applied.
    ///
    /// # Errors
    ///
    /// Returns `Projection` if the projector stops first.
    pub async fn wait_for_sequence(&self, sequence: u64) -> SecretsResult<()> {
        let mut applied = self.applied.clone();
        applied
            .wait_for(|current| *current >= sequence)
            .await
            .map(|_| ())
            .map_err(|_| {
                SecretsError::Projection(format!(
                    "projector stopped before applying batch {sequence}"
                ))
            })
    }
}

async fn run(
    sink: Arc<dyn ProjectionSink>,
    options: ProjectionOptions,
    mut batches: mpsc::Receiver<ProjectionBatch>,
    applied: watch::Sender<u64>,
) {
    while let Some(batch) = batches.recv().await {
        if !options.propagation_delay.is_zero() {
            tokio::time::sleep(options.propagation_delay).await;
        }

        if let Err(e) = apply_with_retry(sink.as_ref(), &options, &batch).await {
            tracing::error!(
                sequence = batch.sequence,
                error = %e,
                "Projection batch failed, stopping projector"
            );
            // refuse further batches before waiters learn of the stop
            batches.close();
            return;
        }

        applied.send_replace(batch.sequence);
        tracing::debug!(
            sequence = batch.sequence,
            events = batch.events.len(),
            "Projected batch"
        );
    }
    tracing::debug!("Projection channel closed");
}

async fn apply_with_retry(
    sink: &dyn ProjectionSink,
    options: &ProjectionOptions,
    batch: &ProjectionBatch,
) -> configstore_readdb::ReadDbResult<()> {
    let mut attempt = 0;
    loop {
        match sink.apply(&batch.events).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < options.max_retries => {
                attempt += 1;
                tracing::warn!(
                    sequence = batch.sequence,
                    attempt,
                    error = %e,
                    "Projection batch failed, retrying"
                );
                tokio::time::sleep(options.retry_backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}
