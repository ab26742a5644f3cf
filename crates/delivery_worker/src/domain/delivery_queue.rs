use crate::domain::delivery_service::{AttemptOutcome, DeliveryService};
use async_trait::async_trait;
use common::domain::{DeliveryPriority, DeliveryScheduler, DeliveryTask, DomainError, DomainResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sending half of the two-lane delivery queue. Cheap to clone.
///
/// An inbox id stays outstanding from the moment it is scheduled until its
/// last attempt finishes, across any backoff in between. Scheduling an id
/// that is already outstanding is a no-op, so routing and the recovery
/// sweep can never put two attempts for one entry in flight.
#[derive(Clone)]
pub struct DeliveryQueue {
    immediate_tx: mpsc::Sender<DeliveryTask>,
    best_effort_tx: mpsc::Sender<DeliveryTask>,
    outstanding: Arc<Mutex<HashSet<i64>>>,
}

/// Receiving half, owned by the dispatcher
pub struct DeliveryQueueReceivers {
    immediate_rx: mpsc::Receiver<DeliveryTask>,
    best_effort_rx: mpsc::Receiver<DeliveryTask>,
}

impl DeliveryQueue {
    /// Each lane holds up to `capacity` waiting tasks
    pub fn bounded(capacity: usize) -> (Self, DeliveryQueueReceivers) {
        let capacity = capacity.max(1);
        let (immediate_tx, immediate_rx) = mpsc::channel(capacity);
        let (best_effort_tx, best_effort_rx) = mpsc::channel(capacity);
        (
            Self {
                immediate_tx,
                best_effort_tx,
                outstanding: Arc::new(Mutex::new(HashSet::new())),
            },
            DeliveryQueueReceivers {
                immediate_rx,
                best_effort_rx,
            },
        )
    }

    fn outstanding(&self) -> std::sync::MutexGuard<'_, HashSet<i64>> {
        self.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, inbox_id: i64) {
        self.outstanding().remove(&inbox_id);
    }

    /// Never waits for room. A full lane is reported as `QueueUnavailable`
    /// and the entry stays pending for the next recovery sweep.
    fn enqueue(&self, task: DeliveryTask) -> DomainResult<()> {
        let lane = match task.priority {
            DeliveryPriority::Immediate => &self.immediate_tx,
            DeliveryPriority::BestEffort => &self.best_effort_tx,
        };
        lane.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => {
                DomainError::QueueUnavailable(format!("{:?} lane is full", task.priority))
            }
            TrySendError::Closed(_) => {
                DomainError::QueueUnavailable("delivery dispatcher stopped".to_string())
            }
        })
    }
}

#[async_trait]
impl DeliveryScheduler for DeliveryQueue {
    async fn schedule(&self, task: DeliveryTask) -> DomainResult<()> {
        if !self.outstanding().insert(task.inbox_id) {
            debug!(inbox_id = task.inbox_id, "delivery already outstanding");
            return Ok(());
        }

        self.enqueue(task).inspect_err(|_| self.release(task.inbox_id))
    }
}

/// Pulls tasks off the queue, immediate lane first, and runs up to
/// `worker_count` attempts at a time.
pub struct DeliveryDispatcher {
    receivers: DeliveryQueueReceivers,
    queue: DeliveryQueue,
    delivery_service: Arc<DeliveryService>,
    worker_count: usize,
}

impl DeliveryDispatcher {
    pub fn new(
        receivers: DeliveryQueueReceivers,
        queue: DeliveryQueue,
        delivery_service: Arc<DeliveryService>,
        worker_count: usize,
    ) -> Self {
        Self {
            receivers,
            queue,
            delivery_service,
            worker_count: worker_count.max(1),
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let DeliveryDispatcher {
            mut receivers,
            queue,
            delivery_service,
            worker_count,
        } = self;

        let permits = Arc::new(Semaphore::new(worker_count));
        let mut in_flight = JoinSet::new();
        info!(worker_count, "delivery dispatcher started");

        loop {
            let permit = tokio::select! {
                _ = ctx.cancelled() => break,
                permit = permits.clone().acquire_owned() => permit?,
            };

            let task = tokio::select! {
                biased;
                _ = ctx.cancelled() => break,
                Some(task) = receivers.immediate_rx.recv() => task,
                Some(task) = receivers.best_effort_rx.recv() => task,
                else => break,
            };

            let service = delivery_service.clone();
            let queue = queue.clone();
            let ctx = ctx.clone();
            in_flight.spawn(async move {
                let outcome = service.attempt(task).await;
                drop(permit);
                requeue_after(outcome, task, queue, ctx).await;
            });

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "delivery task panicked");
                }
            }
        }

        debug!(in_flight = in_flight.len(), "waiting for in-flight deliveries");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "delivery task panicked");
            }
        }

        info!("delivery dispatcher stopped");
        Ok(())
    }
}

/// Put the same entry back on its lane once its backoff has elapsed. The
/// attempt has already finished, so at most one attempt per entry is ever
/// outstanding. A shutdown during the wait leaves the entry pending.
async fn requeue_after(
    outcome: AttemptOutcome,
    task: DeliveryTask,
    queue: DeliveryQueue,
    ctx: CancellationToken,
) {
    let Some(delay) = outcome.retry_delay() else {
        queue.release(task.inbox_id);
        return;
    };

    let next = match outcome {
        AttemptOutcome::InternalRetry { .. } => DeliveryTask {
            internal_failures: task.internal_failures + 1,
            ..task
        },
        _ => DeliveryTask {
            internal_failures: 0,
            ..task
        },
    };

    tokio::select! {
        _ = ctx.cancelled() => {
            debug!(inbox_id = task.inbox_id, "shutdown before retry; entry left pending");
        }
        _ = tokio::time::sleep(delay) => {
            if let Err(e) = queue.enqueue(next) {
                queue.release(task.inbox_id);
                warn!(inbox_id = task.inbox_id, error = %e, "failed to requeue delivery; left for recovery");
            }
        }
    }
}
