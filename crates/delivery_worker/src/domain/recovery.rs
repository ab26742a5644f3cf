use common::domain::{
    DeliveryPriority, DeliveryScheduler, DeliveryTask, DomainResult, InboxRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Hands pending webhook deliveries back to the queue. The queue lives in
/// memory, so anything in flight at shutdown, and anything routing could
/// not enqueue because a lane was full, is only recorded as a `pending` row.
pub struct DeliveryRecovery {
    inbox_repository: Arc<dyn InboxRepository>,
    scheduler: Arc<dyn DeliveryScheduler>,
}

impl DeliveryRecovery {
    pub fn new(
        inbox_repository: Arc<dyn InboxRepository>,
        scheduler: Arc<dyn DeliveryScheduler>,
    ) -> Self {
        Self {
            inbox_repository,
            scheduler,
        }
    }

    /// Returns how many entries were handed back to the queue. Stops at the
    /// first entry the queue refuses; the rest wait for the next pass.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> DomainResult<usize> {
        let pending = self.inbox_repository.list_recoverable_deliveries().await?;
        let total = pending.len();
        let mut scheduled = 0;

        for delivery in pending {
            let task = DeliveryTask::new(
                delivery.inbox_id,
                DeliveryPriority::from(delivery.message_type),
            );
            if let Err(e) = self.scheduler.schedule(task).await {
                warn!(
                    inbox_id = delivery.inbox_id,
                    remaining = total - scheduled,
                    error = %e,
                    "queue refused recovered delivery; deferring the rest"
                );
                break;
            }
            scheduled += 1;
        }

        info!(total, scheduled, "recovered pending deliveries");
        Ok(scheduled)
    }

    /// Runs until cancelled: one pass at startup when `on_startup` is set,
    /// then one pass per `interval` when an interval is given.
    pub async fn run(self, ctx: CancellationToken, on_startup: bool, interval: Option<Duration>) {
        let Some(interval) = interval else {
            if on_startup {
                tokio::select! {
                    _ = ctx.cancelled() => {}
                    _ = self.pass() => {}
                }
            }
            return;
        };

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !on_startup {
            // The first tick completes immediately
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = ticker.tick() => self.pass().await,
            }
        }
    }

    async fn pass(&self) {
        if let Err(e) = self.recover().await {
            error!(error = %e, "delivery recovery pass failed");
        }
    }
}
