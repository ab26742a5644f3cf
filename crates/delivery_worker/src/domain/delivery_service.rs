use crate::domain::retry_policy::RetryPolicy;
use crate::domain::webhook::{WebhookClient, WebhookPayload};
use chrono::Utc;
use common::domain::{DeliveryTask, DomainError, DomainResult, InboxRepository, InboxStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one delivery attempt, and what the queue should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Webhook accepted the message; entry is now delivered
    Delivered,
    /// Transport failure recorded; try again after `delay`
    Retry { attempts: u32, delay: Duration },
    /// Transport failure recorded and the retry limit reached; entry is failed
    Failed { attempts: u32 },
    /// Target has no webhook; nothing changed
    Skipped,
    /// Entry is missing or no longer pending; nothing changed
    NotPending,
    /// Persistence failed around the attempt; try again after `delay`
    InternalRetry { delay: Duration },
    /// Internal retry budget exhausted; the entry stays pending for recovery
    Abandoned,
}

impl AttemptOutcome {
    /// Delay before the same task should run again, if it should
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            AttemptOutcome::Retry { delay, .. } | AttemptOutcome::InternalRetry { delay } => {
                Some(*delay)
            }
            _ => None,
        }
    }
}

/// Executes one delivery attempt and applies the state machine:
/// pending -> delivered | pending (attempts+1) | failed
pub struct DeliveryService {
    inbox_repository: Arc<dyn InboxRepository>,
    webhook_client: Arc<dyn WebhookClient>,
    retry_policy: RetryPolicy,
}

impl DeliveryService {
    pub fn new(
        inbox_repository: Arc<dyn InboxRepository>,
        webhook_client: Arc<dyn WebhookClient>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            inbox_repository,
            webhook_client,
            retry_policy,
        }
    }

    #[instrument(skip(self), fields(inbox_id = task.inbox_id, priority = ?task.priority))]
    pub async fn attempt(&self, task: DeliveryTask) -> AttemptOutcome {
        match self.try_attempt(task.inbox_id).await {
            Ok(outcome) => outcome,
            Err(e) => match self.retry_policy.internal_retry_after(task.internal_failures) {
                Some(delay) => {
                    warn!(
                        error = %e,
                        internal_failures = task.internal_failures + 1,
                        delay_secs = delay.as_secs_f64(),
                        "delivery attempt failed internally, will retry"
                    );
                    AttemptOutcome::InternalRetry { delay }
                }
                None => {
                    error!(
                        error = %e,
                        internal_failures = task.internal_failures + 1,
                        "delivery abandoned after repeated internal failures; entry left pending"
                    );
                    AttemptOutcome::Abandoned
                }
            },
        }
    }

    async fn try_attempt(&self, inbox_id: i64) -> DomainResult<AttemptOutcome> {
        let Some(ctx) = self.inbox_repository.get_delivery_context(inbox_id).await? else {
            error!("inbox entry not found");
            return Ok(AttemptOutcome::NotPending);
        };

        if ctx.entry.status.is_terminal_for_delivery() {
            debug!(status = %ctx.entry.status, "entry no longer pending");
            return Ok(AttemptOutcome::NotPending);
        }

        let url = match ctx.device.webhook_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => {
                info!(hardware_id = %ctx.device.hardware_id, "no webhook configured, skipping");
                return Ok(AttemptOutcome::Skipped);
            }
        };

        let payload = WebhookPayload::from(&ctx);
        match self.webhook_client.deliver(&url, &payload).await {
            Ok(()) => self.on_delivered(inbox_id).await,
            Err(DomainError::TransportFailure(reason)) => {
                self.on_transport_failure(inbox_id, ctx.device.retry_limit, &reason)
                    .await
            }
            Err(other) => Err(other),
        }
    }

    async fn on_delivered(&self, inbox_id: i64) -> DomainResult<AttemptOutcome> {
        match self
            .inbox_repository
            .mark_delivered(inbox_id, Utc::now())
            .await?
        {
            Some(_) => {
                info!("webhook delivered");
                Ok(AttemptOutcome::Delivered)
            }
            None => {
                debug!("entry left pending state during delivery");
                Ok(AttemptOutcome::NotPending)
            }
        }
    }

    async fn on_transport_failure(
        &self,
        inbox_id: i64,
        retry_limit: u32,
        reason: &str,
    ) -> DomainResult<AttemptOutcome> {
        let Some(entry) = self
            .inbox_repository
            .record_failed_attempt(inbox_id, retry_limit)
            .await?
        else {
            debug!("entry left pending state during delivery");
            return Ok(AttemptOutcome::NotPending);
        };

        let attempts = entry.delivery_attempts;
        if entry.status == InboxStatus::Failed {
            error!(
                attempts,
                retry_limit,
                reason,
                "{}",
                DomainError::RetryExhausted(format!("inbox entry {}", inbox_id))
            );
            return Ok(AttemptOutcome::Failed { attempts });
        }

        let delay = self.retry_policy.backoff_for(attempts);
        warn!(
            attempts,
            retry_limit,
            reason,
            delay_secs = delay.as_secs_f64(),
            "webhook delivery failed, retrying"
        );
        Ok(AttemptOutcome::Retry { attempts, delay })
    }
}
