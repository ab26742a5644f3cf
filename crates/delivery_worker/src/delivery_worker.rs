use crate::domain::{
    DeliveryDispatcher, DeliveryQueue, DeliveryRecovery, DeliveryService, RetryPolicy,
    WebhookClient,
};
use common::domain::{DeliveryScheduler, InboxRepository};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryWorkerConfig {
    /// Concurrent webhook attempts
    pub worker_count: usize,
    /// Waiting tasks per priority lane
    pub queue_capacity: usize,
    pub recover_on_startup: bool,
    /// Sweep for pending entries missing from the queue; `None` disables it
    pub recovery_interval: Option<Duration>,
    pub retry_policy: RetryPolicy,
}

impl Default for DeliveryWorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            queue_capacity: 1024,
            recover_on_startup: true,
            recovery_interval: Some(Duration::from_secs(60)),
            retry_policy: RetryPolicy::default(),
        }
    }
}

pub struct DeliveryWorker {
    queue: DeliveryQueue,
    dispatcher: DeliveryDispatcher,
    recovery: DeliveryRecovery,
    recover_on_startup: bool,
    recovery_interval: Option<Duration>,
}

impl DeliveryWorker {
    pub fn new(
        inbox_repository: Arc<dyn InboxRepository>,
        webhook_client: Arc<dyn WebhookClient>,
        config: DeliveryWorkerConfig,
    ) -> Self {
        debug!(
            worker_count = config.worker_count,
            queue_capacity = config.queue_capacity,
            "initializing delivery worker module"
        );

        let (queue, receivers) = DeliveryQueue::bounded(config.queue_capacity);
        let service = Arc::new(DeliveryService::new(
            inbox_repository.clone(),
            webhook_client,
            config.retry_policy,
        ));
        let dispatcher =
            DeliveryDispatcher::new(receivers, queue.clone(), service, config.worker_count);
        let recovery = DeliveryRecovery::new(inbox_repository, Arc::new(queue.clone()));

        Self {
            queue,
            dispatcher,
            recovery,
            recover_on_startup: config.recover_on_startup,
            recovery_interval: config.recovery_interval,
        }
    }

    /// Handle the routing engine schedules deliveries through
    pub fn scheduler(&self) -> Arc<dyn DeliveryScheduler> {
        Arc::new(self.queue.clone())
    }

    /// The dispatcher runs until the token is cancelled. Recovery runs
    /// alongside it so a full queue never blocks recovery.
    #[allow(clippy::type_complexity)]
    pub fn into_runner_process(
        self,
    ) -> Box<
        dyn FnOnce(
                CancellationToken,
            ) -> std::pin::Pin<
                Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>,
            > + Send,
    > {
        Box::new({
            let dispatcher = self.dispatcher;
            let recovery = self.recovery;
            let recover_on_startup = self.recover_on_startup;
            let recovery_interval = self.recovery_interval;
            move |ctx| {
                Box::pin(async move {
                    let (_, result) = tokio::join!(
                        recovery.run(ctx.clone(), recover_on_startup, recovery_interval),
                        dispatcher.run(ctx)
                    );
                    result
                })
            }
        })
    }
}
