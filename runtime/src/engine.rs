//! The engine: partitions, their TTL checkers and the routing between them.
//!
//! # Example
//!
//! ```
//! use correlation_core::record::MessageCorrelationRecord;
//! use correlation_runtime::{Engine, EngineConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::start(EngineConfig::default().with_partition_count(2))?;
//!
//! let result = engine
//!     .correlate(MessageCorrelationRecord::new("orderPlaced", "order-42"))
//!     .await?;
//! assert_eq!(result.events.len(), 3);
//!
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::log::InMemoryEventLog;
use crate::partition::{Partition, PartitionRequest};
use crate::router::PartitionRouter;
use crate::ttl::MessageTtlChecker;
use correlation_core::PartitionId;
use correlation_core::environment::{Clock, Environment, SystemClock};
use correlation_core::key::PartitionKeyGenerator;
use correlation_core::sender::SubscriptionCommandSender;
use correlation_core::processing::{Command, ProcessingResult};
use correlation_core::record::{
    MessageCorrelationRecord, MessageRecord, MessageStartEventSubscriptionRecord,
    MessageSubscriptionRecord,
};
use correlation_core::state::store::Snapshot;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// A running set of partitions.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    router: Arc<PartitionRouter>,
    log: InMemoryEventLog,
    shutdown: watch::Sender<bool>,
    partitions: Vec<(PartitionId, JoinHandle<Result<(), EngineError>>)>,
    ttl_checkers: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Start every partition on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn start(config: EngineConfig) -> Result<Self, EngineError> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Start with a custom clock shared by all partitions.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn start_with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        config.validate()?;

        let (senders, receivers): (Vec<_>, Vec<_>) = (0..config.partition_count)
            .map(|_| mpsc::channel::<PartitionRequest>(config.command_channel_capacity))
            .unzip();
        let router = Arc::new(PartitionRouter::new(senders));
        let log = InMemoryEventLog::new();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut partitions = Vec::with_capacity(receivers.len());
        let mut ttl_checkers = Vec::with_capacity(receivers.len());
        for (id, requests) in router.partition_ids().zip(receivers) {
            let env = Environment::new(
                Box::new(PartitionKeyGenerator::new(id)),
                Arc::clone(&clock),
                Arc::clone(&router) as Arc<dyn SubscriptionCommandSender>,
            );
            let partition = Partition::new(id, env, Arc::new(log.clone()));
            partitions.push((id, tokio::spawn(partition.run(requests, shutdown_rx.clone()))));

            if let Some(commands) = router.sender(id) {
                let checker = MessageTtlChecker::new(
                    id,
                    config.ttl_check_interval,
                    config.ttl_check_batch_limit,
                    commands.clone(),
                );
                ttl_checkers.push(tokio::spawn(checker.run(shutdown_rx.clone())));
            }
        }

        tracing::info!(partitions = config.partition_count, "Engine started");

        Ok(Self {
            config,
            router,
            log,
            shutdown,
            partitions,
            ttl_checkers,
        })
    }

    /// Configuration the engine was started with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Events written by all partitions.
    #[must_use]
    pub const fn log(&self) -> &InMemoryEventLog {
        &self.log
    }

    /// Partition owning messages and subscriptions with this correlation key.
    #[must_use]
    pub fn partition_for(&self, correlation_key: &str) -> PartitionId {
        self.router.partition_for(correlation_key)
    }

    /// Publish a buffered message.
    ///
    /// # Errors
    ///
    /// Returns error if the owning partition is gone or fails fatally.
    pub async fn publish(&self, message: MessageRecord) -> Result<ProcessingResult, EngineError> {
        let partition = self.partition_for(&message.correlation_key);
        self.send(partition, Command::Publish(message)).await
    }

    /// Correlate a message synchronously; the result carries the
    /// `MESSAGE_CORRELATION` response when a start event was triggered.
    ///
    /// # Errors
    ///
    /// Returns error if the owning partition is gone or fails fatally.
    pub async fn correlate(
        &self,
        correlation: MessageCorrelationRecord,
    ) -> Result<ProcessingResult, EngineError> {
        let partition = self.partition_for(&correlation.correlation_key);
        self.send(partition, Command::Correlate(correlation)).await
    }

    /// Open an instance subscription.
    ///
    /// # Errors
    ///
    /// Returns error if the owning partition is gone or fails fatally.
    pub async fn open_subscription(
        &self,
        subscription: MessageSubscriptionRecord,
    ) -> Result<ProcessingResult, EngineError> {
        let partition = self.partition_for(&subscription.correlation_key);
        self.send(partition, Command::CreateSubscription(subscription)).await
    }

    /// Close an instance subscription.
    ///
    /// # Errors
    ///
    /// Returns error if the owning partition is gone or fails fatally.
    pub async fn close_subscription(
        &self,
        subscription: MessageSubscriptionRecord,
    ) -> Result<ProcessingResult, EngineError> {
        let partition = self.partition_for(&subscription.correlation_key);
        self.send(partition, Command::DeleteSubscription(subscription)).await
    }

    /// Refuse a correlated message on behalf of the process instance.
    ///
    /// # Errors
    ///
    /// Returns error if the owning partition is gone or fails fatally.
    pub async fn reject_subscription(
        &self,
        subscription: MessageSubscriptionRecord,
    ) -> Result<ProcessingResult, EngineError> {
        let partition = self.partition_for(&subscription.correlation_key);
        self.send(partition, Command::RejectSubscription(subscription)).await
    }

    /// Register a message start event on every partition.
    ///
    /// # Errors
    ///
    /// Returns the first error of any partition.
    pub async fn open_start_event_subscription(
        &self,
        subscription: MessageStartEventSubscriptionRecord,
    ) -> Result<Vec<ProcessingResult>, EngineError> {
        self.broadcast(|| Command::CreateStartEventSubscription(subscription.clone()))
            .await
    }

    /// Unregister every message start event of a process definition on every
    /// partition.
    ///
    /// # Errors
    ///
    /// Returns the first error of any partition.
    pub async fn close_start_event_subscriptions(
        &self,
        subscription: MessageStartEventSubscriptionRecord,
    ) -> Result<Vec<ProcessingResult>, EngineError> {
        self.broadcast(|| Command::DeleteStartEventSubscriptions(subscription.clone()))
            .await
    }

    /// Committed state of one partition.
    ///
    /// # Errors
    ///
    /// Returns error if the partition is unknown or has stopped.
    pub async fn snapshot(&self, partition: PartitionId) -> Result<Snapshot, EngineError> {
        let sender = self
            .router
            .sender(partition)
            .ok_or(EngineError::UnknownPartition(partition))?;
        let (reply, snapshot) = oneshot::channel();
        sender
            .send(PartitionRequest::Snapshot { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed { partition })?;
        snapshot.await.map_err(|_| EngineError::NoReply { partition })
    }

    /// Send a command to one partition and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns error if the partition is unknown, has stopped or fails while
    /// processing the command.
    pub async fn send(
        &self,
        partition: PartitionId,
        command: Command,
    ) -> Result<ProcessingResult, EngineError> {
        let sender = self
            .router
            .sender(partition)
            .ok_or(EngineError::UnknownPartition(partition))?;
        let (reply, outcome) = oneshot::channel();
        sender
            .send(PartitionRequest::Command {
                command,
                reply: Some(reply),
            })
            .await
            .map_err(|_| EngineError::ChannelClosed { partition })?;
        outcome
            .await
            .map_err(|_| EngineError::NoReply { partition })?
    }

    async fn broadcast(
        &self,
        command: impl Fn() -> Command,
    ) -> Result<Vec<ProcessingResult>, EngineError> {
        let requests = self
            .router
            .partition_ids()
            .map(|partition| self.send(partition, command()));
        futures::future::try_join_all(requests).await
    }

    /// Stop the TTL checkers and partitions and wait for them.
    ///
    /// Commands still queued are dropped; their callers get
    /// [`EngineError::NoReply`].
    ///
    /// # Errors
    ///
    /// Returns the first failure of any partition during its lifetime.
    pub async fn shutdown(self) -> Result<(), EngineError> {
        tracing::info!("Engine shutting down");
        // Every task may already be gone; nothing left to notify then.
        let _ = self.shutdown.send(true);

        for checker in self.ttl_checkers {
            if let Err(error) = checker.await {
                tracing::warn!(%error, "TTL checker task failed");
            }
        }

        let mut first_failure = None;
        for (partition, task) in self.partitions {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(error) => Err(EngineError::PartitionFailed {
                    partition,
                    reason: error.to_string(),
                }),
            };
            if let Err(error) = outcome {
                first_failure.get_or_insert(error);
            }
        }

        tracing::info!("Engine stopped");
        first_failure.map_or(Ok(()), Err)
    }
}
