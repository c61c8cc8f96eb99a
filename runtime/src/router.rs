//! Routing of commands to partitions.
//!
//! Messages and instance subscriptions live on the partition derived from
//! their correlation key; process instances live on the partition encoded in
//! their key. [`PartitionRouter`] is the cross-partition transport handed to
//! every partition as its [`SubscriptionCommandSender`].

use crate::partition::PartitionRequest;
use correlation_core::PartitionId;
use correlation_core::processing::Command;
use correlation_core::record::{MessageSubscriptionRecord, ProcessMessageSubscriptionRecord};
use correlation_core::sender::SubscriptionCommandSender;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Partition owning messages and subscriptions with this correlation key.
///
/// 31-multiplier hash over the UTF-8 bytes (as signed bytes), remainder by
/// the partition count, first partition is 1. Stable across releases: a change
/// moves existing subscriptions.
#[must_use]
pub fn subscription_partition(correlation_key: &str, partition_count: u16) -> PartitionId {
    let hash = correlation_key.bytes().fold(0_i32, |hash, byte| {
        #[allow(clippy::cast_possible_wrap)]
        let byte = i32::from(byte as i8);
        hash.wrapping_mul(31).wrapping_add(byte)
    });
    let count = i32::from(partition_count.max(1));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let offset = (hash % count).unsigned_abs() as u16;
    PartitionId::new(offset + 1)
}

/// Handles to every partition's command channel.
#[derive(Clone, Debug)]
pub struct PartitionRouter {
    partitions: Vec<mpsc::Sender<PartitionRequest>>,
}

impl PartitionRouter {
    /// Router over channels ordered by partition id, starting at partition 1.
    #[must_use]
    pub const fn new(partitions: Vec<mpsc::Sender<PartitionRequest>>) -> Self {
        Self { partitions }
    }

    /// Number of partitions.
    #[must_use]
    pub fn partition_count(&self) -> u16 {
        u16::try_from(self.partitions.len()).unwrap_or(u16::MAX)
    }

    /// Ids of all partitions.
    pub fn partition_ids(&self) -> impl Iterator<Item = PartitionId> + '_ {
        (1..=self.partition_count()).map(PartitionId::new)
    }

    /// Partition owning this correlation key.
    #[must_use]
    pub fn partition_for(&self, correlation_key: &str) -> PartitionId {
        subscription_partition(correlation_key, self.partition_count())
    }

    /// Command channel of a partition.
    #[must_use]
    pub fn sender(&self, partition: PartitionId) -> Option<&mpsc::Sender<PartitionRequest>> {
        usize::from(partition.get())
            .checked_sub(1)
            .and_then(|index| self.partitions.get(index))
    }

    /// Enqueue a command without waiting for capacity or a reply.
    fn try_route(&self, partition: PartitionId, command: Command) -> bool {
        let Some(sender) = self.sender(partition) else {
            tracing::warn!(%partition, "No route to partition");
            return false;
        };
        let intent = command.intent();
        match sender.try_send(PartitionRequest::Command {
            command,
            reply: None,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(%partition, %intent, "Partition command channel full");
                false
            },
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(%partition, %intent, "Partition command channel closed");
                false
            },
        }
    }
}

impl SubscriptionCommandSender for PartitionRouter {
    fn correlate_process_message_subscription(&self, command: ProcessMessageSubscriptionRecord) -> bool {
        let partition = command.process_instance_key.partition_id();
        self.try_route(partition, Command::CorrelateProcessSubscription(command))
    }

    fn correlate_message_subscription(&self, command: MessageSubscriptionRecord) -> bool {
        let partition = self.partition_for(&command.correlation_key);
        self.try_route(partition, Command::CorrelateSubscription(command))
    }
}
