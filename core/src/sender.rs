//! Outbound channel for commands addressed to other partitions.

use crate::record::{MessageSubscriptionRecord, ProcessMessageSubscriptionRecord};

/// Delivers subscription commands to the partition that owns their target.
///
/// Every method only enqueues. `false` means the command could not be
/// enqueued right now; callers treat that as "not delivered this cycle" and
/// carry on. Redelivery belongs to the transport.
pub trait SubscriptionCommandSender: Send + Sync {
    /// Hand a correlated message to the partition of the process instance.
    fn correlate_process_message_subscription(&self, command: ProcessMessageSubscriptionRecord) -> bool;

    /// Acknowledge to the subscription partition that the process instance
    /// consumed the message.
    fn correlate_message_subscription(&self, command: MessageSubscriptionRecord) -> bool;
}

/// Sender for a standalone partition: nothing is routable, every send fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnroutableCommandSender;

impl SubscriptionCommandSender for UnroutableCommandSender {
    fn correlate_process_message_subscription(&self, command: ProcessMessageSubscriptionRecord) -> bool {
        tracing::debug!(
            process_instance_key = %command.process_instance_key,
            "No route for process message subscription command"
        );
        false
    }

    fn correlate_message_subscription(&self, _command: MessageSubscriptionRecord) -> bool {
        false
    }
}
