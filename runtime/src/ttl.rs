//! Periodic expiry of buffered messages.

use crate::partition::PartitionRequest;
use correlation_core::PartitionId;
use correlation_core::processing::Command;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Enqueues `ExpireMessages` on one partition at a fixed interval.
///
/// The expiry command goes through the partition's command queue like any
/// other command, so expiry never interleaves with a command in progress.
/// Ticks are skipped while the queue is full.
#[derive(Debug)]
pub struct MessageTtlChecker {
    partition: PartitionId,
    interval: Duration,
    batch_limit: usize,
    commands: mpsc::Sender<PartitionRequest>,
}

impl MessageTtlChecker {
    /// Create a checker for one partition.
    #[must_use]
    pub const fn new(
        partition: PartitionId,
        interval: Duration,
        batch_limit: usize,
        commands: mpsc::Sender<PartitionRequest>,
    ) -> Self {
        Self {
            partition,
            interval,
            batch_limit,
            commands,
        }
    }

    /// Tick until shutdown or until the partition stops accepting commands.
    #[tracing::instrument(name = "ttl_checker", skip_all, fields(partition = %self.partition))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let request = PartitionRequest::Command {
                        command: Command::ExpireMessages { limit: self.batch_limit },
                        reply: None,
                    };
                    match self.commands.try_send(request) {
                        Ok(()) => {},
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::debug!("Partition busy, skipping expiry check");
                        },
                        Err(mpsc::error::TrySendError::Closed(_)) => break,
                    }
                },
            }
        }

        tracing::debug!("TTL checker stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueues_expiry_every_interval() {
        let (tx, mut rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let checker = MessageTtlChecker::new(PartitionId::new(1), Duration::from_millis(10), 25, tx);
        let task = tokio::spawn(checker.run(shutdown_rx));

        for _ in 0..2 {
            let request = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(
                request,
                PartitionRequest::Command {
                    command: Command::ExpireMessages { limit: 25 },
                    reply: None
                }
            ));
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_stops_when_partition_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(rx);

        MessageTtlChecker::new(PartitionId::new(1), Duration::from_millis(10), 1, tx)
            .run(shutdown_rx)
            .await;
    }
}
