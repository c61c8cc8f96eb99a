//! Partition actor.
//!
//! A partition owns its [`EngineState`] exclusively and processes one command
//! at a time: process, append the events to the log, commit. A fatal failure
//! rolls the command back, is reported to the caller and stops the partition;
//! commands never observe a half-applied predecessor.

use crate::error::EngineError;
use crate::log::EventLog;
use crate::metrics::CorrelationMetrics;
use correlation_core::environment::Environment;
use correlation_core::processing::{Command, MessageProcessors, ProcessingResult};
use correlation_core::state::EngineState;
use correlation_core::state::store::{InMemoryKeyValueStore, Snapshot};
use correlation_core::PartitionId;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};

/// Reply channel of a command.
pub type CommandReply = oneshot::Sender<Result<ProcessingResult, EngineError>>;

/// Requests accepted by a partition.
#[derive(Debug)]
pub enum PartitionRequest {
    /// Process a command; the outcome goes to `reply` when present.
    Command {
        /// Command to process.
        command: Command,
        /// Where the outcome is sent.
        reply: Option<CommandReply>,
    },
    /// Copy of the committed state.
    Snapshot {
        /// Where the snapshot is sent.
        reply: oneshot::Sender<Snapshot>,
    },
}

/// One partition: state, collaborators and log.
pub struct Partition {
    id: PartitionId,
    state: EngineState<InMemoryKeyValueStore>,
    env: Environment,
    log: Arc<dyn EventLog>,
}

impl Partition {
    /// Partition with empty state.
    #[must_use]
    pub fn new(id: PartitionId, env: Environment, log: Arc<dyn EventLog>) -> Self {
        Self {
            id,
            state: EngineState::default(),
            env,
            log,
        }
    }

    /// Partition id.
    #[must_use]
    pub const fn id(&self) -> PartitionId {
        self.id
    }

    /// Committed state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.db().snapshot()
    }

    /// Process one command to completion.
    ///
    /// # Errors
    ///
    /// Returns error if processing, the log append or the commit fails. The
    /// command's writes are rolled back and the partition must not be used
    /// for further commands.
    pub fn process(&mut self, command: Command) -> Result<ProcessingResult, EngineError> {
        let started = Instant::now();
        let intent = command.intent();

        let result = match MessageProcessors::process(command, &mut self.state, &mut self.env) {
            Ok(result) => result,
            Err(error) => {
                self.state.rollback();
                return Err(error.into());
            },
        };

        if let Err(error) = self.log.append(self.id, &result.events) {
            self.state.rollback();
            return Err(error.into());
        }
        if let Err(error) = self.state.commit() {
            self.state.rollback();
            return Err(correlation_core::ProcessingError::from(error).into());
        }

        tracing::trace!(
            %intent,
            events = result.events.len(),
            rejected = result.rejection.is_some(),
            sends = result.sends.attempted,
            "Command processed"
        );
        CorrelationMetrics::record_command(intent, &result, started.elapsed());
        Ok(result)
    }

    /// Serve requests until shutdown, until every sender is gone, or until a
    /// command fails fatally.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PartitionFailed`] after a fatal failure.
    #[tracing::instrument(name = "partition", skip_all, fields(partition = %self.id))]
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<PartitionRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        tracing::info!("Partition started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                },
                request = requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    self.handle(request)?;
                },
            }
        }

        tracing::info!("Partition stopped");
        Ok(())
    }

    fn handle(&mut self, request: PartitionRequest) -> Result<(), EngineError> {
        match request {
            PartitionRequest::Command { command, reply } => {
                let intent = command.intent();
                let outcome = self.process(command);
                let failure = outcome.as_ref().err().map(ToString::to_string);

                if let Some(reply) = reply {
                    // The caller may have stopped waiting.
                    let _ = reply.send(outcome);
                }

                if let Some(reason) = failure {
                    tracing::error!(%intent, %reason, "Fatal processing failure, stopping partition");
                    return Err(EngineError::PartitionFailed {
                        partition: self.id,
                        reason,
                    });
                }
            },
            PartitionRequest::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            },
        }
        Ok(())
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::log::{InMemoryEventLog, LogError};
    use correlation_core::environment::SystemClock;
    use correlation_core::key::PartitionKeyGenerator;
    use correlation_core::record::{MessageIntent, MessageRecord, Record};
    use correlation_core::sender::UnroutableCommandSender;
    use correlation_core::state::store::ColumnFamily;
    use std::time::Duration;

    struct BrokenLog;

    impl EventLog for BrokenLog {
        fn append(&self, _partition: PartitionId, _events: &[Record]) -> Result<u64, LogError> {
            Err(LogError::Unavailable("disk full".to_string()))
        }
    }

    fn partition(log: Arc<dyn EventLog>) -> Partition {
        let id = PartitionId::new(1);
        let env = Environment::new(
            Box::new(PartitionKeyGenerator::new(id)),
            Arc::new(SystemClock),
            Arc::new(UnroutableCommandSender),
        );
        Partition::new(id, env, log)
    }

    fn publish() -> Command {
        Command::Publish(
            MessageRecord::new("orderPlaced", "order-42").with_time_to_live(Duration::from_secs(60)),
        )
    }

    #[test]
    fn test_processed_command_is_logged_and_committed() {
        let log = InMemoryEventLog::new();
        let mut partition = partition(Arc::new(log.clone()));

        let result = partition.process(publish()).unwrap();

        assert_eq!(result.events[0].intent, MessageIntent::Published.into());
        assert_eq!(log.read(PartitionId::new(1)).unwrap().len(), result.events.len());
        assert_eq!(partition.snapshot().count(ColumnFamily::Messages), 1);
    }

    #[test]
    fn test_log_failure_rolls_back() {
        let mut partition = partition(Arc::new(BrokenLog));

        let error = partition.process(publish()).unwrap_err();

        assert!(matches!(error, EngineError::Log(LogError::Unavailable(_))));
        assert_eq!(partition.snapshot().count(ColumnFamily::Messages), 0);
        assert!(!partition.state.db().has_pending_writes());
    }

    #[tokio::test]
    async fn test_run_replies_and_stops_on_shutdown() {
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(partition(Arc::new(InMemoryEventLog::new())).run(rx, shutdown_rx));

        let (reply, outcome) = oneshot::channel();
        tx.send(PartitionRequest::Command {
            command: publish(),
            reply: Some(reply),
        })
        .await
        .unwrap();
        assert!(outcome.await.unwrap().is_ok());

        shutdown_tx.send(true).unwrap();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_after_fatal_failure() {
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(partition(Arc::new(BrokenLog)).run(rx, shutdown_rx));

        let (reply, outcome) = oneshot::channel();
        tx.send(PartitionRequest::Command {
            command: publish(),
            reply: Some(reply),
        })
        .await
        .unwrap();

        assert!(outcome.await.unwrap().is_err());
        assert!(matches!(
            task.await.unwrap(),
            Err(EngineError::PartitionFailed { .. })
        ));
    }
}
