//! Worker tasks and the messages they exchange with the coordinator.

use crate::collector::Collector;
use crate::evidence::EvidenceRecord;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, info_span, Instrument};

/// Identity of one worker.
///
/// Workers run inside the coordinating process, so `pid` is shared; `id` is
/// unique for the lifetime of a run, replacements included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId {
    pub id: usize,
    pub pid: u32,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.pid)
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl WorkerExit {
    pub fn clean() -> Self {
        Self {
            code: Some(0),
            signal: None,
        }
    }

    /// The collector failed on the assigned target.
    pub fn failed() -> Self {
        Self {
            code: Some(1),
            signal: None,
        }
    }

    /// The worker task died without returning.
    pub fn crashed(signal: impl Into<String>) -> Self {
        Self {
            code: None,
            signal: Some(signal.into()),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    Spawned,
    /// Asked for work and holds no target.
    Ready,
    Busy(String),
    /// Told to stop; its exit event is pending.
    Terminating,
    Exited(WorkerExit),
}

/// Coordinator -> worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Assign(String),
    Terminate,
}

/// Worker -> coordinator.
#[derive(Debug)]
pub enum Event {
    /// The worker started and wants a target.
    Ready(WorkerId),
    /// A target was collected; also a request for the next one.
    Result(WorkerId, EvidenceRecord),
    /// The worker is gone.
    Exited(WorkerId, WorkerExit),
}

struct Worker {
    id: WorkerId,
    collector: Arc<dyn Collector>,
    commands: UnboundedReceiver<Command>,
    events: UnboundedSender<Event>,
}

impl Worker {
    async fn run(mut self) -> WorkerExit {
        debug!("started");
        if self.events.send(Event::Ready(self.id)).is_err() {
            return WorkerExit::clean();
        }

        while let Some(command) = self.commands.recv().await {
            let target = match command {
                Command::Assign(target) => target,
                Command::Terminate => break,
            };

            debug!("start working on URL '{target}'");
            match self.collector.collect(&target).await {
                Ok(payload) => {
                    info!("got results for URL '{target}'");
                    let record = EvidenceRecord::new(target, payload);
                    if self.events.send(Event::Result(self.id, record)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("failed on '{target}': {e}");
                    return WorkerExit::failed();
                }
            }
        }

        WorkerExit::clean()
    }
}

/// Spawn a worker and its supervisor; returns the worker's command sender.
///
/// The supervisor reports [`Event::Exited`] however the worker ends,
/// panics included.
pub fn spawn_worker(
    id: WorkerId,
    collector: Arc<dyn Collector>,
    events: UnboundedSender<Event>,
) -> UnboundedSender<Command> {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let worker = Worker {
        id,
        collector,
        commands: commands_rx,
        events: events.clone(),
    };

    let span = info_span!("worker", id = id.id, pid = id.pid);
    tokio::spawn(async move {
        let exit = match tokio::spawn(worker.run().instrument(span)).await {
            Ok(exit) => exit,
            Err(e) if e.is_panic() => WorkerExit::crashed("panic"),
            Err(_) => WorkerExit::crashed("cancelled"),
        };
        let _ = events.send(Event::Exited(id, exit));
    });

    commands_tx
}
