//! Pull-based master/worker scheduler.
//!
//! Workers ask for work; the coordinator hands out the front of the queue
//! or tells them to stop. The coordinator owns the queue, the result set
//! and the worker table, and handles one event at a time, so none of that
//! state is shared.

use crate::aggregate::RunWindow;
use crate::collector::Collector;
use crate::error::{BatchError, Result};
use crate::evidence::EvidenceRecord;
use crate::pool::worker::{spawn_worker, Command, Event, WorkerExit, WorkerId, WorkerState};
use crate::targets::TargetList;
use chrono::Utc;
use indicatif::ProgressBar;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, info_span, warn, Instrument};

/// What to do when the last worker exits while targets are still queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollapsePolicy {
    /// Stop and aggregate whatever was collected.
    #[default]
    Finalize,
    /// Spawn a replacement and keep draining the queue.
    Respawn,
}

/// Bounded re-queueing of targets whose worker failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts per target; 0 drops a target on its first failure.
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerPolicy {
    pub collapse: CollapsePolicy,
    pub retry: RetryPolicy,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// One record per collected target, in arrival order.
    pub records: Vec<EvidenceRecord>,
    /// Targets whose worker failed and that were not retried.
    pub dropped: Vec<String>,
    /// Targets still queued when the pool collapsed.
    pub unassigned: Vec<String>,
    pub window: RunWindow,
}

/// Fans targets out to a pool of workers.
pub struct Scheduler {
    collector: Arc<dyn Collector>,
    workers: usize,
    policy: SchedulerPolicy,
    progress: Option<ProgressBar>,
}

impl Scheduler {
    pub fn new(collector: Arc<dyn Collector>, workers: usize) -> Self {
        Self {
            collector,
            workers: workers.max(1),
            policy: SchedulerPolicy::default(),
            progress: None,
        }
    }

    pub fn with_policy(mut self, policy: SchedulerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Tick `progress` once per collected or dropped target.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Process every target once and return the collected records.
    ///
    /// Fails only if `primary` is not among the targets. Worker failures
    /// are absorbed and show up as dropped targets.
    pub async fn run(&self, targets: TargetList, primary: &str) -> Result<RunOutcome> {
        if !targets.contains(primary) {
            return Err(BatchError::config(format!(
                "the primary target {primary} must be in the target list"
            )));
        }

        let started_at = Utc::now();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut coordinator = Coordinator {
            queue: targets.into_queue(),
            records: Vec::new(),
            dropped: Vec::new(),
            attempts: HashMap::new(),
            workers: BTreeMap::new(),
            next_id: 0,
            pid: std::process::id(),
            events: events_tx,
            collector: Arc::clone(&self.collector),
            policy: self.policy,
            progress: self.progress.clone(),
        };

        let span = info_span!("master");
        async {
            for _ in 0..self.workers {
                coordinator.spawn();
            }
            info!("cluster is set up with {} workers", self.workers);

            while let Some(event) = events_rx.recv().await {
                if coordinator.handle(event) == Flow::Finished {
                    break;
                }
            }
        }
        .instrument(span)
        .await;

        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        Ok(RunOutcome {
            records: coordinator.records,
            dropped: coordinator.dropped,
            unassigned: coordinator.queue.into_iter().collect(),
            window: RunWindow {
                started_at,
                finished_at: Utc::now(),
            },
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Finished,
}

struct WorkerSlot {
    commands: UnboundedSender<Command>,
    state: WorkerState,
}

struct Coordinator {
    queue: VecDeque<String>,
    records: Vec<EvidenceRecord>,
    dropped: Vec<String>,
    attempts: HashMap<String, u32>,
    workers: BTreeMap<WorkerId, WorkerSlot>,
    next_id: usize,
    pid: u32,
    events: UnboundedSender<Event>,
    collector: Arc<dyn Collector>,
    policy: SchedulerPolicy,
    progress: Option<ProgressBar>,
}

impl Coordinator {
    fn spawn(&mut self) {
        self.next_id += 1;
        let id = WorkerId {
            id: self.next_id,
            pid: self.pid,
        };
        let commands = spawn_worker(id, Arc::clone(&self.collector), self.events.clone());
        self.workers.insert(
            id,
            WorkerSlot {
                commands,
                state: WorkerState::Spawned,
            },
        );
        debug!("worker {id} spawned");
    }

    fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Ready(id) => {
                debug!("worker {id} sent message 'ready'");
                self.mark_ready(id);
                self.dispatch(id);
                Flow::Continue
            }
            Event::Result(id, record) => {
                debug!("worker {id} sent results for URL '{}'", record.target);
                self.records.push(record);
                self.tick();
                self.mark_ready(id);
                self.dispatch(id);
                Flow::Continue
            }
            Event::Exited(id, exit) => self.on_exit(id, exit),
        }
    }

    /// A result doubles as the worker's next request for work.
    fn mark_ready(&mut self, id: WorkerId) {
        if let Some(slot) = self.workers.get_mut(&id) {
            slot.state = WorkerState::Ready;
        }
    }

    /// Give `id` the next target, or tell it to stop.
    fn dispatch(&mut self, id: WorkerId) {
        let Some(slot) = self.workers.get_mut(&id) else {
            return;
        };

        match self.queue.pop_front() {
            Some(target) => {
                debug!("worker {id} gets new task for URL '{target}'");
                if slot.commands.send(Command::Assign(target.clone())).is_err() {
                    // Worker already gone; its exit event will follow.
                    self.queue.push_front(target);
                    return;
                }
                *self.attempts.entry(target.clone()).or_default() += 1;
                slot.state = WorkerState::Busy(target);
            }
            None => {
                debug!("worker {id} has no more job to do, stopping it");
                let _ = slot.commands.send(Command::Terminate);
                slot.state = WorkerState::Terminating;
            }
        }
    }

    fn on_exit(&mut self, id: WorkerId, exit: WorkerExit) -> Flow {
        debug!(
            "worker {id} exited with code {:?} and signal {:?}",
            exit.code, exit.signal
        );

        let mut requeued = false;
        if let Some(mut slot) = self.workers.remove(&id) {
            let previous = std::mem::replace(&mut slot.state, WorkerState::Exited(exit.clone()));
            if let WorkerState::Busy(target) = previous {
                requeued = self.on_failed_target(id, target, &exit);
            }
        }

        if self.workers.is_empty() {
            // A retry always gets a worker to run on, whatever the collapse policy.
            let respawn = requeued || self.policy.collapse == CollapsePolicy::Respawn;
            if !self.queue.is_empty() && respawn {
                info!("all workers exited with {} targets queued, respawning", self.queue.len());
                self.spawn();
                return Flow::Continue;
            }
            if !self.queue.is_empty() {
                warn!(
                    "all workers exited with {} targets never assigned",
                    self.queue.len()
                );
            }
            info!("all workers have finished their jobs");
            return Flow::Finished;
        }

        if !self.queue.is_empty() {
            debug!("starting a new worker");
            self.spawn();
        }
        Flow::Continue
    }

    /// Re-queue or drop the target a dead worker held. Returns whether it was re-queued.
    fn on_failed_target(&mut self, id: WorkerId, target: String, exit: &WorkerExit) -> bool {
        let attempts = self.attempts.get(&target).copied().unwrap_or(1);
        if attempts <= self.policy.retry.max_retries {
            warn!("worker {id} died on '{target}' (attempt {attempts}), re-queueing");
            self.queue.push_back(target);
            return true;
        }

        warn!(
            "worker {id} died on '{target}' (code {:?}, signal {:?}), dropping it",
            exit.code, exit.signal
        );
        self.dropped.push(target);
        self.tick();
        false
    }

    fn tick(&self) {
        if let Some(progress) = &self.progress {
            progress.inc(1);
        }
    }
}
