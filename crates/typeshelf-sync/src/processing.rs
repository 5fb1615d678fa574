//! # Processing Agent
//!
//! Bounded-concurrency command processor used by storage to run installer
//! calls.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Processing Agent Flow                              │
//! │                                                                         │
//! │  enqueue(cmd) ──► ┌─────────────────────────────┐                      │
//! │                   │  FIFO queue                  │                      │
//! │                   │  [c1][c2][c3][c4][c5]        │                      │
//! │                   └──────────────┬──────────────┘                      │
//! │                                  │ drain up to N                        │
//! │                                  ▼                                      │
//! │                   ┌─────────────────────────────┐                      │
//! │                   │  batch: spawn c1..cN         │                      │
//! │                   │  join_all(batch).await       │                      │
//! │                   └──────────────┬──────────────┘                      │
//! │                                  │ loop while started && !empty         │
//! │                                  ▼                                      │
//! │                   running = false ──► Finished                          │
//! │                                                                         │
//! │  N = storage.download_parallelism (default 3)                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A single driver task owns the loop. `running` flips to true only through
//! a compare-and-swap, so two drivers never run at once.
//!
//! The agent is created inside a tokio runtime and keeps a handle to it, so
//! commands can be enqueued from any thread.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error};
use typeshelf_core::EventPublisher;

/// A queued unit of work.
pub type Command = BoxFuture<'static, ()>;

/// Start/finish notifications of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingEvent {
    Started,
    Finished,
}

struct AgentInner {
    queue: Mutex<VecDeque<Command>>,
    concurrency: usize,
    started: AtomicBool,
    running: AtomicBool,
    idle: watch::Sender<bool>,
    events: EventPublisher<ProcessingEvent>,
    runtime: Handle,
}

/// FIFO command queue drained in batches of at most `concurrency` commands.
#[derive(Clone)]
pub struct ProcessingAgent {
    inner: Arc<AgentInner>,
}

impl ProcessingAgent {
    /// Creates a started agent. A concurrency of 0 is treated as 1.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn new(concurrency: usize) -> Self {
        let (idle, _) = watch::channel(true);
        ProcessingAgent {
            inner: Arc::new(AgentInner {
                queue: Mutex::new(VecDeque::new()),
                concurrency: concurrency.max(1),
                started: AtomicBool::new(true),
                running: AtomicBool::new(false),
                idle,
                events: EventPublisher::new(),
                runtime: Handle::current(),
            }),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Start/finish notifications.
    pub fn events(&self) -> &EventPublisher<ProcessingEvent> {
        &self.inner.events
    }

    /// Appends a command and starts processing if the agent is idle.
    pub fn enqueue<F>(&self, command: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.lock().push_back(command.boxed());
        if self.inner.started.load(Ordering::SeqCst) {
            AgentInner::spawn_if_idle(&self.inner);
        }
    }

    /// Resumes processing. A no-op while already running.
    pub fn start(&self) {
        self.inner.started.store(true, Ordering::SeqCst);
        AgentInner::spawn_if_idle(&self.inner);
    }

    /// Stops after the current batch. Queued commands are kept.
    pub fn stop(&self) {
        self.inner.started.store(false, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of commands waiting for a batch.
    pub fn pending(&self) -> usize {
        self.inner.lock().len()
    }

    /// Resolves once the agent is not running.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = idle.wait_for(|idle| *idle).await;
    }
}

impl AgentInner {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Command>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_mark_running(&self) -> bool {
        if self.lock().is_empty() {
            return false;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.idle.send_replace(false);
        self.events.publish(&ProcessingEvent::Started);
        true
    }

    fn spawn_if_idle(inner: &Arc<AgentInner>) {
        if inner.try_mark_running() {
            inner.runtime.spawn(Self::drive(inner.clone()));
        }
    }

    fn next_batch(&self) -> Vec<Command> {
        if !self.started.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let mut queue = self.lock();
        let take = queue.len().min(self.concurrency);
        queue.drain(..take).collect()
    }

    async fn drive(inner: Arc<AgentInner>) {
        loop {
            let batch = inner.next_batch();
            if batch.is_empty() {
                inner.running.store(false, Ordering::SeqCst);
                inner.idle.send_replace(true);
                inner.events.publish(&ProcessingEvent::Finished);

                // Work enqueued between the drain and the flag flip.
                if inner.started.load(Ordering::SeqCst) && inner.try_mark_running() {
                    continue;
                }
                return;
            }

            debug!(size = batch.len(), "Processing command batch");
            let handles: Vec<_> = batch
                .into_iter()
                .map(|command| inner.runtime.spawn(command))
                .collect();
            for result in join_all(handles).await {
                if let Err(err) = result {
                    error!(error = %err, "Command failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for ProcessingAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingAgent")
            .field("concurrency", &self.inner.concurrency)
            .field("started", &self.is_started())
            .field("running", &self.is_running())
            .field("pending", &self.pending())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
