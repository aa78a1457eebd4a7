//! Dispatch targets: where subscriber callbacks run.
//!
//! A callback either runs inline on the thread that produced the value
//! ([`DispatchTarget::Immediate`]) or is marshaled onto a [`TargetQueue`].
//! Queues must run jobs in submission order, which is what keeps delivery
//! to a single subscriber FIFO.

use crate::error::{Result, StoreError};
use crossbeam_channel::{unbounded, Sender};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A unit of work marshaled onto a target queue.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that runs jobs one after another, in order.
pub trait TargetQueue: Send + Sync + 'static {
    fn execute(&self, job: Job);
}

/// Where a subscriber's callback is invoked.
#[derive(Clone, Default)]
pub enum DispatchTarget {
    /// On the thread that commits or emits.
    #[default]
    Immediate,
    /// Marshaled onto a queue.
    Queue(Arc<dyn TargetQueue>),
}

impl DispatchTarget {
    pub fn queue(queue: impl TargetQueue) -> Self {
        DispatchTarget::Queue(Arc::new(queue))
    }

    pub(crate) fn dispatch(&self, job: Job) {
        match self {
            DispatchTarget::Immediate => job(),
            DispatchTarget::Queue(queue) => queue.execute(job),
        }
    }
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Immediate => write!(f, "Immediate"),
            DispatchTarget::Queue(_) => write!(f, "Queue"),
        }
    }
}

impl From<SerialQueue> for DispatchTarget {
    fn from(queue: SerialQueue) -> Self {
        DispatchTarget::queue(queue)
    }
}

impl From<Arc<SerialQueue>> for DispatchTarget {
    fn from(queue: Arc<SerialQueue>) -> Self {
        DispatchTarget::Queue(queue)
    }
}

/// A queue backed by one dedicated worker thread.
///
/// Jobs accumulate in an unbounded channel; nothing is dropped while the
/// worker is busy. Dropping the queue closes the channel and waits for
/// the worker to finish what was already queued.
pub struct SerialQueue {
    name: String,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl SerialQueue {
    /// Spawn the worker thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Job>();

        let worker = thread::Builder::new().name(name.clone()).spawn(move || {
            for job in receiver.iter() {
                job();
            }
        })?;

        tracing::debug!(queue = %name, "serial queue started");

        Ok(Self {
            name,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job, failing if the worker has gone away.
    pub fn try_execute(&self, job: Job) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| StoreError::QueueClosed(self.name.clone()))?;
        sender
            .send(job)
            .map_err(|_| StoreError::QueueClosed(self.name.clone()))
    }
}

impl TargetQueue for SerialQueue {
    fn execute(&self, job: Job) {
        if let Err(e) = self.try_execute(job) {
            tracing::warn!(queue = %self.name, error = %e, "dropping job");
        }
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            // Dropped from its own worker (last handle released inside a job).
            if worker.thread().id() == thread::current().id() {
                return;
            }
            let _ = worker.join();
        }
        tracing::debug!(queue = %self.name, "serial queue stopped");
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue").field("name", &self.name).finish()
    }
}
