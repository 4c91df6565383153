//! Execution contexts for listener callbacks.
//!
//! Reads and writes always run on the Tokio runtime that opened the
//! connection. Where callbacks run is chosen by the caller through a
//! `CallbackExecutor`.

use std::fmt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

/// A unit of callback work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs callback jobs on some execution context.
///
/// Implementations must run the jobs they accept in submission order.
pub trait CallbackExecutor: Send + Sync + fmt::Debug {
    fn execute(&self, job: Job);
}

/// Runs each job immediately on the submitting task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn execute(&self, job: Job) {
        job()
    }
}

/// Submitting side of a FIFO callback queue.
#[derive(Debug, Clone)]
pub struct CallbackQueue {
    tx: mpsc::UnboundedSender<Job>,
}

/// Draining side of a callback queue, owned by the thread or task that should
/// run the callbacks (typically the application's main loop).
pub struct CallbackLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

/// Create a connected queue / loop pair.
pub fn callback_queue() -> (CallbackQueue, CallbackLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CallbackQueue { tx }, CallbackLoop { rx })
}

impl CallbackQueue {
    /// Create a queue whose loop runs as a single task on `handle`.
    pub fn spawn_on(handle: &Handle) -> Self {
        let (queue, callbacks) = callback_queue();
        handle.spawn(callbacks.run());
        queue
    }
}

impl CallbackExecutor for CallbackQueue {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            debug!("callback loop is gone, dropping dispatch");
        }
    }
}

impl CallbackLoop {
    /// Wait for the next job and run it. Returns `false` once every queue
    /// handle has been dropped and the backlog is empty.
    pub async fn turn(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run jobs until every queue handle is dropped.
    pub async fn run(mut self) {
        while self.turn().await {}
    }

    /// Run whatever is queued right now without waiting. Returns the number
    /// of jobs executed.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Run jobs on a plain thread until every queue handle is dropped.
    ///
    /// Must not be called from inside an async context.
    pub fn run_blocking(mut self) {
        while let Some(job) = self.rx.blocking_recv() {
            job();
        }
    }
}

impl fmt::Debug for CallbackLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackLoop").finish_non_exhaustive()
    }
}
