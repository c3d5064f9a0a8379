//! Bounded-concurrency task scheduling.
//!
//! Tasks are queued on a channel and admitted by a single dispatcher in
//! submission order. In limited mode the dispatcher waits for a semaphore
//! permit before spawning each task, so at most `limit` tasks run at once;
//! in unbounded mode every task is spawned as soon as it is queued.
//!
//! A failing or panicking task only settles itself. `await_all` waits for
//! every submitted task to settle before returning.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error};

type Job = Pin<Box<dyn Future<Output = bool> + Send + 'static>>;

/// Tally of settled tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Settled {
    /// Tasks that returned `Ok`
    pub fulfilled: usize,

    /// Tasks that returned `Err` or panicked
    pub rejected: usize,
}

impl Settled {
    pub fn total(&self) -> usize {
        self.fulfilled + self.rejected
    }

    fn record(&mut self, joined: Result<bool, JoinError>) {
        match joined {
            Ok(true) => self.fulfilled += 1,
            Ok(false) => self.rejected += 1,
            Err(e) => {
                error!(error = %e, "Task panicked");
                self.rejected += 1;
            }
        }
    }
}

/// Handle to one submitted task's outcome.
///
/// Dropping it does not cancel the task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Wait for this task to settle
    pub async fn outcome(self) -> Result<T> {
        self.rx
            .await
            .map_err(|_| anyhow!("Task ended without reporting an outcome"))?
    }
}

/// Concurrency ceiling for pipeline tasks
pub struct RateLimiter {
    limit: Option<usize>,
    queue: mpsc::UnboundedSender<Job>,
    dispatcher: JoinHandle<Settled>,
}

impl RateLimiter {
    /// At most `limit` tasks in flight (a limit of 0 is treated as 1)
    pub fn new(limit: usize) -> Self {
        Self::start(Some(limit.max(1)))
    }

    /// Rate limiting disabled: tasks start immediately
    pub fn unbounded() -> Self {
        Self::start(None)
    }

    /// Build from an optional limit, `None` meaning disabled
    pub fn from_limit(limit: Option<usize>) -> Self {
        match limit {
            Some(n) => Self::new(n),
            None => Self::unbounded(),
        }
    }

    fn start(limit: Option<usize>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let permits = limit.map(|n| Arc::new(Semaphore::new(n)));
        let dispatcher = tokio::spawn(dispatch(rx, permits));

        Self {
            limit,
            queue,
            dispatcher,
        }
    }

    /// Configured ceiling, `None` when disabled
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Queue a task. It starts once a slot frees, in submission order.
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let result = task.await;
            let ok = result.is_ok();
            let _ = tx.send(result);
            ok
        });

        // The receiver lives in the dispatcher, which only stops once
        // every sender (this limiter) is gone.
        if self.queue.send(job).is_err() {
            error!("Dispatcher stopped; task dropped");
        }

        TaskHandle { rx }
    }

    /// Wait until every submitted task has settled
    pub async fn await_all(self) -> Settled {
        drop(self.queue);
        match self.dispatcher.await {
            Ok(settled) => settled,
            Err(e) => {
                error!(error = %e, "Dispatcher failed");
                Settled::default()
            }
        }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Job>, permits: Option<Arc<Semaphore>>) -> Settled {
    let mut in_flight = JoinSet::new();
    let mut settled = Settled::default();

    loop {
        tokio::select! {
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                settled.record(joined);
            }
            next = rx.recv() => {
                let Some(job) = next else { break };

                let permit = match &permits {
                    Some(semaphore) => match semaphore.clone().acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    None => None,
                };

                in_flight.spawn(async move {
                    let ok = job.await;
                    drop(permit);
                    ok
                });
            }
        }
    }

    debug!(remaining = in_flight.len(), "Queue closed, draining");
    while let Some(joined) = in_flight.join_next().await {
        settled.record(joined);
    }

    settled
}
