//! Background worker for periodic and on-demand maintenance.
//!
//! `BackgroundWorker<R>` drives a `BackgroundRunnable` from an mpsc channel
//! plus a periodic tick. The only runnable shipped today is
//! [`ThrottleSweeper`], which drops idle throttle buckets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::service::middleware::throttle::OperationLimiter;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Task handler executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Process a single submitted task.
    async fn run(&mut self, task: Self::Task);

    /// Called on each tick interval. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker stops. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// ThrottleSweeper
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum SweepTask {
    /// Prune now, and report the remaining bucket count.
    PruneNow { reply: Option<oneshot::Sender<usize>> },
}

/// Prunes throttle buckets that have refilled to full capacity.
pub struct ThrottleSweeper {
    limiter: Arc<OperationLimiter>,
}

impl ThrottleSweeper {
    #[must_use]
    pub fn new(limiter: Arc<OperationLimiter>) -> Self {
        Self { limiter }
    }

    fn sweep(&self) -> usize {
        let before = self.limiter.tracked_keys();
        let remaining = self.limiter.prune();
        debug!(before, remaining, "throttle buckets pruned");
        remaining
    }
}

#[async_trait]
impl BackgroundRunnable for ThrottleSweeper {
    type Task = SweepTask;

    async fn run(&mut self, task: SweepTask) {
        match task {
            SweepTask::PruneNow { reply } => {
                let remaining = self.sweep();
                if let Some(reply) = reply {
                    let _ = reply.send(remaining);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        self.sweep();
    }
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The spawned task:
/// 1. Calls `BackgroundRunnable::run()` for each submitted task
/// 2. Calls `BackgroundRunnable::on_tick()` at the configured interval
/// 3. Calls `BackgroundRunnable::shutdown()` when stopped
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the worker. The channel capacity is fixed at 64.
    ///
    /// A zero `tick_interval_ms` is clamped to one millisecond.
    pub fn start(mut runnable: R, tick_interval_ms: u64) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = Duration::from_millis(tick_interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut tick_interval = tokio::time::interval(period);
            // Skip the immediate first tick.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = tick_interval.tick() => {
                        runnable.on_tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Submit a task to the worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stop the worker, waiting for the spawned task to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
