//! Keyed work queue driving [`Reconciler::reconcile`].
//!
//! At most one pass per object runs at a time; a key enqueued while its pass
//! is in flight is run again once that pass ends. Passes for different
//! objects run concurrently up to `max_concurrent_reconciles`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use strata_core::ObjectKey;
use strata_core::gate::DEFAULT_RETRY_INTERVAL;
use tokio::sync::{Mutex, Semaphore, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::controller::Action;
use crate::error::format_err_chain;
use crate::reconciler::Reconciler;

/// Enqueues objects for reconciliation. Cheap to clone.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<ObjectKey>,
}

impl QueueHandle {
    pub fn enqueue(&self, key: ObjectKey) {
        if self.tx.send(key).is_err() {
            tracing::debug!("queue closed, dropping key");
        }
    }

    /// Enqueue `key` once `after` has elapsed.
    pub fn enqueue_after(&self, key: ObjectKey, after: Duration) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            handle.enqueue(key);
        });
    }
}

#[derive(Default)]
struct QueueState {
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
}

pub struct WorkerRuntime {
    handle: QueueHandle,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerRuntime {
    pub fn start(reconciler: Reconciler) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = QueueHandle { tx };
        let task = tokio::spawn(run(reconciler, handle.clone(), rx, shutdown_rx));
        Self {
            handle,
            shutdown,
            task,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    /// Stop taking work and wait for in-flight passes, up to the configured
    /// shutdown timeout.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "worker runtime panicked");
        }
    }
}

/// Forward store change notifications into the queue until the store goes
/// away.
pub fn forward_changes(
    mut changes: broadcast::Receiver<ObjectKey>,
    handle: QueueHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(key) => handle.enqueue(key),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change notifications lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

async fn run(
    reconciler: Reconciler,
    handle: QueueHandle,
    mut rx: mpsc::UnboundedReceiver<ObjectKey>,
    mut shutdown: watch::Receiver<bool>,
) {
    let config = reconciler.config().clone();
    let permits = Arc::new(Semaphore::new(config.max_concurrent_reconciles));
    let state = Arc::new(Mutex::new(QueueState::default()));
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    tracing::info!(workers = config.max_concurrent_reconciles, "worker runtime started");

    loop {
        let key = tokio::select! {
            _ = shutdown.changed() => break,
            key = rx.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };

        {
            let mut queue = state.lock().await;
            if queue.in_flight.contains(&key) {
                queue.dirty.insert(key);
                continue;
            }
            queue.in_flight.insert(key.clone());
        }

        workers.retain(|w| !w.is_finished());
        workers.push(tokio::spawn(work(
            reconciler.clone(),
            handle.clone(),
            Arc::clone(&permits),
            Arc::clone(&state),
            key,
        )));
    }

    tracing::info!(in_flight = workers.len(), "worker runtime shutting down");
    permits.close();
    let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
    let drained = tokio::time::timeout(
        config.shutdown_timeout,
        futures::future::join_all(workers),
    )
    .await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "in-flight passes did not finish in time, aborting"
        );
        for abort in aborts {
            abort.abort();
        }
    }
    tracing::info!("worker runtime stopped");
}

async fn work(
    reconciler: Reconciler,
    handle: QueueHandle,
    permits: Arc<Semaphore>,
    state: Arc<Mutex<QueueState>>,
    key: ObjectKey,
) {
    let action = match permits.acquire_owned().await {
        Ok(_permit) => match reconciler.reconcile(&key).await {
            Ok(action) => Some(action),
            Err(e) => {
                tracing::error!(resource = %key, error = %format_err_chain(&e), "reconcile error");
                Some(Action::requeue_after(DEFAULT_RETRY_INTERVAL))
            }
        },
        // Shutting down.
        Err(_) => None,
    };

    let rerun = {
        let mut queue = state.lock().await;
        queue.in_flight.remove(&key);
        queue.dirty.remove(&key)
    };
    let Some(action) = action else {
        return;
    };

    if rerun || action.requeue_now {
        handle.enqueue(key);
    } else if let Some(after) = action.requeue_after {
        tracing::debug!(resource = %key, after_secs = after.as_secs(), "requeue scheduled");
        handle.enqueue_after(key, after);
    }
}
