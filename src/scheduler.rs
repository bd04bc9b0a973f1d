//! Two recurring background tasks per Manager: a buffer sweep (retry-aging
//! the outgoing buffer, rebuilding the rolling bloom) and an ephemeral sync
//! tick. Built on `tokio::spawn` + `tokio::time::sleep` racing a shutdown
//! signal, the same shape the workspace's own background pollers use rather
//! than a raw `tokio::time::interval` (so a slow tick doesn't pile up).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::event_sink::EventSink;
use crate::manager::ReliabilityManager;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shutdown {
    running: AtomicBool,
    notify: Notify,
}

/// A running pair of periodic tasks for one [`ReliabilityManager`]. Dropping
/// this without calling [`SchedulerHandle::shutdown`] aborts both tasks
/// immediately; prefer an explicit, awaited shutdown when a clean stop
/// matters.
pub struct SchedulerHandle {
    shutdown: Arc<Shutdown>,
    sweep_task: Option<JoinHandle<()>>,
    sync_task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals both tasks to stop and waits (bounded) for them to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.running.store(false, Ordering::SeqCst);
        self.shutdown.notify.notify_waiters();

        if let Some(task) = self.sweep_task.take() {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await.is_err() {
                error!("sweep task did not exit within shutdown timeout");
            }
        }
        if let Some(task) = self.sync_task.take() {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, task).await.is_err() {
                error!("sync task did not exit within shutdown timeout");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown.running.store(false, Ordering::SeqCst);
        self.shutdown.notify.notify_waiters();
        if let Some(task) = self.sweep_task.take() {
            task.abort();
        }
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
    }
}

/// Starts the sweep and sync tasks for `manager`. Neither task may outlive
/// the returned handle; dropping or shutting it down stops both.
pub fn start_periodic_tasks<S>(manager: ReliabilityManager<S>) -> SchedulerHandle
where
    S: EventSink + Send + 'static,
{
    let shutdown = Arc::new(Shutdown {
        running: AtomicBool::new(true),
        notify: Notify::new(),
    });

    let sweep_interval = manager.buffer_sweep_interval();
    let sweep_manager = manager.clone();
    let sweep_shutdown = shutdown.clone();
    let sweep_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(sweep_interval) => {
                    if !sweep_shutdown.running.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(e) = sweep_manager.sweep() {
                        error!(error = %e, "sweep tick failed, retrying next interval");
                    } else {
                        debug!("sweep tick completed");
                    }
                }
                _ = sweep_shutdown.notify.notified() => break,
            }
        }
    });

    let sync_interval = manager.sync_message_interval();
    let sync_manager = manager;
    let sync_shutdown = shutdown.clone();
    let sync_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(sync_interval) => {
                    if !sync_shutdown.running.load(Ordering::SeqCst) {
                        break;
                    }
                    sync_manager.fire_periodic_sync();
                    debug!("sync tick fired");
                }
                _ = sync_shutdown.notify.notified() => break,
            }
        }
    });

    SchedulerHandle {
        shutdown,
        sweep_task: Some(sweep_task),
        sync_task: Some(sync_task),
    }
}
