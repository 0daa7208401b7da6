//! Poll scheduler: drives `EmailAdapter::poll_cycle()` on a fixed interval.
//!
//! `Stopped → Running` on `start()`, `Running → Stopped` on `stop()`.
//! The first cycle runs immediately. `stop()` cancels the wait between
//! cycles and joins the task, so an in-flight cycle always finishes and no
//! cycle starts after `stop()` returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::channels::email::EmailAdapter;
use crate::error::SchedulerError;

enum SchedulerState {
    Stopped,
    Running {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
}

/// Periodic driver for the email adapter.
pub struct PollScheduler {
    adapter: Arc<EmailAdapter>,
    interval: Duration,
    state: Mutex<SchedulerState>,
    cycles_completed: Arc<AtomicU64>,
}

impl PollScheduler {
    pub fn new(adapter: Arc<EmailAdapter>, interval: Duration) -> Self {
        Self {
            adapter,
            interval,
            state: Mutex::new(SchedulerState::Stopped),
            cycles_completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start polling. Fails if already running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.state.lock().await;
        if matches!(*state, SchedulerState::Running { .. }) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.adapter),
            self.interval,
            cancel.clone(),
            Arc::clone(&self.cycles_completed),
        ));
        *state = SchedulerState::Running { cancel, handle };

        info!(interval_secs = self.interval.as_secs(), "Email poll scheduler started");
        Ok(())
    }

    /// Stop polling and wait for the in-flight cycle. No-op when stopped.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let SchedulerState::Running { cancel, handle } =
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!(error = %e, "Email poll task panicked");
        }
        info!(
            cycles = self.cycles_completed(),
            "Email poll scheduler stopped"
        );
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, SchedulerState::Running { .. })
    }

    /// Total cycles finished since construction.
    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed.load(Ordering::SeqCst)
    }
}

async fn run_loop(
    adapter: Arc<EmailAdapter>,
    interval: Duration,
    cancel: CancellationToken,
    cycles_completed: Arc<AtomicU64>,
) {
    loop {
        // A cycle is never interrupted; cancellation is only observed between cycles.
        adapter.poll_cycle().await;
        cycles_completed.fetch_add(1, Ordering::SeqCst);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
