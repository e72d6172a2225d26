//! PollScheduler: fixed-interval polling for one target
//!
//! One tokio task per target. Cycles run strictly one after another, so a
//! target never has two fetches in flight. The first cycle runs as soon as
//! the task starts; missed ticks are skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::donut::DonutClient;
use crate::models::{Credentials, FetchOutcome, PollPhase, PollState};

/// Handle to a target's poll loop. The state channel outlives restarts of
/// the loop, so subscribers keep receiving updates and the last snapshot
/// survives.
pub struct PollHandle {
    client: Arc<DonutClient>,
    credentials: Credentials,
    interval: Duration,
    state: Arc<watch::Sender<PollState>>,
    refresh: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PollHandle {
    pub fn spawn(client: Arc<DonutClient>, credentials: Credentials, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollState::new(interval));
        let (shutdown, _) = watch::channel(false);

        let mut handle = Self {
            client,
            credentials,
            interval,
            state: Arc::new(state),
            refresh: Arc::new(Notify::new()),
            shutdown,
            task: Mutex::new(None),
        };
        let task = handle.start_loop();
        *handle.task.get_mut() = Some(task);
        handle
    }

    fn start_loop(&self) -> JoinHandle<()> {
        let poller = PollLoop {
            client: self.client.clone(),
            credentials: self.credentials.clone(),
            interval: self.interval,
            state: self.state.clone(),
            refresh: self.refresh.clone(),
            shutdown: self.shutdown.subscribe(),
        };
        tokio::spawn(poller.run())
    }

    /// Latest state
    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Ask for a cycle now. Coalesces with a cycle already running.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Cancel any in-flight fetch and wait for the loop to exit
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("[Poller] Poll task ended abnormally: {}", e);
            }
        }
    }

    /// Stop the loop and start a new one on the same state. The snapshot,
    /// counters and subscribers carry over; the first new cycle is immediate.
    pub async fn restart(&self) {
        let mut task = self.task.lock().await;
        self.shutdown.send_replace(true);
        if let Some(old) = task.take() {
            if let Err(e) = old.await {
                tracing::error!("[Poller] Poll task ended abnormally: {}", e);
            }
        }

        self.shutdown.send_replace(false);
        self.state.send_modify(|s| s.phase = PollPhase::Idle);
        *task = Some(self.start_loop());
    }

    pub fn is_stopped(&self) -> bool {
        self.state.borrow().phase == PollPhase::Stopped
    }
}

struct PollLoop {
    client: Arc<DonutClient>,
    credentials: Credentials,
    interval: Duration,
    state: Arc<watch::Sender<PollState>>,
    refresh: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
}

impl PollLoop {
    async fn run(mut self) {
        let username = self.credentials.username().to_string();
        tracing::info!(
            "[Poller] Starting poll loop for {} (interval: {}s)",
            username,
            self.interval.as_secs()
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.refresh.notified() => {
                    tracing::debug!("[Poller] Manual refresh for {}", username);
                    ticker.reset();
                }
                _ = self.shutdown.changed() => break,
            }

            if *self.shutdown.borrow() {
                break;
            }

            self.state.send_modify(|s| s.phase = PollPhase::Polling);

            let outcome = tokio::select! {
                outcome = self.client.fetch(&self.credentials) => outcome,
                _ = self.shutdown.changed() => {
                    tracing::info!("[Poller] Cancelled in-flight fetch for {}", username);
                    break;
                }
            };

            match &outcome {
                FetchOutcome::Snapshot { failed, .. } if !failed.is_empty() => {
                    tracing::info!(
                        "[Poller] {} updated with partial data ({} endpoint(s) failed)",
                        username,
                        failed.len()
                    );
                }
                FetchOutcome::Snapshot { .. } => {
                    tracing::debug!("[Poller] {} updated", username);
                }
                FetchOutcome::Failure { message, .. } => {
                    tracing::warn!(
                        "[Poller] Update failed for {}, keeping last data: {}",
                        username,
                        message
                    );
                }
            }

            self.state.send_modify(|s| s.apply(outcome, Utc::now()));
        }

        self.state.send_modify(|s| s.phase = PollPhase::Stopped);
        tracing::info!("[Poller] Stopped poll loop for {}", username);
    }
}
