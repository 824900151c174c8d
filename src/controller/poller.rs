use crate::controller::device::RawSnapshot;
use crate::controller::normalizer::InputPath;
use crate::controller::session::{
    lock_backend, lock_session, SessionError, SharedBackend, SharedSession,
};
use chrono::Local;
use statum::{machine, state};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// Poller settings
#[derive(Clone, Debug)]
pub struct PollerSettings {
    pub poll_rate_hz: u32,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self { poll_rate_hz: 120 }
    }
}

impl PollerSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.poll_rate_hz.clamp(1, 1000)))
    }
}

// Poller errors
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Poller task failed: {0}")]
    TaskFailed(String),

    #[error("Poller did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Result of a single poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Window has focus, the foreground owns input
    SkippedFocused,
    NoDevice,
    /// Device read failed, the tick was dropped
    ReadFailed,
    Polled { transitions: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub ticks: u64,
    pub skipped: u64,
    pub read_failures: u64,
    pub transitions: u64,
}

// Define poller states using statum's state macro
#[state]
#[derive(Debug, Clone)]
pub enum PollerState {
    Idle,
    Polling,
}

#[machine]
pub struct InputPoller<S: PollerState> {
    backend: SharedBackend,

    session: SharedSession,

    // Set by the UI while the overlay window has focus
    focus: Arc<AtomicBool>,

    settings: PollerSettings,

    stats: PollerStats,
}

impl<S: PollerState> InputPoller<S> {
    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn stats(&self) -> PollerStats {
        self.stats
    }
}

impl InputPoller<Idle> {
    pub fn create(
        backend: SharedBackend,
        session: SharedSession,
        focus: Arc<AtomicBool>,
        settings: PollerSettings,
    ) -> Self {
        debug!("Creating input poller with settings: {:?}", settings);
        Self::new(backend, session, focus, settings, PollerStats::default())
    }

    pub fn start(self) -> InputPoller<Polling> {
        info!(
            "Input poller starting at {} Hz",
            self.settings.poll_rate_hz
        );
        self.transition()
    }
}

impl InputPoller<Polling> {
    /// Reads the active device once and feeds the snapshot through the session
    ///
    /// Device read failures are logged and swallowed; the next tick retries.
    pub fn poll_once(&mut self) -> Result<PollOutcome, PollerError> {
        self.stats.ticks += 1;

        if self.focus.load(Ordering::Relaxed) {
            self.stats.skipped += 1;
            return Ok(PollOutcome::SkippedFocused);
        }

        let Some((device, caps)) = lock_session(&self.session)?
            .profile()
            .map(|profile| (profile.id, profile.caps))
        else {
            return Ok(PollOutcome::NoDevice);
        };

        let read = {
            let mut backend = lock_backend(&self.backend)?;
            backend.refresh();
            RawSnapshot::capture(&**backend, device, caps, Local::now())
        };
        let snapshot = match read {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.read_failures += 1;
                debug!("Background read of {} failed: {}", device, e);
                return Ok(PollOutcome::ReadFailed);
            }
        };

        let mut session = lock_session(&self.session)?;
        if session.active_device() != Some(device) {
            debug!("Active device changed during poll, dropping snapshot");
            return Ok(PollOutcome::NoDevice);
        }
        let transitions = session
            .ingest_snapshot(InputPath::Background, &snapshot)
            .len();
        self.stats.transitions += transitions as u64;

        Ok(PollOutcome::Polled { transitions })
    }

    pub fn stop(self) -> InputPoller<Idle> {
        info!(
            "Input poller stopping after {} ticks ({} skipped, {} read failures, {} transitions)",
            self.stats.ticks, self.stats.skipped, self.stats.read_failures, self.stats.transitions
        );
        self.transition()
    }
}

// Public interface for spawning and stopping the poller
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<InputPoller<Idle>>,
}

impl PollerHandle {
    /// Spawns the poll loop on the current tokio runtime
    pub fn spawn(poller: InputPoller<Idle>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let polling = poller.start();

        info!("Spawning input poller task");
        let task = tokio::spawn(async move { run_poller_loop(polling, token).await });

        Self { cancel, task }
    }

    /// Cancels the loop and waits at most `timeout` for it to finish
    pub async fn shutdown(self, timeout: Duration) -> Result<PollerStats, PollerError> {
        self.cancel.cancel();

        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(poller)) => {
                info!("Input poller stopped");
                Ok(poller.stats())
            }
            Ok(Err(e)) => {
                error!("Input poller task failed: {}", e);
                Err(PollerError::TaskFailed(e.to_string()))
            }
            Err(_) => {
                warn!("Input poller did not stop within {:?}", timeout);
                Err(PollerError::ShutdownTimeout(timeout))
            }
        }
    }
}

async fn run_poller_loop(
    mut poller: InputPoller<Polling>,
    cancel: CancellationToken,
) -> InputPoller<Idle> {
    let mut ticker = interval(poller.settings().period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match poller.poll_once() {
                    Ok(PollOutcome::Polled { transitions }) if transitions > 0 => {
                        debug!("Background poll produced {} transitions", transitions);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Poll tick failed: {}", e),
                }
            }
        }
    }

    poller.stop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_follows_rate() {
        let settings = PollerSettings::default();
        assert_eq!(settings.period(), Duration::from_secs_f64(1.0 / 120.0));
        let zero = PollerSettings { poll_rate_hz: 0 };
        assert_eq!(zero.period(), Duration::from_secs(1));
    }
}
