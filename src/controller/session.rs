//! Shared overlay session
//!
//! [`StreamSession`] bundles everything both input paths mutate: the canonical
//! button store, the note engine and the normalizer snapshots. It lives behind
//! one `Mutex` ([`SharedSession`]); every transition, reconciliation and reset
//! happens while that lock is held, so a press is never observed without its note.

use crate::controller::detector::DeviceProfile;
use crate::controller::device::{DeviceBackend, DeviceError, DeviceId, RawInputEvent, RawSnapshot};
use crate::controller::mapping::LogicalButton;
use crate::controller::normalizer::{InputNormalizer, InputPath, NormalizerSettings, Transition};
use crate::controller::store::ButtonStateStore;
use crate::notes::{LaneLayout, NoteEngine, NoteSettings};
use chrono::{DateTime, Duration, Local};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub type SharedSession = Arc<Mutex<StreamSession>>;
pub type SharedBackend = Arc<Mutex<Box<dyn DeviceBackend>>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Could not acquire lock after maximum retry attempts")]
    LockTimeout,
}

/// Bounded `try_lock` on a `std::sync::Mutex`
///
/// Retries 5 times with 10ms pauses and yields `SessionError::LockTimeout`
/// afterwards. A poisoned lock is recovered and handed to `$recover` before
/// the guard is returned.
#[macro_export]
macro_rules! try_lock {
    ($mutex:expr, $recover:expr) => {{
        let mut attempts = 0;
        const MAX_ATTEMPTS: usize = 5;

        loop {
            match $mutex.try_lock() {
                Ok(guard) => break Ok(guard),
                Err(std::sync::TryLockError::Poisoned(poisoned)) => {
                    tracing::error!("Lock poisoned by a panicking holder, recovering");
                    let mut guard = poisoned.into_inner();
                    $recover(&mut *guard);
                    $mutex.clear_poison();
                    break Ok(guard);
                }
                Err(std::sync::TryLockError::WouldBlock) => {
                    attempts += 1;
                    tracing::warn!("Lock blocked (attempt {}/{})", attempts, MAX_ATTEMPTS);

                    if attempts >= MAX_ATTEMPTS {
                        break Err($crate::controller::session::SessionError::LockTimeout);
                    }

                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            }
        }
    }};
}

/// Locks the session; a poisoned session is emergency-reset before use
pub fn lock_session(session: &SharedSession) -> Result<MutexGuard<'_, StreamSession>, SessionError> {
    try_lock!(session, |session: &mut StreamSession| {
        session.emergency_reset("poisoned session lock")
    })
}

/// Boxes `backend` for sharing between the foreground pump and the poller
pub fn share_backend(backend: impl DeviceBackend + 'static) -> SharedBackend {
    let backend: Box<dyn DeviceBackend> = Box::new(backend);
    Arc::new(Mutex::new(backend))
}

pub fn lock_backend(
    backend: &SharedBackend,
) -> Result<MutexGuard<'_, Box<dyn DeviceBackend>>, SessionError> {
    try_lock!(backend, |_: &mut Box<dyn DeviceBackend>| {})
}

/// Counters shown in the overlay footer and logged on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub notes_spawned: u64,
    pub reconcile_releases: u64,
    pub emergency_resets: u64,
}

pub struct StreamSession {
    store: ButtonStateStore,
    notes: NoteEngine,
    normalizer: InputNormalizer,
    profile: Option<DeviceProfile>,
    layout: LaneLayout,
    stats: SessionStats,
}

impl StreamSession {
    pub fn new(normalizer: NormalizerSettings, notes: NoteSettings, layout: LaneLayout) -> Self {
        Self {
            store: ButtonStateStore::new(),
            notes: NoteEngine::new(notes),
            normalizer: InputNormalizer::new(normalizer),
            profile: None,
            layout,
            stats: SessionStats::default(),
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Canonical press; spawns the note on the false -> true edge only
    pub fn press(&mut self, button: LogicalButton, now: DateTime<Local>) -> bool {
        if !self.store.press(button) {
            debug!("Ignoring duplicate press of {}", button);
            return false;
        }
        debug!("Button {} pressed", button);
        if self.notes.start(button, self.layout, now) {
            self.stats.notes_spawned += 1;
        }
        true
    }

    /// Canonical release; freezes the growing note on the true -> false edge only
    pub fn release(&mut self, button: LogicalButton, now: DateTime<Local>) -> bool {
        if !self.store.release(button) {
            debug!("Ignoring release of idle {}", button);
            return false;
        }
        debug!("Button {} released", button);
        self.notes.finish(button, now);
        true
    }

    /// Applies normalizer output from `path`; returns how many transitions changed state
    pub fn apply(
        &mut self,
        path: InputPath,
        transitions: &[Transition],
        now: DateTime<Local>,
    ) -> usize {
        let mut changed = 0;
        for transition in transitions {
            let applied = match transition {
                Transition::Press(button) => self.press(*button, now),
                Transition::Release(button) => self.release(*button, now),
            };
            if applied {
                info!("{} path: {:?}", path, transition);
                changed += 1;
            }
        }
        changed
    }

    pub fn ingest_event(&mut self, path: InputPath, event: &RawInputEvent) -> Vec<Transition> {
        let Some(profile) = self.profile.as_ref() else {
            return Vec::new();
        };
        let transitions = self.normalizer.on_event(path, profile, event);
        self.apply(path, &transitions, event.timestamp);
        transitions
    }

    pub fn ingest_snapshot(&mut self, path: InputPath, snapshot: &RawSnapshot) -> Vec<Transition> {
        let Some(profile) = self.profile.as_ref() else {
            return Vec::new();
        };
        let transitions = self.normalizer.on_snapshot(path, profile, snapshot);
        self.apply(path, &transitions, snapshot.timestamp);
        transitions
    }

    /// Lets `path` adopt `snapshot` as its last-known raw state
    pub fn seed(&mut self, path: InputPath, snapshot: &RawSnapshot) {
        if let Some(profile) = self.profile.as_ref() {
            self.normalizer.seed(path, profile, snapshot);
        }
    }

    /// Releases canonical presses whose physical sources all read as released
    ///
    /// Both path snapshots adopt the read afterwards, so the next physical
    /// press of a released button registers again. A failed read means the
    /// session can no longer be trusted and triggers an emergency reset.
    /// Returns the buttons that were force-released.
    pub fn reconcile(
        &mut self,
        snapshot: Result<RawSnapshot, DeviceError>,
        now: DateTime<Local>,
    ) -> Vec<LogicalButton> {
        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Reconciliation read failed: {}", e);
                self.emergency_reset("reconciliation read failed");
                return Vec::new();
            }
        };
        let Some(profile) = self.profile.as_ref() else {
            return Vec::new();
        };

        let stuck: Vec<LogicalButton> = self
            .store
            .pressed()
            .into_iter()
            .filter(|button| {
                self.normalizer.physically_held(profile, *button, &snapshot) == Some(false)
            })
            .collect();

        for button in &stuck {
            warn!("Releasing stuck button {}", button);
            self.release(*button, now);
            self.stats.reconcile_releases += 1;
        }

        // both paths still remember the lost press; adopt the physical state
        // so the next real press is an edge again
        if !stuck.is_empty() {
            if let Some(profile) = self.profile.as_ref() {
                for path in [InputPath::Foreground, InputPath::Background] {
                    self.normalizer.seed(path, profile, &snapshot);
                }
            }
        }
        stuck
    }

    /// Drops all canonical state, notes and raw snapshots
    pub fn emergency_reset(&mut self, reason: &str) {
        warn!(
            "Emergency reset ({}): clearing {} pressed buttons and {} notes",
            reason,
            self.store.pressed().len(),
            self.notes.notes().len()
        );
        self.store.clear();
        self.notes.clear();
        self.normalizer.reset();
        self.stats.emergency_resets += 1;
    }

    /// Makes `profile` the active device, discarding state of the previous one
    pub fn select_device(&mut self, profile: Option<DeviceProfile>) {
        match &profile {
            Some(profile) => info!(
                "Active device is now {} '{}' ({})",
                profile.id, profile.name, profile.family
            ),
            None => warn!("No active device"),
        }
        self.store.clear();
        self.notes.clear();
        self.normalizer.reset();
        self.profile = profile;
    }

    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.profile.as_ref()
    }

    pub fn active_device(&self) -> Option<DeviceId> {
        self.profile.as_ref().map(|profile| profile.id)
    }

    pub fn layout(&self) -> LaneLayout {
        self.layout
    }

    /// New notes use `layout`; notes already on screen keep their geometry
    pub fn set_layout(&mut self, layout: LaneLayout) {
        if layout != self.layout {
            debug!(
                "Lane layout changed to {}x{}",
                layout.lane_width, layout.lane_height
            );
            self.layout = layout;
        }
    }

    /// Moves notes to `now`; returns the number purged
    pub fn advance(&mut self, now: DateTime<Local>) -> usize {
        self.notes.advance(now)
    }

    pub fn store(&self) -> &ButtonStateStore {
        &self.store
    }

    pub fn notes(&self) -> &NoteEngine {
        &self.notes
    }

    pub fn normalizer(&self) -> &InputNormalizer {
        &self.normalizer
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new(
            NormalizerSettings::default(),
            NoteSettings::default(),
            LaneLayout::default(),
        )
    }
}

/// Wall-clock cadence for state validation
#[derive(Debug, Clone)]
pub struct ReconcileTimer {
    interval: Duration,
    last: Option<DateTime<Local>>,
}

impl ReconcileTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True once per elapsed interval; the first call only arms the timer
    pub fn due(&mut self, now: DateTime<Local>) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now - last >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

impl Default for ReconcileTimer {
    fn default() -> Self {
        Self::new(Duration::milliseconds(2000))
    }
}
