//! Foreground input pump, driven once per frame by the UI thread
//!
//! Per call it drains the backend's event queue, applies device hot-plug,
//! and feeds input events through the session while the foreground owns
//! input. It also owns the device roster and the periodic state validation.
//!
//! Ownership of input:
//!
//! - focused window: foreground handles input events
//! - unfocused window with background polling: the poller handles input,
//!   queued input events are drained and dropped here
//! - background polling disabled: foreground always handles input
//!
//! On focus regain the foreground snapshot is re-seeded from a fresh read,
//! since the poller may have moved the canonical state in the meantime.

use crate::controller::detector::DeviceProfile;
use crate::controller::device::{
    DeviceCaps, DeviceError, DeviceId, DeviceInfo, RawEventKind, RawInputEvent, RawSnapshot,
};
use crate::controller::mapping::LogicalButton;
use crate::controller::normalizer::InputPath;
use crate::controller::session::{
    lock_backend, lock_session, ReconcileTimer, SessionError, SharedBackend, SharedSession,
};
use chrono::{DateTime, Duration, Local};
use tracing::{debug, info, warn};

/// What a single [`ForegroundPump::pump`] call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub events: usize,
    pub transitions: usize,
    pub skipped: usize,
    pub roster_changed: bool,
}

pub struct ForegroundPump {
    backend: SharedBackend,
    session: SharedSession,
    roster: Vec<DeviceInfo>,
    background_polling: bool,
    had_focus: bool,
    raw_dump: bool,
    reconcile: ReconcileTimer,
}

impl ForegroundPump {
    pub fn new(
        backend: SharedBackend,
        session: SharedSession,
        background_polling: bool,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            backend,
            session,
            roster: Vec::new(),
            background_polling,
            had_focus: false,
            raw_dump: false,
            reconcile: ReconcileTimer::new(reconcile_interval),
        }
    }

    /// Enumerates devices and activates the first one
    pub fn initial_scan(&mut self) -> Result<Option<DeviceId>, SessionError> {
        self.reload_roster()?;
        let first = self.roster.first().cloned();
        self.select(first.as_ref())?;
        Ok(first.map(|info| info.id))
    }

    /// Connected devices sorted by id
    pub fn roster(&self) -> &[DeviceInfo] {
        &self.roster
    }

    pub fn raw_dump(&self) -> bool {
        self.raw_dump
    }

    pub fn toggle_raw_dump(&mut self) -> bool {
        self.raw_dump = !self.raw_dump;
        info!(
            "Raw event dump {}",
            if self.raw_dump { "enabled" } else { "disabled" }
        );
        self.raw_dump
    }

    /// Drains pending events and applies them
    pub fn pump(&mut self, now: DateTime<Local>, focused: bool) -> Result<PumpReport, SessionError> {
        if focused && !self.had_focus && self.background_polling {
            self.resync(now)?;
        }
        self.had_focus = focused;
        let owns_input = focused || !self.background_polling;

        let events: Vec<RawInputEvent> = {
            let mut backend = lock_backend(&self.backend)?;
            std::iter::from_fn(|| backend.next_event()).collect()
        };

        let mut report = PumpReport {
            events: events.len(),
            ..PumpReport::default()
        };

        for event in &events {
            if self.raw_dump {
                info!(
                    "RAW {} {:?} at {}",
                    event.device,
                    event.kind,
                    event.timestamp.format("%H:%M:%S.%3f")
                );
            }

            match event.kind {
                RawEventKind::DeviceAdded => {
                    self.on_device_added(event.device)?;
                    report.roster_changed = true;
                }
                RawEventKind::DeviceRemoved => {
                    self.on_device_removed(event.device)?;
                    report.roster_changed = true;
                }
                _ if owns_input => {
                    let mut session = lock_session(&self.session)?;
                    report.transitions += session.ingest_event(InputPath::Foreground, event).len();
                }
                _ => report.skipped += 1,
            }
        }

        if report.skipped > 0 {
            debug!(
                "Dropped {} input events while the poller owns input",
                report.skipped
            );
        }
        Ok(report)
    }

    /// Runs [`Self::validate`] when the reconcile interval elapsed
    pub fn tick_reconcile(&mut self, now: DateTime<Local>) -> Result<Vec<LogicalButton>, SessionError> {
        if self.reconcile.due(now) {
            self.validate(now)
        } else {
            Ok(Vec::new())
        }
    }

    /// Compares canonical presses with a fresh read of the active device
    pub fn validate(&mut self, now: DateTime<Local>) -> Result<Vec<LogicalButton>, SessionError> {
        let Some((device, caps)) = self.active()? else {
            return Ok(Vec::new());
        };
        let read = self.capture(device, caps, now)?;
        let released = lock_session(&self.session)?.reconcile(read, now);
        if !released.is_empty() {
            info!("Validation released {} stuck buttons", released.len());
        }
        Ok(released)
    }

    /// Resets state and re-enumerates, keeping the active device by name when possible
    pub fn refresh_devices(&mut self) -> Result<Option<DeviceId>, SessionError> {
        let previous = lock_session(&self.session)?
            .profile()
            .map(|profile| profile.name.clone());
        lock_session(&self.session)?.emergency_reset("device refresh");
        self.reload_roster()?;

        let next = previous
            .and_then(|name| self.roster.iter().find(|info| info.name == name))
            .or_else(|| self.roster.first())
            .cloned();
        self.select(next.as_ref())?;
        Ok(next.map(|info| info.id))
    }

    /// Activates the next device in roster order, wrapping around
    pub fn switch_device(&mut self) -> Result<Option<DeviceId>, SessionError> {
        if self.roster.is_empty() {
            warn!("No devices to switch to");
            return Ok(None);
        }
        let current = self.active()?.map(|(device, _)| device);
        let position = current
            .and_then(|device| self.roster.iter().position(|info| info.id == device))
            .map(|index| (index + 1) % self.roster.len())
            .unwrap_or(0);

        let next = self.roster[position].clone();
        self.select(Some(&next))?;
        Ok(Some(next.id))
    }

    fn active(&self) -> Result<Option<(DeviceId, DeviceCaps)>, SessionError> {
        Ok(lock_session(&self.session)?
            .profile()
            .map(|profile| (profile.id, profile.caps)))
    }

    fn capture(
        &self,
        device: DeviceId,
        caps: DeviceCaps,
        now: DateTime<Local>,
    ) -> Result<Result<RawSnapshot, DeviceError>, SessionError> {
        let backend = lock_backend(&self.backend)?;
        Ok(RawSnapshot::capture(&**backend, device, caps, now))
    }

    fn resync(&mut self, now: DateTime<Local>) -> Result<(), SessionError> {
        let Some((device, caps)) = self.active()? else {
            return Ok(());
        };
        match self.capture(device, caps, now)? {
            Ok(snapshot) => {
                debug!("Focus regained, re-seeding foreground state");
                lock_session(&self.session)?.seed(InputPath::Foreground, &snapshot);
            }
            Err(e) => warn!("Could not read {} on focus regain: {}", device, e),
        }
        Ok(())
    }

    fn reload_roster(&mut self) -> Result<(), SessionError> {
        let mut roster = lock_backend(&self.backend)?.enumerate_devices();
        roster.sort_by_key(|info| info.id);
        for info in &roster {
            info!("  {} '{}' {:?}", info.id, info.name, info.caps);
        }
        self.roster = roster;
        Ok(())
    }

    fn select(&mut self, info: Option<&DeviceInfo>) -> Result<(), SessionError> {
        let profile = info.map(DeviceProfile::detect);
        if profile.as_ref().is_some_and(|profile| profile.hat_only_dpad) && !self.raw_dump {
            info!("Hat-only d-pad device, enabling raw event dump");
            self.raw_dump = true;
        }
        lock_session(&self.session)?.select_device(profile);
        Ok(())
    }

    fn on_device_added(&mut self, device: DeviceId) -> Result<(), SessionError> {
        info!("Device {} added", device);
        self.reload_roster()?;
        if self.active()?.is_none() {
            let added = self.roster.iter().find(|info| info.id == device).cloned();
            self.select(added.as_ref())?;
        }
        Ok(())
    }

    fn on_device_removed(&mut self, device: DeviceId) -> Result<(), SessionError> {
        self.reload_roster()?;
        let active = self.active()?.map(|(active, _)| active);
        if active == Some(device) {
            warn!("Active device {} removed", device);
            lock_session(&self.session)?.emergency_reset("active device removed");
            let fallback = self.roster.first().cloned();
            self.select(fallback.as_ref())?;
        } else {
            info!("Device {} removed", device);
        }
        Ok(())
    }
}
