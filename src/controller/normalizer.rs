//! Raw input normalization into canonical press/release transitions
//!
//! Three raw channels feed the same canonical vocabulary:
//!
//! ```text
//! Button{index}  ──► ButtonMap ──┐
//! Hat{x, y}      ──► 4 d-pad ids ├──► Transition::{Press, Release}
//! Axis{0,1,4,5}  ──► d-pad / ZL/ZR┘
//! ```
//!
//! Each producer ([`InputPath::Foreground`] event loop, [`InputPath::Background`]
//! poller) keeps its own last-known raw state, because the two observe the
//! hardware at different times. Only genuine changes against that state turn
//! into transitions; the canonical store deduplicates across paths.

use crate::controller::detector::{ControllerFamily, DeviceProfile};
use crate::controller::device::{RawEventKind, RawInputEvent, RawSnapshot};
use crate::controller::mapping::{LogicalButton, GENERIC_DPAD_INDICES};
use chrono::{DateTime, Duration, Local};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Thresholds for the normalizer
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizerSettings {
    /// Button events within this window after a hat update are dropped on hat-only pads
    pub hat_button_debounce_ms: i64,
    pub stick_deadzone: f32,
    pub trigger_threshold: f32,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        Self {
            hat_button_debounce_ms: 30,
            stick_deadzone: 0.5,
            trigger_threshold: 0.5,
        }
    }
}

/// Producer of raw input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputPath {
    Foreground,
    Background,
}

impl fmt::Display for InputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputPath::Foreground => write!(f, "foreground"),
            InputPath::Background => write!(f, "background"),
        }
    }
}

/// Canonical transition requested by the normalizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Press(LogicalButton),
    Release(LogicalButton),
}

impl Transition {
    fn edge(button: LogicalButton, pressed: bool) -> Self {
        if pressed {
            Transition::Press(button)
        } else {
            Transition::Release(button)
        }
    }
}

// Virtual buttons derived from axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AxisKey {
    StickLeft,
    StickRight,
    StickUp,
    StickDown,
    TriggerLeft,
    TriggerRight,
}

/// Last-known raw state observed by one path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathSnapshot {
    buttons: HashMap<usize, bool>,
    hat: (i8, i8),
    axis_values: HashMap<usize, f32>,
    axis_states: HashMap<AxisKey, bool>,
}

impl PathSnapshot {
    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(&index).copied().unwrap_or(false)
    }

    pub fn hat(&self) -> (i8, i8) {
        self.hat
    }

    fn axis(&self, axis: usize) -> f32 {
        self.axis_values.get(&axis).copied().unwrap_or(0.0)
    }
}

// Hat vector -> held state of LEFT, RIGHT, UP, DOWN
fn hat_directions(hat: (i8, i8)) -> [(LogicalButton, bool); 4] {
    let (x, y) = hat;
    [
        (LogicalButton::DPadLeft, x < 0),
        (LogicalButton::DPadRight, x > 0),
        (LogicalButton::DPadUp, y > 0),
        (LogicalButton::DPadDown, y < 0),
    ]
}

pub struct InputNormalizer {
    settings: NormalizerSettings,
    foreground: PathSnapshot,
    background: PathSnapshot,
    last_hat_event: Option<DateTime<Local>>,
}

impl InputNormalizer {
    pub fn new(settings: NormalizerSettings) -> Self {
        Self {
            settings,
            foreground: PathSnapshot::default(),
            background: PathSnapshot::default(),
            last_hat_event: None,
        }
    }

    pub fn settings(&self) -> &NormalizerSettings {
        &self.settings
    }

    pub fn snapshot(&self, path: InputPath) -> &PathSnapshot {
        match path {
            InputPath::Foreground => &self.foreground,
            InputPath::Background => &self.background,
        }
    }

    pub fn last_hat_event(&self) -> Option<DateTime<Local>> {
        self.last_hat_event
    }

    /// True while button events are being absorbed after a hat update
    pub fn hat_debounce_active(&self, now: DateTime<Local>) -> bool {
        self.last_hat_event
            .map(|last| now - last <= Duration::milliseconds(self.settings.hat_button_debounce_ms))
            .unwrap_or(false)
    }

    /// Forgets every snapshot and the hat timestamp
    pub fn reset(&mut self) {
        self.foreground = PathSnapshot::default();
        self.background = PathSnapshot::default();
        self.last_hat_event = None;
    }

    /// Overwrites the snapshot of `path` with `snapshot` without emitting anything
    ///
    /// Used when a path takes over after the other one has been feeding the
    /// canonical state.
    pub fn seed(&mut self, path: InputPath, profile: &DeviceProfile, snapshot: &RawSnapshot) {
        let mut seeded = PathSnapshot {
            buttons: snapshot.buttons.iter().copied().enumerate().collect(),
            hat: snapshot.hat.unwrap_or((0, 0)),
            axis_values: snapshot.axes.iter().copied().enumerate().collect(),
            axis_states: HashMap::new(),
        };
        let targets = self.axis_targets(profile, &seeded);
        seeded.axis_states = targets
            .into_iter()
            .map(|(key, pressed, _)| (key, pressed))
            .collect();

        debug!("Seeded {} snapshot from device {}", path, snapshot.device);
        *self.snapshot_mut(path) = seeded;
    }

    /// Translates one raw event from `path`
    pub fn on_event(
        &mut self,
        path: InputPath,
        profile: &DeviceProfile,
        event: &RawInputEvent,
    ) -> Vec<Transition> {
        if event.device != profile.id {
            debug!(
                "Skipping event from non-active device {}: {:?}",
                event.device, event.kind
            );
            return Vec::new();
        }

        match event.kind {
            RawEventKind::Button { index, pressed } => self
                .button_channel(path, profile, index, pressed, event.timestamp)
                .into_iter()
                .collect(),
            RawEventKind::Hat { hat: 0, x, y } => self.hat_channel(path, (x, y), event.timestamp),
            RawEventKind::Hat { hat, .. } => {
                debug!("Ignoring secondary hat {}", hat);
                Vec::new()
            }
            RawEventKind::Axis { axis, value } => {
                self.snapshot_mut(path).axis_values.insert(axis, value);
                self.axis_channel(path, profile)
            }
            RawEventKind::DeviceAdded | RawEventKind::DeviceRemoved => Vec::new(),
        }
    }

    /// Translates a full polled read from `path`
    ///
    /// Buttons are evaluated before the hat, then sticks and triggers.
    pub fn on_snapshot(
        &mut self,
        path: InputPath,
        profile: &DeviceProfile,
        snapshot: &RawSnapshot,
    ) -> Vec<Transition> {
        if snapshot.device != profile.id {
            debug!("Skipping snapshot of non-active device {}", snapshot.device);
            return Vec::new();
        }

        let now = snapshot.timestamp;
        let mut transitions: Vec<Transition> = snapshot
            .buttons
            .iter()
            .enumerate()
            .filter_map(|(index, pressed)| self.button_channel(path, profile, index, *pressed, now))
            .collect();

        if let Some(hat) = snapshot.hat {
            // a polled hat only counts as an update when it moved
            if hat != self.snapshot(path).hat {
                transitions.extend(self.hat_channel(path, hat, now));
            }
        }

        let axis_values = &mut self.snapshot_mut(path).axis_values;
        for (axis, value) in snapshot.axes.iter().enumerate() {
            axis_values.insert(axis, *value);
        }
        transitions.extend(self.axis_channel(path, profile));

        transitions
    }

    /// Whether the physical sources of `button` currently read as held
    ///
    /// `None` when the button has no source in `snapshot` that could be checked.
    pub fn physically_held(
        &self,
        profile: &DeviceProfile,
        button: LogicalButton,
        snapshot: &RawSnapshot,
    ) -> Option<bool> {
        let mut sources = Vec::new();

        for index in profile.button_map.raw_indices_for(button) {
            if index >= snapshot.buttons.len() {
                continue;
            }
            if profile.hat_only_dpad && GENERIC_DPAD_INDICES.contains(&index) {
                continue;
            }
            sources.push(snapshot.button(index));
        }

        if button.is_dpad() {
            if let Some(hat) = snapshot.hat {
                sources.extend(
                    hat_directions(hat)
                        .iter()
                        .filter(|(direction, _)| *direction == button)
                        .map(|(_, held)| *held),
                );
            }
        }

        let physical = PathSnapshot {
            axis_values: snapshot.axes.iter().copied().enumerate().collect(),
            ..PathSnapshot::default()
        };
        sources.extend(
            self.axis_targets(profile, &physical)
                .into_iter()
                .filter(|(_, _, target)| *target == button)
                .map(|(_, held, _)| held),
        );

        if sources.is_empty() {
            None
        } else {
            Some(sources.into_iter().any(|held| held))
        }
    }

    fn snapshot_mut(&mut self, path: InputPath) -> &mut PathSnapshot {
        match path {
            InputPath::Foreground => &mut self.foreground,
            InputPath::Background => &mut self.background,
        }
    }

    fn button_channel(
        &mut self,
        path: InputPath,
        profile: &DeviceProfile,
        index: usize,
        pressed: bool,
        now: DateTime<Local>,
    ) -> Option<Transition> {
        let debounce_active = self.hat_debounce_active(now);
        let snapshot = self.snapshot_mut(path);
        let was_pressed = snapshot.button(index);
        snapshot.buttons.insert(index, pressed);

        if was_pressed == pressed {
            return None;
        }

        if profile.hat_only_dpad {
            if GENERIC_DPAD_INDICES.contains(&index) {
                debug!("Suppressed d-pad button {} on hat-only device", index);
                return None;
            }
            if debounce_active {
                debug!("Suppressed button {} inside hat debounce window", index);
                return None;
            }
        }

        match profile.button_map.get(index) {
            Some(button) => Some(Transition::edge(button, pressed)),
            None => {
                debug!("No mapping for raw button {} on {}", index, profile.family);
                None
            }
        }
    }

    fn hat_channel(
        &mut self,
        path: InputPath,
        hat: (i8, i8),
        now: DateTime<Local>,
    ) -> Vec<Transition> {
        self.last_hat_event = Some(now);

        let snapshot = self.snapshot_mut(path);
        let previous = hat_directions(snapshot.hat);
        snapshot.hat = hat;

        hat_directions(hat)
            .iter()
            .zip(previous.iter())
            .filter(|((_, desired), (_, held))| desired != held)
            .map(|((button, desired), _)| Transition::edge(*button, *desired))
            .collect()
    }

    fn axis_channel(&mut self, path: InputPath, profile: &DeviceProfile) -> Vec<Transition> {
        let targets = self.axis_targets(profile, self.snapshot(path));
        let states = &mut self.snapshot_mut(path).axis_states;

        let mut transitions = Vec::new();
        for (key, pressed, button) in targets {
            let was_pressed = states.get(&key).copied().unwrap_or(false);
            if pressed != was_pressed {
                states.insert(key, pressed);
                transitions.push(Transition::edge(button, pressed));
            }
        }
        transitions
    }

    // Desired state of every axis-backed virtual button for this device
    fn axis_targets(
        &self,
        profile: &DeviceProfile,
        snapshot: &PathSnapshot,
    ) -> Vec<(AxisKey, bool, LogicalButton)> {
        let axes = profile.caps.axes;
        let deadzone = self.settings.stick_deadzone;
        let threshold = self.settings.trigger_threshold;
        let mut targets = Vec::new();

        // SNES pads report noisy sticks, their d-pad comes from the hat
        if profile.family != ControllerFamily::SnesSwitch && axes >= 2 {
            let x = snapshot.axis(0);
            let y = snapshot.axis(1);
            targets.push((AxisKey::StickLeft, x < -deadzone, LogicalButton::DPadLeft));
            targets.push((AxisKey::StickRight, x > deadzone, LogicalButton::DPadRight));
            targets.push((AxisKey::StickUp, y < -deadzone, LogicalButton::DPadUp));
            targets.push((AxisKey::StickDown, y > deadzone, LogicalButton::DPadDown));
        }

        if axes >= 5 {
            targets.push((
                AxisKey::TriggerLeft,
                snapshot.axis(4) > threshold,
                LogicalButton::ZL,
            ));
        }
        if axes >= 6 {
            targets.push((
                AxisKey::TriggerRight,
                snapshot.axis(5) > threshold,
                LogicalButton::ZR,
            ));
        }

        targets
    }
}

impl Default for InputNormalizer {
    fn default() -> Self {
        Self::new(NormalizerSettings::default())
    }
}
