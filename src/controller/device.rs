//! Device boundary between the overlay core and the platform joystick layer
//!
//! The core never talks to a joystick API directly. It consumes:
//!
//! - device discovery ([`DeviceBackend::enumerate_devices`])
//! - synchronous raw reads (`poll_button`, `poll_axis`, `poll_hat`)
//! - a stream of raw events ([`DeviceBackend::next_event`])
//!
//! Raw indices follow the game-controller layout (buttons 0..=14, axes
//! left-x/left-y/right-x/right-y/left-trigger/right-trigger with y pointing
//! down, one hat with y pointing up).

use chrono::{DateTime, Local};
use std::fmt;

/// Backend-assigned device identifier, stable for the device's connected lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Number of raw inputs a device exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCaps {
    pub buttons: usize,
    pub axes: usize,
    pub hats: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub caps: DeviceCaps,
}

// Raw event payload
#[derive(Debug, Clone, PartialEq)]
pub enum RawEventKind {
    Button { index: usize, pressed: bool },
    Hat { hat: usize, x: i8, y: i8 },
    Axis { axis: usize, value: f32 },
    DeviceAdded,
    DeviceRemoved,
}

// Raw event with source device and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct RawInputEvent {
    pub device: DeviceId,
    pub kind: RawEventKind,
    pub timestamp: DateTime<Local>,
}

impl RawInputEvent {
    pub fn new(device: DeviceId, kind: RawEventKind, timestamp: DateTime<Local>) -> Self {
        Self {
            device,
            kind,
            timestamp,
        }
    }
}

/// Errors raised by raw device reads
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("Device {0} is not connected")]
    Disconnected(DeviceId),

    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Input {index} out of range for device {device}")]
    OutOfRange { device: DeviceId, index: usize },
}

/// Platform joystick layer as seen by the core
///
/// Implementations must be `Send` so the backend can be shared between the
/// foreground loop and the background poller behind one mutex.
pub trait DeviceBackend: Send {
    /// Lists the currently connected devices
    fn enumerate_devices(&mut self) -> Vec<DeviceInfo>;

    fn poll_button(&self, device: DeviceId, index: usize) -> Result<bool, DeviceError>;

    /// Axis value in `[-1, 1]`
    fn poll_axis(&self, device: DeviceId, axis: usize) -> Result<f32, DeviceError>;

    /// Hat vector with components in `{-1, 0, 1}`
    fn poll_hat(&self, device: DeviceId, hat: usize) -> Result<(i8, i8), DeviceError>;

    /// Next pending raw event, `None` when the queue is drained
    fn next_event(&mut self) -> Option<RawInputEvent>;

    /// Brings cached device state up to date for polling without handing
    /// input events to the caller
    ///
    /// Backends whose reads always hit the hardware keep the default no-op.
    fn refresh(&mut self) {}
}

/// Point-in-time read of every raw input of one device
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub device: DeviceId,
    pub buttons: Vec<bool>,
    pub axes: Vec<f32>,
    pub hat: Option<(i8, i8)>,
    pub timestamp: DateTime<Local>,
}

impl RawSnapshot {
    /// Reads all buttons, axes and the first hat of `device`
    ///
    /// Fails on the first read error; a partial snapshot is never returned.
    pub fn capture(
        backend: &dyn DeviceBackend,
        device: DeviceId,
        caps: DeviceCaps,
        timestamp: DateTime<Local>,
    ) -> Result<Self, DeviceError> {
        let buttons = (0..caps.buttons)
            .map(|index| backend.poll_button(device, index))
            .collect::<Result<Vec<_>, _>>()?;
        let axes = (0..caps.axes)
            .map(|axis| backend.poll_axis(device, axis))
            .collect::<Result<Vec<_>, _>>()?;
        let hat = if caps.hats > 0 {
            Some(backend.poll_hat(device, 0)?)
        } else {
            None
        };

        Ok(Self {
            device,
            buttons,
            axes,
            hat,
            timestamp,
        })
    }

    pub fn button(&self, index: usize) -> bool {
        self.buttons.get(index).copied().unwrap_or(false)
    }
}
