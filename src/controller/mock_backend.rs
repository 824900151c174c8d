//! Scriptable in-memory device backend.
//!
//! Holds raw device state and an event queue that tests (or a headless run)
//! drive directly. Clones share the same state, so one clone can be boxed
//! into the session while another keeps scripting input.

use crate::controller::device::{
    DeviceBackend, DeviceCaps, DeviceError, DeviceId, DeviceInfo, RawEventKind, RawInputEvent,
};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Debug, Clone)]
struct MockDevice {
    info: DeviceInfo,
    buttons: Vec<bool>,
    axes: Vec<f32>,
    hat: (i8, i8),
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDevice>,
    events: VecDeque<RawInputEvent>,
    next_id: usize,
    failing: bool,
}

/// In-memory backend with shared, scriptable state
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Plugs in a device and queues its `DeviceAdded` event
    pub fn connect(&self, name: &str, caps: DeviceCaps, now: DateTime<Local>) -> DeviceId {
        let mut state = self.state();
        let id = DeviceId(state.next_id);
        state.next_id += 1;

        info!("[MOCK BACKEND] Connect {} '{}'", id, name);
        state.devices.push(MockDevice {
            info: DeviceInfo {
                id,
                name: name.to_string(),
                caps,
            },
            buttons: vec![false; caps.buttons],
            axes: vec![0.0; caps.axes],
            hat: (0, 0),
        });
        state
            .events
            .push_back(RawInputEvent::new(id, RawEventKind::DeviceAdded, now));
        id
    }

    /// Unplugs a device and queues its `DeviceRemoved` event
    pub fn disconnect(&self, device: DeviceId, now: DateTime<Local>) {
        let mut state = self.state();
        info!("[MOCK BACKEND] Disconnect {}", device);
        state.devices.retain(|mock| mock.info.id != device);
        state
            .events
            .push_back(RawInputEvent::new(device, RawEventKind::DeviceRemoved, now));
    }

    /// Changes a button without emitting an event, like a lost event would
    pub fn set_button(&self, device: DeviceId, index: usize, pressed: bool) {
        if let Some(slot) = self
            .state()
            .devices
            .iter_mut()
            .find(|mock| mock.info.id == device)
            .and_then(|mock| mock.buttons.get_mut(index))
        {
            *slot = pressed;
        }
    }

    pub fn set_axis(&self, device: DeviceId, axis: usize, value: f32) {
        if let Some(slot) = self
            .state()
            .devices
            .iter_mut()
            .find(|mock| mock.info.id == device)
            .and_then(|mock| mock.axes.get_mut(axis))
        {
            *slot = value;
        }
    }

    pub fn set_hat(&self, device: DeviceId, x: i8, y: i8) {
        if let Some(mock) = self
            .state()
            .devices
            .iter_mut()
            .find(|mock| mock.info.id == device)
        {
            mock.hat = (x, y);
        }
    }

    pub fn push_event(&self, event: RawInputEvent) {
        self.state().events.push_back(event);
    }

    /// Changes a button and queues the matching event
    pub fn button(&self, device: DeviceId, index: usize, pressed: bool, now: DateTime<Local>) {
        self.set_button(device, index, pressed);
        self.push_event(RawInputEvent::new(
            device,
            RawEventKind::Button { index, pressed },
            now,
        ));
    }

    pub fn axis(&self, device: DeviceId, axis: usize, value: f32, now: DateTime<Local>) {
        self.set_axis(device, axis, value);
        self.push_event(RawInputEvent::new(
            device,
            RawEventKind::Axis { axis, value },
            now,
        ));
    }

    pub fn hat(&self, device: DeviceId, x: i8, y: i8, now: DateTime<Local>) {
        self.set_hat(device, x, y);
        self.push_event(RawInputEvent::new(
            device,
            RawEventKind::Hat { hat: 0, x, y },
            now,
        ));
    }

    /// Makes every raw read fail until switched off again
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn pending_events(&self) -> usize {
        self.state().events.len()
    }

    fn read<T>(
        &self,
        device: DeviceId,
        read: impl FnOnce(&MockDevice) -> Option<T>,
        index: usize,
    ) -> Result<T, DeviceError> {
        let state = self.state();
        if state.failing {
            return Err(DeviceError::Unavailable("mock read failure".to_string()));
        }
        let mock = state
            .devices
            .iter()
            .find(|mock| mock.info.id == device)
            .ok_or(DeviceError::Disconnected(device))?;
        read(mock).ok_or(DeviceError::OutOfRange { device, index })
    }
}

impl DeviceBackend for MockBackend {
    fn enumerate_devices(&mut self) -> Vec<DeviceInfo> {
        self.state()
            .devices
            .iter()
            .map(|mock| mock.info.clone())
            .collect()
    }

    fn poll_button(&self, device: DeviceId, index: usize) -> Result<bool, DeviceError> {
        self.read(device, |mock| mock.buttons.get(index).copied(), index)
    }

    fn poll_axis(&self, device: DeviceId, axis: usize) -> Result<f32, DeviceError> {
        self.read(device, |mock| mock.axes.get(axis).copied(), axis)
    }

    fn poll_hat(&self, device: DeviceId, hat: usize) -> Result<(i8, i8), DeviceError> {
        self.read(
            device,
            |mock| (hat < mock.info.caps.hats).then_some(mock.hat),
            hat,
        )
    }

    fn next_event(&mut self) -> Option<RawInputEvent> {
        self.state().events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::device::RawSnapshot;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    const CAPS: DeviceCaps = DeviceCaps {
        buttons: 4,
        axes: 2,
        hats: 1,
    };

    #[test]
    fn clones_share_state_and_queue() {
        let script = MockBackend::new();
        let mut backend = script.clone();

        let id = script.connect("Generic Pad", CAPS, t0());
        script.button(id, 2, true, t0());

        assert_eq!(backend.enumerate_devices().len(), 1);
        assert_eq!(backend.poll_button(id, 2), Ok(true));
        assert_eq!(
            backend.next_event().map(|event| event.kind),
            Some(RawEventKind::DeviceAdded)
        );
        assert_eq!(
            backend.next_event().map(|event| event.kind),
            Some(RawEventKind::Button {
                index: 2,
                pressed: true
            })
        );
        assert!(backend.next_event().is_none());
    }

    #[test]
    fn reads_report_errors() {
        let backend = MockBackend::new();
        let id = backend.connect("Generic Pad", CAPS, t0());

        assert_eq!(
            backend.poll_button(id, 9),
            Err(DeviceError::OutOfRange {
                device: id,
                index: 9
            })
        );
        assert_eq!(
            backend.poll_axis(DeviceId(42), 0),
            Err(DeviceError::Disconnected(DeviceId(42)))
        );

        backend.set_failing(true);
        assert!(matches!(
            RawSnapshot::capture(&backend, id, CAPS, t0()),
            Err(DeviceError::Unavailable(_))
        ));
    }

    #[test]
    fn snapshot_reads_every_input() {
        let backend = MockBackend::new();
        let id = backend.connect("Generic Pad", CAPS, t0());
        backend.set_button(id, 0, true);
        backend.set_axis(id, 1, -0.75);
        backend.set_hat(id, 1, 0);

        let snapshot = RawSnapshot::capture(&backend, id, CAPS, t0()).unwrap();
        assert_eq!(snapshot.buttons, vec![true, false, false, false]);
        assert_eq!(snapshot.axes, vec![0.0, -0.75]);
        assert_eq!(snapshot.hat, Some((1, 0)));
        // state-only changes do not queue events
        assert_eq!(backend.pending_events(), 1);
    }
}
