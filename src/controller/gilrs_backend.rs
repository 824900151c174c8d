//! gilrs-backed implementation of [`DeviceBackend`]
//!
//! gilrs reports semantic buttons; they are laid out into the raw index order
//! the mapping table of the pad's family was measured on:
//!
//! | raw  | game controller (Nintendo) | legacy joystick (others) |
//! |------|----------------------------|--------------------------|
//! | 0-3  | South, East, West, North   | South, East, West, North |
//! | 4-6  | Select, -, Start           | LeftTrigger, RightTrigger, Select |
//! | 7-8  | LeftThumb, RightThumb      | Start, -                 |
//! | 9-10 | LeftTrigger, RightTrigger  | -                        |
//! | 11-15| DPadUp, Down, Left, Right, - | -, DPadUp, Down, Left, Right |
//! | 16-18| Mode                       | Mode, LeftThumb, RightThumb |
//!
//! Indices past 15 are outside every table and only show up as mapping misses.
//!
//! Axes 1 and 3 are flipped so y points down, triggers (axes 4/5) are
//! rescaled from `[0, 1]` to `[-1, 1]`. The d-pad axes form hat 0.
//!
//! gilrs only updates its cached gamepad state while events are pulled, so
//! [`DeviceBackend::refresh`] pulls them and keeps only connection changes
//! for the foreground.

use crate::controller::detector::{classify, ControllerFamily};
use crate::controller::device::{
    DeviceBackend, DeviceCaps, DeviceError, DeviceId, DeviceInfo, RawEventKind, RawInputEvent,
};
use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

const GAME_CONTROLLER_LAYOUT: [Option<Button>; 17] = [
    Some(Button::South),
    Some(Button::East),
    Some(Button::West),
    Some(Button::North),
    Some(Button::Select),
    None,
    Some(Button::Start),
    Some(Button::LeftThumb),
    Some(Button::RightThumb),
    Some(Button::LeftTrigger),
    Some(Button::RightTrigger),
    Some(Button::DPadUp),
    Some(Button::DPadDown),
    Some(Button::DPadLeft),
    Some(Button::DPadRight),
    None,
    Some(Button::Mode),
];

const LEGACY_LAYOUT: [Option<Button>; 19] = [
    Some(Button::South),
    Some(Button::East),
    Some(Button::West),
    Some(Button::North),
    Some(Button::LeftTrigger),
    Some(Button::RightTrigger),
    Some(Button::Select),
    Some(Button::Start),
    None,
    None,
    None,
    None,
    Some(Button::DPadUp),
    Some(Button::DPadDown),
    Some(Button::DPadLeft),
    Some(Button::DPadRight),
    Some(Button::Mode),
    Some(Button::LeftThumb),
    Some(Button::RightThumb),
];

/// Raw button order a family's mapping table expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawLayout {
    GameController,
    Legacy,
}

impl RawLayout {
    fn for_family(family: ControllerFamily) -> Self {
        match family {
            ControllerFamily::SwitchPro | ControllerFamily::SnesSwitch => RawLayout::GameController,
            ControllerFamily::PS4
            | ControllerFamily::PS5
            | ControllerFamily::Xbox
            | ControllerFamily::Generic => RawLayout::Legacy,
        }
    }

    fn of(gamepad: &Gamepad<'_>) -> Self {
        Self::for_family(classify(gamepad.name()))
    }

    fn buttons(self) -> &'static [Option<Button>] {
        match self {
            RawLayout::GameController => &GAME_CONTROLLER_LAYOUT,
            RawLayout::Legacy => &LEGACY_LAYOUT,
        }
    }

    fn index_of(self, button: Button) -> Option<usize> {
        self.buttons()
            .iter()
            .position(|candidate| *candidate == Some(button))
    }

    fn button_at(self, index: usize) -> Option<Button> {
        self.buttons().get(index).copied().flatten()
    }
}

fn trigger_to_axis(value: f32) -> f32 {
    value * 2.0 - 1.0
}

fn hat_component(value: f32) -> i8 {
    if value > 0.5 {
        1
    } else if value < -0.5 {
        -1
    } else {
        0
    }
}

/// Input time reported by gilrs, in the overlay's clock
fn event_timestamp(time: SystemTime) -> DateTime<Local> {
    DateTime::<Local>::from(time)
}

fn device_id(id: GamepadId) -> DeviceId {
    DeviceId(usize::from(id))
}

fn has_triggers(gamepad: &Gamepad<'_>) -> bool {
    gamepad.button_code(Button::LeftTrigger2).is_some() || gamepad.axis_code(Axis::LeftZ).is_some()
}

fn caps_of(gamepad: &Gamepad<'_>) -> DeviceCaps {
    DeviceCaps {
        buttons: RawLayout::of(gamepad).buttons().len(),
        axes: if has_triggers(gamepad) { 6 } else { 4 },
        hats: usize::from(gamepad.axis_code(Axis::DPadX).is_some()),
    }
}

pub struct GilrsBackend {
    gilrs: Gilrs,
    // connection events held back while `refresh` drains input
    pending: VecDeque<RawInputEvent>,
    // raw layout per device, resolved from the name on enumeration
    layouts: HashMap<DeviceId, RawLayout>,
}

impl GilrsBackend {
    pub fn create() -> Result<Self, DeviceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(DeviceError::Unavailable(e.to_string()));
            }
        };

        Ok(Self {
            gilrs,
            pending: VecDeque::new(),
            layouts: HashMap::new(),
        })
    }

    fn gamepad(&self, device: DeviceId) -> Result<Gamepad<'_>, DeviceError> {
        self.gilrs
            .gamepads()
            .find(|(id, _)| device_id(*id) == device)
            .map(|(_, gamepad)| gamepad)
            .ok_or(DeviceError::Disconnected(device))
    }

    fn hat_of(&self, device: DeviceId) -> Result<(i8, i8), DeviceError> {
        let gamepad = self.gamepad(device)?;
        Ok((
            hat_component(gamepad.value(Axis::DPadX)),
            hat_component(gamepad.value(Axis::DPadY)),
        ))
    }

    fn layout(&self, device: DeviceId, gamepad: &Gamepad<'_>) -> RawLayout {
        self.layouts
            .get(&device)
            .copied()
            .unwrap_or_else(|| RawLayout::of(gamepad))
    }

    fn button_index(&self, id: GamepadId, button: Button) -> Option<usize> {
        let gamepad = self.gilrs.connected_gamepad(id)?;
        self.layout(device_id(id), &gamepad).index_of(button)
    }

    // Translates a gilrs event, `None` for anything outside the raw layout
    fn convert(&self, event: Event) -> Option<RawInputEvent> {
        let Event { id, event, time, .. } = event;
        let device = device_id(id);

        let kind = match event {
            EventType::ButtonPressed(button, _) => RawEventKind::Button {
                index: self.button_index(id, button)?,
                pressed: true,
            },
            EventType::ButtonReleased(button, _) => RawEventKind::Button {
                index: self.button_index(id, button)?,
                pressed: false,
            },
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => RawEventKind::Axis {
                axis: 4,
                value: trigger_to_axis(value),
            },
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => RawEventKind::Axis {
                axis: 5,
                value: trigger_to_axis(value),
            },
            EventType::AxisChanged(axis, value, _) => match axis {
                Axis::LeftStickX => RawEventKind::Axis { axis: 0, value },
                Axis::LeftStickY => RawEventKind::Axis {
                    axis: 1,
                    value: -value,
                },
                Axis::RightStickX => RawEventKind::Axis { axis: 2, value },
                Axis::RightStickY => RawEventKind::Axis {
                    axis: 3,
                    value: -value,
                },
                Axis::LeftZ => RawEventKind::Axis { axis: 4, value },
                Axis::RightZ => RawEventKind::Axis { axis: 5, value },
                Axis::DPadX | Axis::DPadY => {
                    let (x, y) = self.hat_of(device).ok()?;
                    RawEventKind::Hat { hat: 0, x, y }
                }
                _ => {
                    debug!("Ignoring unsupported axis: {:?}", axis);
                    return None;
                }
            },
            EventType::Connected => {
                info!("Controller connected event detected");
                RawEventKind::DeviceAdded
            }
            EventType::Disconnected => {
                warn!("Controller disconnected event detected");
                RawEventKind::DeviceRemoved
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                return None;
            }
        };

        Some(RawInputEvent::new(device, kind, event_timestamp(time)))
    }
}

impl DeviceBackend for GilrsBackend {
    fn enumerate_devices(&mut self) -> Vec<DeviceInfo> {
        let devices: Vec<DeviceInfo> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| DeviceInfo {
                id: device_id(id),
                name: gamepad.name().to_string(),
                caps: caps_of(&gamepad),
            })
            .collect();

        self.layouts = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (device_id(id), RawLayout::of(&gamepad)))
            .collect();
        if devices.is_empty() {
            warn!("No gamepad connected");
        } else {
            info!("Found {} gamepads", devices.len());
        }
        devices
    }

    fn poll_button(&self, device: DeviceId, index: usize) -> Result<bool, DeviceError> {
        let gamepad = self.gamepad(device)?;
        let layout = self.layout(device, &gamepad);
        if index >= layout.buttons().len() {
            return Err(DeviceError::OutOfRange { device, index });
        }
        Ok(layout
            .button_at(index)
            .is_some_and(|button| gamepad.is_pressed(button)))
    }

    fn poll_axis(&self, device: DeviceId, axis: usize) -> Result<f32, DeviceError> {
        let gamepad = self.gamepad(device)?;
        let trigger = |button: Button, fallback: Axis| {
            gamepad
                .button_data(button)
                .map(|data| trigger_to_axis(data.value()))
                .unwrap_or_else(|| gamepad.value(fallback))
        };

        match axis {
            0 => Ok(gamepad.value(Axis::LeftStickX)),
            1 => Ok(-gamepad.value(Axis::LeftStickY)),
            2 => Ok(gamepad.value(Axis::RightStickX)),
            3 => Ok(-gamepad.value(Axis::RightStickY)),
            4 => Ok(trigger(Button::LeftTrigger2, Axis::LeftZ)),
            5 => Ok(trigger(Button::RightTrigger2, Axis::RightZ)),
            _ => Err(DeviceError::OutOfRange {
                device,
                index: axis,
            }),
        }
    }

    fn poll_hat(&self, device: DeviceId, hat: usize) -> Result<(i8, i8), DeviceError> {
        if hat != 0 {
            return Err(DeviceError::OutOfRange { device, index: hat });
        }
        self.hat_of(device)
    }

    fn next_event(&mut self) -> Option<RawInputEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        while let Some(event) = self.gilrs.next_event() {
            if let Some(raw) = self.convert(event) {
                return Some(raw);
            }
        }
        None
    }

    fn refresh(&mut self) {
        while let Some(event) = self.gilrs.next_event() {
            if matches!(event.event, EventType::Connected | EventType::Disconnected) {
                if let Some(raw) = self.convert(event) {
                    self.pending.push_back(raw);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::mapping::{map, LogicalButton};
    use std::time::{Duration, UNIX_EPOCH};

    const FAMILIES: [ControllerFamily; 6] = [
        ControllerFamily::SwitchPro,
        ControllerFamily::SnesSwitch,
        ControllerFamily::PS4,
        ControllerFamily::PS5,
        ControllerFamily::Xbox,
        ControllerFamily::Generic,
    ];

    fn mapped(family: ControllerFamily, button: Button) -> Option<LogicalButton> {
        RawLayout::for_family(family)
            .index_of(button)
            .and_then(|index| map(family, index))
    }

    #[test]
    fn every_family_sees_the_buttons_it_was_measured_with() {
        let shared = [
            (Button::South, LogicalButton::A),
            (Button::East, LogicalButton::B),
            (Button::West, LogicalButton::X),
            (Button::North, LogicalButton::Y),
            (Button::LeftTrigger, LogicalButton::L1),
            (Button::RightTrigger, LogicalButton::R1),
            (Button::Select, LogicalButton::Select),
            (Button::Start, LogicalButton::Start),
            (Button::DPadUp, LogicalButton::DPadUp),
            (Button::DPadDown, LogicalButton::DPadDown),
            (Button::DPadLeft, LogicalButton::DPadLeft),
            (Button::DPadRight, LogicalButton::DPadRight),
        ];

        for family in FAMILIES {
            for (button, expected) in shared {
                assert_eq!(
                    mapped(family, button),
                    Some(expected),
                    "{:?} on {}",
                    button,
                    family
                );
            }
            assert_eq!(mapped(family, Button::Mode), None, "Mode on {}", family);
            assert_eq!(mapped(family, Button::LeftTrigger2), None);
            assert_eq!(mapped(family, Button::RightTrigger2), None);
        }
    }

    #[test]
    fn stick_clicks_only_map_where_the_table_knows_them() {
        assert_eq!(
            mapped(ControllerFamily::SwitchPro, Button::LeftThumb),
            Some(LogicalButton::L3)
        );
        assert_eq!(
            mapped(ControllerFamily::SwitchPro, Button::RightThumb),
            Some(LogicalButton::R3)
        );
        for family in [ControllerFamily::Xbox, ControllerFamily::PS4, ControllerFamily::Generic] {
            assert_eq!(mapped(family, Button::LeftThumb), None);
            assert_eq!(mapped(family, Button::RightThumb), None);
        }
    }

    #[test]
    fn layouts_follow_the_family() {
        assert_eq!(
            RawLayout::for_family(ControllerFamily::SnesSwitch),
            RawLayout::GameController
        );
        assert_eq!(RawLayout::for_family(ControllerFamily::PS5), RawLayout::Legacy);
        assert_eq!(RawLayout::Legacy.index_of(Button::DPadUp), Some(12));
        assert_eq!(RawLayout::GameController.index_of(Button::DPadUp), Some(11));
        assert_eq!(RawLayout::Legacy.button_at(9), None);
        assert_eq!(RawLayout::Legacy.button_at(40), None);
    }

    #[test]
    fn triggers_and_hat_are_rescaled() {
        assert_eq!(trigger_to_axis(0.0), -1.0);
        assert_eq!(trigger_to_axis(1.0), 1.0);
        assert_eq!(hat_component(-1.0), -1);
        assert_eq!(hat_component(0.2), 0);
        assert_eq!(hat_component(1.0), 1);
    }

    #[test]
    fn events_keep_their_input_time() {
        let first = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let second = first + Duration::from_millis(25);
        assert_eq!(
            event_timestamp(second) - event_timestamp(first),
            chrono::Duration::milliseconds(25)
        );
        assert_eq!(event_timestamp(first).timestamp(), 1_700_000_000);
    }
}
