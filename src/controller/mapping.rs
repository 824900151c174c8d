//! Canonical button vocabulary and the per-family raw index tables
//!
//! Every raw button index reported by a device is translated into a
//! [`LogicalButton`] here. Nothing past this module sees raw indices.
//!
//! # Table layout
//!
//! ```text
//! GENERIC_TABLE ──┐
//!                 ├──► ButtonMap (merged once per device, immutable)
//! family overrides┘
//! ```
//!
//! An override entry replaces the generic entry for its index. An override of
//! `None` removes the index, which is how a family table that fully replaces
//! the generic layout is expressed.

use crate::controller::detector::ControllerFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical button identity, independent of any controller's raw indices
///
/// The numeric id of each variant matches the lane/color vocabulary used by the
/// overlay ("0".."15").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogicalButton {
    B,
    A,
    X,
    Y,
    L1,
    R1,
    ZL,
    ZR,
    Select,
    Start,
    L3,
    R3,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

impl LogicalButton {
    pub const ALL: [LogicalButton; 16] = [
        LogicalButton::B,
        LogicalButton::A,
        LogicalButton::X,
        LogicalButton::Y,
        LogicalButton::L1,
        LogicalButton::R1,
        LogicalButton::ZL,
        LogicalButton::ZR,
        LogicalButton::Select,
        LogicalButton::Start,
        LogicalButton::L3,
        LogicalButton::R3,
        LogicalButton::DPadUp,
        LogicalButton::DPadDown,
        LogicalButton::DPadLeft,
        LogicalButton::DPadRight,
    ];

    pub const DPAD: [LogicalButton; 4] = [
        LogicalButton::DPadLeft,
        LogicalButton::DPadRight,
        LogicalButton::DPadUp,
        LogicalButton::DPadDown,
    ];

    /// Numeric id in the "0".."15" vocabulary
    pub fn id(self) -> u8 {
        match self {
            LogicalButton::B => 0,
            LogicalButton::A => 1,
            LogicalButton::X => 2,
            LogicalButton::Y => 3,
            LogicalButton::L1 => 4,
            LogicalButton::R1 => 5,
            LogicalButton::ZL => 6,
            LogicalButton::ZR => 7,
            LogicalButton::Select => 8,
            LogicalButton::Start => 9,
            LogicalButton::L3 => 10,
            LogicalButton::R3 => 11,
            LogicalButton::DPadUp => 12,
            LogicalButton::DPadDown => 13,
            LogicalButton::DPadLeft => 14,
            LogicalButton::DPadRight => 15,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|button| button.id() == id)
    }

    pub fn is_dpad(self) -> bool {
        Self::DPAD.contains(&self)
    }

    /// Short label drawn on the lane's button cap
    pub fn label(self) -> &'static str {
        match self {
            LogicalButton::B => "B",
            LogicalButton::A => "A",
            LogicalButton::X => "X",
            LogicalButton::Y => "Y",
            LogicalButton::L1 => "L1",
            LogicalButton::R1 => "R1",
            LogicalButton::ZL => "ZL",
            LogicalButton::ZR => "ZR",
            LogicalButton::Select => "SLCT",
            LogicalButton::Start => "STRT",
            LogicalButton::L3 => "L3",
            LogicalButton::R3 => "R3",
            LogicalButton::DPadUp => "UP",
            LogicalButton::DPadDown => "DOWN",
            LogicalButton::DPadLeft => "LEFT",
            LogicalButton::DPadRight => "RIGHT",
        }
    }

    /// Lane/note color as RGB
    pub fn color(self) -> (u8, u8, u8) {
        match self {
            LogicalButton::DPadLeft => (255, 20, 147),
            LogicalButton::DPadUp => (0, 255, 255),
            LogicalButton::DPadRight => (50, 205, 50),
            LogicalButton::DPadDown => (255, 215, 0),
            LogicalButton::L1 => (255, 69, 0),
            LogicalButton::R1 => (148, 0, 211),
            LogicalButton::ZL => (255, 140, 0),
            LogicalButton::ZR => (138, 43, 226),
            LogicalButton::Select => (30, 144, 255),
            LogicalButton::Start => (255, 105, 180),
            LogicalButton::X => (255, 255, 0),
            LogicalButton::Y => (65, 105, 225),
            LogicalButton::B => (0, 255, 127),
            LogicalButton::A => (255, 99, 71),
            LogicalButton::L3 | LogicalButton::R3 => (255, 255, 255),
        }
    }

    /// Position in [`LANE_ORDER`], `None` for buttons without a lane
    pub fn lane(self) -> Option<usize> {
        LANE_ORDER.iter().position(|button| *button == self)
    }
}

impl fmt::Display for LogicalButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.label())
    }
}

/// Left-to-right lane order of the overlay
pub const LANE_ORDER: [LogicalButton; 14] = [
    LogicalButton::DPadLeft,
    LogicalButton::DPadUp,
    LogicalButton::DPadRight,
    LogicalButton::DPadDown,
    LogicalButton::X,
    LogicalButton::Y,
    LogicalButton::B,
    LogicalButton::A,
    LogicalButton::L1,
    LogicalButton::R1,
    LogicalButton::ZL,
    LogicalButton::ZR,
    LogicalButton::Select,
    LogicalButton::Start,
];

/// Raw indices that carry the d-pad on devices exposing it as discrete buttons
pub const GENERIC_DPAD_INDICES: [usize; 4] = [12, 13, 14, 15];

type TableEntry = (usize, Option<LogicalButton>);

// Several indices alias to the same logical id as fallbacks for pads that
// shift system/shoulder buttons around.
const GENERIC_TABLE: &[TableEntry] = &[
    (0, Some(LogicalButton::A)),
    (1, Some(LogicalButton::B)),
    (2, Some(LogicalButton::X)),
    (3, Some(LogicalButton::Y)),
    (4, Some(LogicalButton::L1)),
    (5, Some(LogicalButton::R1)),
    (6, Some(LogicalButton::Select)),
    (7, Some(LogicalButton::Start)),
    (8, Some(LogicalButton::Select)),
    (9, Some(LogicalButton::Start)),
    (10, Some(LogicalButton::L1)),
    (11, Some(LogicalButton::R1)),
    (12, Some(LogicalButton::DPadUp)),
    (13, Some(LogicalButton::DPadDown)),
    (14, Some(LogicalButton::DPadLeft)),
    (15, Some(LogicalButton::DPadRight)),
];

// Measured with the mapping tool on a Pro Controller. The pad reports the
// game-controller layout, so the generic layout does not apply at all: 5 and
// 15 are removed, ZL/ZR arrive on axes 4/5.
const SWITCH_PRO_OVERRIDES: &[TableEntry] = &[
    (0, Some(LogicalButton::A)),
    (1, Some(LogicalButton::B)),
    (2, Some(LogicalButton::X)),
    (3, Some(LogicalButton::Y)),
    (4, Some(LogicalButton::Select)),
    (5, None),
    (6, Some(LogicalButton::Start)),
    (7, Some(LogicalButton::L3)),
    (8, Some(LogicalButton::R3)),
    (9, Some(LogicalButton::L1)),
    (10, Some(LogicalButton::R1)),
    (11, Some(LogicalButton::DPadUp)),
    (12, Some(LogicalButton::DPadDown)),
    (13, Some(LogicalButton::DPadLeft)),
    (14, Some(LogicalButton::DPadRight)),
    (15, None),
];

const SNES_SWITCH_OVERRIDES: &[TableEntry] = &[
    (11, Some(LogicalButton::DPadUp)),
    (12, Some(LogicalButton::DPadDown)),
    (13, Some(LogicalButton::DPadLeft)),
    (14, Some(LogicalButton::DPadRight)),
    (9, Some(LogicalButton::L1)),
    (10, Some(LogicalButton::R1)),
    (0, Some(LogicalButton::A)),
    (1, Some(LogicalButton::B)),
    (2, Some(LogicalButton::X)),
    (3, Some(LogicalButton::Y)),
    (4, Some(LogicalButton::Select)),
    (6, Some(LogicalButton::Start)),
];

fn overrides_for(family: ControllerFamily) -> &'static [TableEntry] {
    match family {
        ControllerFamily::SwitchPro => SWITCH_PRO_OVERRIDES,
        ControllerFamily::SnesSwitch => SNES_SWITCH_OVERRIDES,
        ControllerFamily::PS4
        | ControllerFamily::PS5
        | ControllerFamily::Xbox
        | ControllerFamily::Generic => &[],
    }
}

/// Immutable raw index -> logical button lookup for one controller family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonMap {
    family: ControllerFamily,
    entries: BTreeMap<usize, LogicalButton>,
}

impl ButtonMap {
    /// Merges the generic table with the family overrides
    pub fn for_family(family: ControllerFamily) -> Self {
        let mut entries = BTreeMap::new();
        for (index, button) in GENERIC_TABLE {
            if let Some(button) = button {
                entries.insert(*index, *button);
            }
        }
        for (index, button) in overrides_for(family) {
            match button {
                Some(button) => {
                    entries.insert(*index, *button);
                }
                None => {
                    entries.remove(index);
                }
            }
        }
        Self { family, entries }
    }

    pub fn family(&self) -> ControllerFamily {
        self.family
    }

    pub fn get(&self, raw_index: usize) -> Option<LogicalButton> {
        self.entries.get(&raw_index).copied()
    }

    /// All raw indices that translate to `button`, ascending
    pub fn raw_indices_for(&self, button: LogicalButton) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|(_, mapped)| **mapped == button)
            .map(|(index, _)| *index)
            .collect()
    }
}

/// `map(family, raw_index)` without keeping a merged table around
pub fn map(family: ControllerFamily, raw_index: usize) -> Option<LogicalButton> {
    ButtonMap::for_family(family).get(raw_index)
}
