//! Controller family detection from the device name

use crate::controller::device::{DeviceCaps, DeviceId, DeviceInfo};
use crate::controller::mapping::ButtonMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerFamily {
    SwitchPro,
    SnesSwitch,
    PS4,
    PS5,
    Xbox,
    Generic,
}

impl fmt::Display for ControllerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerFamily::SwitchPro => write!(f, "switch_pro"),
            ControllerFamily::SnesSwitch => write!(f, "snes_switch"),
            ControllerFamily::PS4 => write!(f, "ps4"),
            ControllerFamily::PS5 => write!(f, "ps5"),
            ControllerFamily::Xbox => write!(f, "xbox"),
            ControllerFamily::Generic => write!(f, "generic"),
        }
    }
}

// First match wins, "switch pro" has to come before the plain "switch".
const FAMILY_PATTERNS: &[(&[&str], ControllerFamily)] = &[
    (&["pro controller", "switch pro"], ControllerFamily::SwitchPro),
    (&["nintendo", "switch", "snes"], ControllerFamily::SnesSwitch),
    (&["ps4", "dualshock"], ControllerFamily::PS4),
    (&["ps5", "dualsense"], ControllerFamily::PS5),
    (&["xbox", "microsoft"], ControllerFamily::Xbox),
];

/// Classifies a device by case-insensitive substring match on its name
pub fn classify(name: &str) -> ControllerFamily {
    let name = name.to_lowercase();
    FAMILY_PATTERNS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| name.contains(needle)))
        .map(|(_, family)| *family)
        .unwrap_or(ControllerFamily::Generic)
}

/// True when the hat is authoritative for the d-pad
///
/// Nintendo pads with a hat also echo d-pad motion on discrete buttons.
pub fn hat_only_dpad(name: &str, caps: DeviceCaps) -> bool {
    let name = name.to_lowercase();
    caps.hats > 0 && (name.contains("nintendo") || name.contains("switch"))
}

/// Everything derived once when a device becomes the active one
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub id: DeviceId,
    pub name: String,
    pub caps: DeviceCaps,
    pub family: ControllerFamily,
    pub hat_only_dpad: bool,
    pub button_map: ButtonMap,
}

impl DeviceProfile {
    pub fn detect(info: &DeviceInfo) -> Self {
        let family = classify(&info.name);
        let hat_only_dpad = hat_only_dpad(&info.name, info.caps);
        info!(
            "Device {} '{}' classified as {} (buttons: {}, axes: {}, hats: {}, hat_only_dpad={})",
            info.id,
            info.name,
            family,
            info.caps.buttons,
            info.caps.axes,
            info.caps.hats,
            hat_only_dpad
        );

        Self {
            id: info.id,
            name: info.name.clone(),
            caps: info.caps,
            family,
            hat_only_dpad,
            button_map: ButtonMap::for_family(family),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pro_controller_wins_over_plain_switch() {
        assert_eq!(classify("Pro Controller"), ControllerFamily::SwitchPro);
        assert_eq!(
            classify("Nintendo Switch Pro Controller"),
            ControllerFamily::SwitchPro
        );
        assert_eq!(
            classify("SNES Controller for Switch"),
            ControllerFamily::SnesSwitch
        );
    }

    #[test]
    fn vendor_names_map_to_families() {
        assert_eq!(classify("PS4 Controller"), ControllerFamily::PS4);
        assert_eq!(
            classify("Sony Interactive Entertainment DualShock 4"),
            ControllerFamily::PS4
        );
        assert_eq!(classify("DualSense Wireless Controller"), ControllerFamily::PS5);
        assert_eq!(classify("Xbox Series X Controller"), ControllerFamily::Xbox);
        assert_eq!(classify("Microsoft X-Box 360 pad"), ControllerFamily::Xbox);
        assert_eq!(classify("8BitDo SN30"), ControllerFamily::Generic);
        assert_eq!(classify(""), ControllerFamily::Generic);
    }

    #[test]
    fn hat_only_needs_a_hat_and_a_nintendo_name() {
        let with_hat = DeviceCaps {
            buttons: 15,
            axes: 4,
            hats: 1,
        };
        let without_hat = DeviceCaps { hats: 0, ..with_hat };

        assert!(hat_only_dpad("SNES Controller for Switch", with_hat));
        assert!(hat_only_dpad("Nintendo Co., Ltd. Pad", with_hat));
        assert!(!hat_only_dpad("SNES Controller for Switch", without_hat));
        assert!(!hat_only_dpad("Xbox Controller", with_hat));
    }

    #[test]
    fn profile_merges_the_family_table() {
        let info = DeviceInfo {
            id: DeviceId(3),
            name: "Pro Controller".to_string(),
            caps: DeviceCaps {
                buttons: 15,
                axes: 6,
                hats: 0,
            },
        };
        let profile = DeviceProfile::detect(&info);
        assert_eq!(profile.family, ControllerFamily::SwitchPro);
        assert!(!profile.hat_only_dpad);
        assert_eq!(profile.button_map.family(), ControllerFamily::SwitchPro);
    }
}
