//! Controller variants and per-variant report shaping
//!
//! The variant is picked from the hardware generation and the pretend flag.
//! Each variant exposes one device profile to the host and one shaping
//! function that turns an accepted report into a [`PadState`] in the classic
//! button layout.

use crate::axis::{shape_sticks, AnalogPair};
use crate::config::{remap_buttons, RumbleMode, Settings};
use crate::report::types::ANALOG_BUTTON_THRESHOLD;
use crate::report::{InputReport, OriginalFields, XboxOneReport};
use serde::{Deserialize, Serialize};

pub const MICROSOFT_VENDOR_ID: u16 = 0x045e;
pub const XBOX_360_PRODUCT_ID: u16 = 0x028e;
pub const XBOX_ONE_PRODUCT_ID: u16 = 0x02d1;
pub const XBOX_ORIGINAL_PRODUCT_ID: u16 = 0x0202;

pub const CLASSIC_TRIGGER_MAX: u16 = 255;
pub const XBOX_ONE_TRIGGER_MAX: u16 = 1023;

/// Bit of the guide button in the classic layout.
pub const GUIDE_BIT: u16 = 10;

/// Hardware generation of the claimed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    Xbox360,
    XboxOriginal,
    XboxOne,
}

/// What discovery learned about the claimed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub hardware: ControllerType,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Device release number from the device descriptor.
    pub release: u16,
    pub has_accessory_port: bool,
}

impl DeviceInfo {
    pub fn xbox_360() -> Self {
        Self {
            hardware: ControllerType::Xbox360,
            vendor_id: MICROSOFT_VENDOR_ID,
            product_id: XBOX_360_PRODUCT_ID,
            release: 0x0114,
            has_accessory_port: true,
        }
    }

    pub fn xbox_one() -> Self {
        Self {
            hardware: ControllerType::XboxOne,
            vendor_id: MICROSOFT_VENDOR_ID,
            product_id: XBOX_ONE_PRODUCT_ID,
            release: 0x0101,
            has_accessory_port: false,
        }
    }

    pub fn xbox_original() -> Self {
        Self {
            hardware: ControllerType::XboxOriginal,
            vendor_id: MICROSOFT_VENDOR_ID,
            product_id: XBOX_ORIGINAL_PRODUCT_ID,
            release: 0x0100,
            has_accessory_port: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerVariant {
    Xbox360,
    /// Any classic pad presented with the reference identity.
    Xbox360Pretend,
    XboxOriginal,
    XboxOne,
    /// Newer generation presented as a classic pad.
    XboxOnePretend360,
}

/// What the host exposes for the pad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub trigger_max: u16,
}

/// Controller state handed to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadState {
    /// Classic layout: d-pad 0-3, start 4, back 5, stick clicks 6-7,
    /// bumpers 8-9, guide 10, A B X Y 12-15.
    pub buttons: u16,
    pub left_trigger: u16,
    pub right_trigger: u16,
    pub left: AnalogPair,
    pub right: AnalogPair,
}

impl ControllerVariant {
    /// Pretend only applies to generations that have a classic presentation.
    pub fn select(hardware: ControllerType, pretend: bool) -> Self {
        match (hardware, pretend) {
            (ControllerType::Xbox360, false) => ControllerVariant::Xbox360,
            (ControllerType::Xbox360, true) => ControllerVariant::Xbox360Pretend,
            (ControllerType::XboxOne, false) => ControllerVariant::XboxOne,
            (ControllerType::XboxOne, true) => ControllerVariant::XboxOnePretend360,
            (ControllerType::XboxOriginal, _) => ControllerVariant::XboxOriginal,
        }
    }

    pub fn hardware(&self) -> ControllerType {
        match self {
            ControllerVariant::Xbox360 | ControllerVariant::Xbox360Pretend => {
                ControllerType::Xbox360
            }
            ControllerVariant::XboxOriginal => ControllerType::XboxOriginal,
            ControllerVariant::XboxOne | ControllerVariant::XboxOnePretend360 => {
                ControllerType::XboxOne
            }
        }
    }

    pub fn profile(&self, device: &DeviceInfo) -> DeviceProfile {
        match self {
            ControllerVariant::Xbox360 => DeviceProfile {
                name: "Xbox 360 Wired Controller",
                vendor_id: device.vendor_id,
                product_id: device.product_id,
                trigger_max: CLASSIC_TRIGGER_MAX,
            },
            ControllerVariant::Xbox360Pretend | ControllerVariant::XboxOnePretend360 => {
                DeviceProfile {
                    name: "Xbox 360 Wired Controller",
                    vendor_id: MICROSOFT_VENDOR_ID,
                    product_id: XBOX_360_PRODUCT_ID,
                    trigger_max: CLASSIC_TRIGGER_MAX,
                }
            }
            ControllerVariant::XboxOriginal => DeviceProfile {
                name: "Xbox Controller",
                vendor_id: device.vendor_id,
                product_id: device.product_id,
                trigger_max: CLASSIC_TRIGGER_MAX,
            },
            ControllerVariant::XboxOne => DeviceProfile {
                name: "Xbox One Controller",
                vendor_id: device.vendor_id,
                product_id: device.product_id,
                trigger_max: XBOX_ONE_TRIGGER_MAX,
            },
        }
    }

    /// Shapes one report. `None` when the report kind does not belong to this
    /// variant.
    pub fn shape(
        &self,
        report: &InputReport,
        settings: &Settings,
        previous: &PadState,
    ) -> Option<PadState> {
        let raw = match (self.hardware(), report) {
            (ControllerType::Xbox360, InputReport::Standard(standard)) => {
                let fields = standard.classic();
                PadState {
                    buttons: fields.buttons,
                    left_trigger: u16::from(fields.left_trigger),
                    right_trigger: u16::from(fields.right_trigger),
                    left: fields.left,
                    right: fields.right,
                }
            }
            (ControllerType::XboxOriginal, InputReport::Standard(standard)) => {
                original_to_classic(&standard.original())
            }
            (ControllerType::XboxOne, InputReport::XboxOne(report)) => {
                let mut state = xbox_one_to_classic(report);
                if *self == ControllerVariant::XboxOnePretend360 {
                    state.left_trigger = rescale_trigger(state.left_trigger);
                    state.right_trigger = rescale_trigger(state.right_trigger);
                }
                // Input reports never carry the guide button, keep it held
                let mut state = finish(state, settings);
                state.buttons |= previous.buttons & guide_target(settings);
                return Some(state);
            }
            (ControllerType::XboxOne, InputReport::Guide(guide)) => {
                // Only the guide bit changes, everything else is already shaped
                let target = guide_target(settings);
                let mut state = *previous;
                if guide.pressed {
                    state.buttons |= target;
                } else {
                    state.buttons &= !target;
                }
                return Some(state);
            }
            _ => return None,
        };

        Some(finish(raw, settings))
    }
}

impl ControllerVariant {
    /// Packets written on the primary endpoint right after the first read is
    /// armed.
    pub fn init_writes(&self) -> Vec<Vec<u8>> {
        match self.hardware() {
            ControllerType::XboxOne => vec![
                vec![
                    0x01, 0x20, 0x00, 0x09, 0x00, 0x04, 0x20, 0x3a, 0x00, 0x00, 0x00, 0x80, 0x00,
                ],
                vec![0x05, 0x20, 0x00, 0x01, 0x00],
                vec![
                    0x09, 0x00, 0x00, 0x09, 0x00, 0x0F, 0x00, 0x00, 0x1D, 0x1D, 0xFF, 0x00, 0x00,
                ],
                vec![
                    0x09, 0x00, 0x00, 0x09, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                ],
            ],
            // LED off
            _ => vec![vec![0x01, 0x03, 0x00]],
        }
    }

    /// Rumble packet for this variant, `None` when rumble is switched off.
    pub fn rumble_packet(&self, strong: u8, weak: u8, mode: RumbleMode) -> Option<Vec<u8>> {
        match self.hardware() {
            ControllerType::Xbox360 => Some(vec![0x00, 0x08, 0x00, strong, weak, 0x00, 0x00, 0x00]),
            ControllerType::XboxOriginal => Some(vec![0x00, 0x06, 0x00, strong, 0x00, weak]),
            ControllerType::XboxOne => {
                let (mask, triggers, main) = match mode {
                    RumbleMode::Disabled => return None,
                    RumbleMode::Default => (0x03, (0, 0), (strong, weak)),
                    RumbleMode::Triggers => (0x0C, (strong, weak), (0, 0)),
                    RumbleMode::Both => (0x0F, (strong, weak), (strong, weak)),
                };
                Some(vec![
                    0x09, 0x00, 0x00, 0x09, 0x00, mask, triggers.0, triggers.1, main.0, main.1,
                    0xFF, 0x00, 0x00,
                ])
            }
        }
    }

    /// LED packet, classic family only.
    pub fn led_packet(&self, pattern: u8) -> Option<Vec<u8>> {
        match self.hardware() {
            ControllerType::Xbox360 => Some(vec![0x01, 0x03, pattern]),
            _ => None,
        }
    }
}

fn finish(mut state: PadState, settings: &Settings) -> PadState {
    if settings.remap_active() {
        state.buttons = remap_buttons(state.buttons, &settings.remap_table());
    }

    let (left, right) = shape_sticks(
        state.left,
        state.right,
        &settings.left_policy(),
        &settings.right_policy(),
    );
    if settings.swap_sticks {
        state.left = right;
        state.right = left;
    } else {
        state.left = left;
        state.right = right;
    }
    state
}

fn guide_target(settings: &Settings) -> u16 {
    if settings.remap_active() {
        remap_buttons(1u16 << GUIDE_BIT, &settings.remap_table())
    } else {
        1u16 << GUIDE_BIT
    }
}

fn rescale_trigger(value: u16) -> u16 {
    let clamped = u32::from(value.min(XBOX_ONE_TRIGGER_MAX));
    (clamped * u32::from(CLASSIC_TRIGGER_MAX) / u32::from(XBOX_ONE_TRIGGER_MAX)) as u16
}

/// (source bit in the newer layout, bit in the classic layout)
const XBOX_ONE_BUTTONS: [(u16, u16); 14] = [
    (2, 4),   // menu -> start
    (3, 5),   // view -> back
    (4, 12),  // A
    (5, 13),  // B
    (6, 14),  // X
    (7, 15),  // Y
    (8, 0),   // up
    (9, 1),   // down
    (10, 2),  // left
    (11, 3),  // right
    (12, 8),  // LB
    (13, 9),  // RB
    (14, 6),  // LS
    (15, 7),  // RS
];

fn xbox_one_to_classic(report: &XboxOneReport) -> PadState {
    let buttons = XBOX_ONE_BUTTONS
        .iter()
        .filter(|(source, _)| report.buttons & (1u16 << *source) != 0)
        .fold(0u16, |acc, (_, target)| acc | (1u16 << *target));

    PadState {
        buttons,
        left_trigger: report.left_trigger.min(XBOX_ONE_TRIGGER_MAX),
        right_trigger: report.right_trigger.min(XBOX_ONE_TRIGGER_MAX),
        left: report.left,
        right: report.right,
    }
}

/// Analog slots A, B, X, Y, black, white onto classic bits.
const ORIGINAL_ANALOG_BUTTONS: [(usize, u16); 6] = [(0, 12), (1, 13), (2, 14), (3, 15), (4, 9), (5, 8)];

fn original_to_classic(fields: &OriginalFields) -> PadState {
    let buttons = ORIGINAL_ANALOG_BUTTONS
        .iter()
        .filter(|(slot, _)| fields.analog[*slot] > ANALOG_BUTTON_THRESHOLD)
        .fold(u16::from(fields.digital), |acc, (_, bit)| acc | (1u16 << *bit));

    PadState {
        buttons,
        left_trigger: u16::from(fields.analog[6]),
        right_trigger: u16::from(fields.analog[7]),
        left: fields.left,
        right: fields.right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{classify_primary, PrimaryFrame};

    fn classic_report(buttons: u16, left: (i16, i16), right: (i16, i16)) -> InputReport {
        let mut raw = [0u8; 20];
        raw[1] = 20;
        raw[2..4].copy_from_slice(&buttons.to_le_bytes());
        raw[4] = 0x80;
        raw[5] = 0xFF;
        raw[6..8].copy_from_slice(&left.0.to_le_bytes());
        raw[8..10].copy_from_slice(&left.1.to_le_bytes());
        raw[10..12].copy_from_slice(&right.0.to_le_bytes());
        raw[12..14].copy_from_slice(&right.1.to_le_bytes());
        match classify_primary(&raw, raw.len()) {
            PrimaryFrame::Report(report) => report,
            other => panic!("fixture rejected: {:?}", other),
        }
    }

    fn xbox_one_report(buttons: u16, trigger: u16) -> InputReport {
        let mut raw = [0u8; 18];
        raw[0] = 0x20;
        raw[3] = 0x0e;
        raw[4..6].copy_from_slice(&buttons.to_le_bytes());
        raw[6..8].copy_from_slice(&trigger.to_le_bytes());
        raw[8..10].copy_from_slice(&trigger.to_le_bytes());
        match classify_primary(&raw, raw.len()) {
            PrimaryFrame::Report(report) => report,
            other => panic!("fixture rejected: {:?}", other),
        }
    }

    #[test]
    fn select_honours_pretend_only_where_it_applies() {
        assert_eq!(
            ControllerVariant::select(ControllerType::Xbox360, true),
            ControllerVariant::Xbox360Pretend
        );
        assert_eq!(
            ControllerVariant::select(ControllerType::XboxOne, true),
            ControllerVariant::XboxOnePretend360
        );
        assert_eq!(
            ControllerVariant::select(ControllerType::XboxOriginal, true),
            ControllerVariant::XboxOriginal
        );
    }

    #[test]
    fn pretend_profile_uses_reference_identity() {
        let device = DeviceInfo {
            vendor_id: 0x0f0d,
            product_id: 0x000a,
            ..DeviceInfo::xbox_360()
        };
        let plain = ControllerVariant::Xbox360.profile(&device);
        let pretend = ControllerVariant::Xbox360Pretend.profile(&device);
        assert_eq!((plain.vendor_id, plain.product_id), (0x0f0d, 0x000a));
        assert_eq!(
            (pretend.vendor_id, pretend.product_id),
            (MICROSOFT_VENDOR_ID, XBOX_360_PRODUCT_ID)
        );
        assert_eq!(
            ControllerVariant::XboxOne.profile(&DeviceInfo::xbox_one()).trigger_max,
            XBOX_ONE_TRIGGER_MAX
        );
    }

    #[test]
    fn classic_report_passes_through_with_default_settings() {
        let report = classic_report(0x1010, (100, -100), (i16::MAX, i16::MIN));
        let state = ControllerVariant::Xbox360
            .shape(&report, &Settings::default(), &PadState::default())
            .expect("classic report");
        assert_eq!(state.buttons, 0x1010);
        assert_eq!(state.left_trigger, 0x80);
        assert_eq!(state.right_trigger, 0xFF);
        assert_eq!(state.left, AnalogPair::new(100, -100));
        assert_eq!(state.right, AnalogPair::new(i16::MAX, i16::MIN));
    }

    #[test]
    fn settings_shape_remap_and_swap() {
        let mut settings = Settings::default();
        settings.deadzone_left = 5000;
        settings.bindings.a = 13;
        settings.swap_sticks = true;

        let report = classic_report(1 << 12, (100, 4000), (20000, 0));
        let state = ControllerVariant::Xbox360
            .shape(&report, &settings, &PadState::default())
            .expect("classic report");

        assert_eq!(state.buttons, 1 << 13);
        // Physical left stick is zeroed by its dead-zone and then moved right
        assert_eq!(state.right, AnalogPair::CENTERED);
        assert_eq!(state.left, AnalogPair::new(20000, 0));
    }

    #[test]
    fn foreign_report_kind_is_dropped() {
        let report = xbox_one_report(0, 0);
        assert!(ControllerVariant::Xbox360
            .shape(&report, &Settings::default(), &PadState::default())
            .is_none());
    }

    #[test]
    fn xbox_one_buttons_map_to_classic_layout() {
        // A and menu
        let report = xbox_one_report((1 << 4) | (1 << 2), 1023);
        let state = ControllerVariant::XboxOne
            .shape(&report, &Settings::default(), &PadState::default())
            .expect("input report");
        assert_eq!(state.buttons, (1 << 12) | (1 << 4));
        assert_eq!(state.left_trigger, 1023);
    }

    #[test]
    fn pretend_rescales_triggers() {
        let state = ControllerVariant::XboxOnePretend360
            .shape(&xbox_one_report(0, 1023), &Settings::default(), &PadState::default())
            .expect("input report");
        assert_eq!(state.left_trigger, 255);

        let state = ControllerVariant::XboxOnePretend360
            .shape(&xbox_one_report(0, 512), &Settings::default(), &PadState::default())
            .expect("input report");
        assert_eq!(state.right_trigger, 127);
    }

    #[test]
    fn guide_report_folds_into_previous_state() {
        let previous = PadState {
            buttons: 1 << 12,
            left_trigger: 40,
            ..Default::default()
        };
        let guide = [0x07u8, 0x20, 0x01, 0x02, 0x01, 0x5b];
        let report = classify_primary(&guide, guide.len()).report().expect("guide");

        let state = ControllerVariant::XboxOne
            .shape(&report, &Settings::default(), &previous)
            .expect("guide report");
        assert_eq!(state.buttons, (1 << 12) | (1 << GUIDE_BIT));
        assert_eq!(state.left_trigger, 40);
    }

    #[test]
    fn held_guide_survives_following_input_reports() {
        let guide = [0x07u8, 0x20, 0x01, 0x02, 0x01, 0x5b];
        let guide = classify_primary(&guide, guide.len()).report().expect("guide");
        let held = ControllerVariant::XboxOne
            .shape(&guide, &Settings::default(), &PadState::default())
            .expect("guide report");

        // A
        let input = xbox_one_report(1 << 4, 0);
        let state = ControllerVariant::XboxOne
            .shape(&input, &Settings::default(), &held)
            .expect("input report");
        assert_eq!(state.buttons, (1 << 12) | (1 << GUIDE_BIT));

        let released = [0x07u8, 0x20, 0x02, 0x02, 0x00, 0x5b];
        let released = classify_primary(&released, released.len()).report().expect("guide");
        let state = ControllerVariant::XboxOne
            .shape(&released, &Settings::default(), &state)
            .expect("guide report");
        let state = ControllerVariant::XboxOne
            .shape(&input, &Settings::default(), &state)
            .expect("input report");
        assert_eq!(state.buttons, 1 << 12);
    }

    #[test]
    fn original_analog_buttons_use_threshold() {
        let mut raw = [0u8; 20];
        raw[1] = 20;
        raw[2] = 0x10; // start
        raw[4] = ANALOG_BUTTON_THRESHOLD + 1; // A
        raw[5] = ANALOG_BUTTON_THRESHOLD; // B, not pressed
        raw[10] = 0x40; // left trigger
        let report = classify_primary(&raw, raw.len()).report().expect("standard");

        let state = ControllerVariant::XboxOriginal
            .shape(&report, &Settings::default(), &PadState::default())
            .expect("original report");
        assert_eq!(state.buttons, (1 << 4) | (1 << 12));
        assert_eq!(state.left_trigger, 0x40);
    }

    #[test]
    fn rumble_packets_follow_variant_and_mode() {
        assert_eq!(
            ControllerVariant::Xbox360Pretend.rumble_packet(0x40, 0x80, RumbleMode::Default),
            Some(vec![0x00, 0x08, 0x00, 0x40, 0x80, 0x00, 0x00, 0x00])
        );
        assert_eq!(
            ControllerVariant::XboxOriginal.rumble_packet(0x40, 0x80, RumbleMode::Both),
            Some(vec![0x00, 0x06, 0x00, 0x40, 0x00, 0x80])
        );

        let one = ControllerVariant::XboxOne;
        assert_eq!(one.rumble_packet(1, 2, RumbleMode::Disabled), None);
        let main = one.rumble_packet(1, 2, RumbleMode::Default).expect("main motors");
        assert_eq!(main.len(), 13);
        assert_eq!(&main[5..10], &[0x03, 0, 0, 1, 2]);
        let triggers = one.rumble_packet(1, 2, RumbleMode::Triggers).expect("triggers");
        assert_eq!(&triggers[5..10], &[0x0C, 1, 2, 0, 0]);
        let both = one.rumble_packet(1, 2, RumbleMode::Both).expect("both");
        assert_eq!(&both[5..10], &[0x0F, 1, 2, 1, 2]);
    }

    #[test]
    fn led_and_init_packets() {
        assert_eq!(
            ControllerVariant::Xbox360.led_packet(0x06),
            Some(vec![0x01, 0x03, 0x06])
        );
        assert_eq!(ControllerVariant::XboxOnePretend360.led_packet(0x06), None);
        assert_eq!(ControllerVariant::XboxOne.init_writes().len(), 4);
        assert_eq!(
            ControllerVariant::XboxOriginal.init_writes(),
            vec![vec![0x01, 0x03, 0x00]]
        );
    }
}
