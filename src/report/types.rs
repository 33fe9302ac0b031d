//! Typed views over accepted report buffers
//!
//! All multi-byte fields are little-endian on the wire and decoded into host
//! order here, so everything downstream works on canonical values.

use crate::axis::AnalogPair;
use serde::{Deserialize, Serialize};

/// Command id of the standard input report.
pub const STANDARD_REPORT_COMMAND: u8 = 0x00;
/// Declared and actual size of the standard input report.
pub const STANDARD_REPORT_LEN: usize = 20;
/// Command id of the input report of the newer hardware generation.
pub const XBOX_ONE_INPUT_COMMAND: u8 = 0x20;
/// Minimum length of a newer-generation input report.
pub const XBOX_ONE_INPUT_LEN: usize = 18;
/// Command id of the guide button report of the newer hardware generation.
pub const XBOX_ONE_GUIDE_COMMAND: u8 = 0x07;
/// Minimum length of a guide button report.
pub const XBOX_ONE_GUIDE_LEN: usize = 5;
/// Exact length of an accessory frame.
pub const ACCESSORY_FRAME_LEN: usize = 5;

/// Analog face buttons of the original pad count as pressed above this value.
pub const ANALOG_BUTTON_THRESHOLD: u8 = 0x20;

fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// The 20-byte standard input report.
///
/// The same header is used by two layouts; which one applies depends on the
/// hardware, so the raw payload is kept and decoded on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardReport {
    raw: [u8; STANDARD_REPORT_LEN],
}

impl StandardReport {
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; STANDARD_REPORT_LEN];
        raw.copy_from_slice(&bytes[..STANDARD_REPORT_LEN]);
        Self { raw }
    }

    /// Decodes the layout used by the classic wired and wireless pads.
    pub fn classic(&self) -> ClassicFields {
        ClassicFields {
            buttons: read_u16(&self.raw, 2),
            left_trigger: self.raw[4],
            right_trigger: self.raw[5],
            left: AnalogPair::new(read_i16(&self.raw, 6), read_i16(&self.raw, 8)),
            right: AnalogPair::new(read_i16(&self.raw, 10), read_i16(&self.raw, 12)),
        }
    }

    /// Decodes the layout used by the original generation.
    pub fn original(&self) -> OriginalFields {
        let mut analog = [0u8; 8];
        analog.copy_from_slice(&self.raw[4..12]);
        OriginalFields {
            digital: self.raw[2],
            analog,
            left: AnalogPair::new(read_i16(&self.raw, 12), read_i16(&self.raw, 14)),
            right: AnalogPair::new(read_i16(&self.raw, 16), read_i16(&self.raw, 18)),
        }
    }
}

/// Fields of the classic layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassicFields {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub left: AnalogPair,
    pub right: AnalogPair,
}

/// Fields of the original-generation layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalFields {
    /// D-pad, start, back and stick clicks, same bit order as the classic layout.
    pub digital: u8,
    /// A, B, X, Y, black, white, left trigger, right trigger.
    pub analog: [u8; 8],
    pub left: AnalogPair,
    pub right: AnalogPair,
}

/// Input report of the newer hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XboxOneReport {
    pub sequence: u8,
    pub buttons: u16,
    /// 10-bit trigger values.
    pub left_trigger: u16,
    pub right_trigger: u16,
    pub left: AnalogPair,
    pub right: AnalogPair,
}

impl XboxOneReport {
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self {
            sequence: bytes[2],
            buttons: read_u16(bytes, 4),
            left_trigger: read_u16(bytes, 6),
            right_trigger: read_u16(bytes, 8),
            left: AnalogPair::new(read_i16(bytes, 10), read_i16(bytes, 12)),
            right: AnalogPair::new(read_i16(bytes, 14), read_i16(bytes, 16)),
        }
    }
}

/// Guide button report of the newer hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuideReport {
    pub pressed: bool,
}

impl GuideReport {
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self {
            pressed: bytes[4] & 0x01 != 0,
        }
    }
}

/// An accepted primary-channel report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputReport {
    Standard(StandardReport),
    XboxOne(XboxOneReport),
    Guide(GuideReport),
}

/// A 5-byte accessory frame. The first byte is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessoryFrame {
    raw: [u8; ACCESSORY_FRAME_LEN],
}

impl AccessoryFrame {
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; ACCESSORY_FRAME_LEN];
        raw.copy_from_slice(&bytes[..ACCESSORY_FRAME_LEN]);
        Self { raw }
    }

    pub fn as_bytes(&self) -> &[u8; ACCESSORY_FRAME_LEN] {
        &self.raw
    }

    /// The four payload bytes after the zero prefix.
    pub fn payload(&self) -> [u8; 4] {
        [self.raw[1], self.raw[2], self.raw[3], self.raw[4]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_fields_decode_little_endian() {
        let mut raw = [0u8; STANDARD_REPORT_LEN];
        raw[1] = 0x14;
        raw[2] = 0x10; // start
        raw[3] = 0x10; // A
        raw[4] = 0xFF;
        raw[5] = 0x01;
        raw[6..8].copy_from_slice(&(-2i16).to_le_bytes());
        raw[8..10].copy_from_slice(&1234i16.to_le_bytes());
        raw[10..12].copy_from_slice(&i16::MIN.to_le_bytes());
        raw[12..14].copy_from_slice(&i16::MAX.to_le_bytes());

        let fields = StandardReport::from_slice(&raw).classic();
        assert_eq!(fields.buttons, 0x1010);
        assert_eq!(fields.left_trigger, 0xFF);
        assert_eq!(fields.right_trigger, 0x01);
        assert_eq!(fields.left, AnalogPair::new(-2, 1234));
        assert_eq!(fields.right, AnalogPair::new(i16::MIN, i16::MAX));
    }

    #[test]
    fn original_fields_decode_analog_buttons_and_sticks() {
        let mut raw = [0u8; STANDARD_REPORT_LEN];
        raw[1] = 0x14;
        raw[2] = 0x01;
        raw[4] = 0xFF;
        raw[11] = 0x80;
        raw[12..14].copy_from_slice(&(-300i16).to_le_bytes());
        raw[18..20].copy_from_slice(&300i16.to_le_bytes());

        let fields = StandardReport::from_slice(&raw).original();
        assert_eq!(fields.digital, 0x01);
        assert_eq!(fields.analog[0], 0xFF);
        assert_eq!(fields.analog[7], 0x80);
        assert_eq!(fields.left.x, -300);
        assert_eq!(fields.right.y, 300);
    }

    #[test]
    fn xbox_one_report_decodes_ten_bit_triggers() {
        let mut raw = [0u8; XBOX_ONE_INPUT_LEN];
        raw[0] = XBOX_ONE_INPUT_COMMAND;
        raw[2] = 7;
        raw[3] = 0x0e;
        raw[4..6].copy_from_slice(&0x0010u16.to_le_bytes());
        raw[6..8].copy_from_slice(&1023u16.to_le_bytes());
        raw[16..18].copy_from_slice(&(-5i16).to_le_bytes());

        let report = XboxOneReport::from_slice(&raw);
        assert_eq!(report.sequence, 7);
        assert_eq!(report.buttons, 0x0010);
        assert_eq!(report.left_trigger, 1023);
        assert_eq!(report.right_trigger, 0);
        assert_eq!(report.right.y, -5);
    }
}
