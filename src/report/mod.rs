//! Report codec
//!
//! Classifies completed read buffers. Anything that is not a whitelisted
//! report is a [`Discard`](PrimaryFrame::Discard), never an error: keepalives
//! and unknown vendor frames are normal traffic on both channels.

pub mod types;

pub use types::{
    AccessoryFrame, ClassicFields, GuideReport, InputReport, OriginalFields, StandardReport,
    XboxOneReport, ACCESSORY_FRAME_LEN, STANDARD_REPORT_COMMAND, STANDARD_REPORT_LEN,
    XBOX_ONE_GUIDE_COMMAND, XBOX_ONE_INPUT_COMMAND,
};

use types::{XBOX_ONE_GUIDE_LEN, XBOX_ONE_INPUT_LEN};

/// Why a primary-channel buffer was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Empty,
    UnknownCommand(u8),
    SizeMismatch { command: u8, declared: u8 },
    Truncated { command: u8, received: usize, needed: usize },
}

/// Result of classifying one primary-channel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryFrame {
    Report(InputReport),
    Discard(DiscardReason),
}

impl PrimaryFrame {
    pub fn report(self) -> Option<InputReport> {
        match self {
            PrimaryFrame::Report(report) => Some(report),
            PrimaryFrame::Discard(_) => None,
        }
    }
}

/// Classifies the first `received` bytes of a primary-channel buffer.
///
/// `received` is clamped to the buffer length.
pub fn classify_primary(buffer: &[u8], received: usize) -> PrimaryFrame {
    let data = &buffer[..received.min(buffer.len())];

    let Some(&command) = data.first() else {
        return PrimaryFrame::Discard(DiscardReason::Empty);
    };

    let needed = match command {
        STANDARD_REPORT_COMMAND => {
            let declared = data.get(1).copied().unwrap_or(0);
            if usize::from(declared) != STANDARD_REPORT_LEN {
                return PrimaryFrame::Discard(DiscardReason::SizeMismatch { command, declared });
            }
            STANDARD_REPORT_LEN
        }
        XBOX_ONE_INPUT_COMMAND => XBOX_ONE_INPUT_LEN,
        XBOX_ONE_GUIDE_COMMAND => XBOX_ONE_GUIDE_LEN,
        other => return PrimaryFrame::Discard(DiscardReason::UnknownCommand(other)),
    };

    if data.len() < needed {
        return PrimaryFrame::Discard(DiscardReason::Truncated {
            command,
            received: data.len(),
            needed,
        });
    }

    let report = match command {
        STANDARD_REPORT_COMMAND => InputReport::Standard(StandardReport::from_slice(data)),
        XBOX_ONE_INPUT_COMMAND => InputReport::XboxOne(XboxOneReport::from_slice(data)),
        _ => InputReport::Guide(GuideReport::from_slice(data)),
    };
    PrimaryFrame::Report(report)
}

/// Classifies the first `received` bytes of an accessory-channel buffer.
///
/// Only frames of exactly [`ACCESSORY_FRAME_LEN`] bytes starting with zero are
/// accepted.
pub fn classify_accessory(buffer: &[u8], received: usize) -> Option<AccessoryFrame> {
    if received != ACCESSORY_FRAME_LEN || buffer.len() < ACCESSORY_FRAME_LEN {
        return None;
    }
    if buffer[0] != 0x00 {
        return None;
    }
    Some(AccessoryFrame::from_slice(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard_buffer() -> Vec<u8> {
        let mut buffer = vec![0u8; 32];
        buffer[0] = STANDARD_REPORT_COMMAND;
        buffer[1] = STANDARD_REPORT_LEN as u8;
        buffer
    }

    #[test]
    fn standard_report_is_accepted() {
        let buffer = standard_buffer();
        let frame = classify_primary(&buffer, STANDARD_REPORT_LEN);
        assert!(matches!(frame, PrimaryFrame::Report(InputReport::Standard(_))));
    }

    #[test]
    fn standard_command_with_wrong_declared_size_is_discarded() {
        let mut buffer = standard_buffer();
        buffer[1] = 0x03; // LED status frame
        assert_eq!(
            classify_primary(&buffer, 3),
            PrimaryFrame::Discard(DiscardReason::SizeMismatch {
                command: 0x00,
                declared: 0x03
            })
        );
    }

    #[test]
    fn standard_report_shorter_than_declared_is_discarded() {
        let buffer = standard_buffer();
        assert_eq!(
            classify_primary(&buffer, 12),
            PrimaryFrame::Discard(DiscardReason::Truncated {
                command: 0x00,
                received: 12,
                needed: STANDARD_REPORT_LEN
            })
        );
    }

    #[test]
    fn unknown_command_is_discarded() {
        let buffer = [0x08u8, 0x80, 0x00];
        assert_eq!(
            classify_primary(&buffer, buffer.len()),
            PrimaryFrame::Discard(DiscardReason::UnknownCommand(0x08))
        );
    }

    #[test]
    fn empty_completion_is_discarded() {
        assert_eq!(
            classify_primary(&[0u8; 20], 0),
            PrimaryFrame::Discard(DiscardReason::Empty)
        );
    }

    #[test]
    fn vendor_commands_are_accepted_regardless_of_declared_size() {
        let mut input = [0u8; XBOX_ONE_INPUT_LEN];
        input[0] = XBOX_ONE_INPUT_COMMAND;
        input[3] = 0x0e;
        assert!(matches!(
            classify_primary(&input, input.len()),
            PrimaryFrame::Report(InputReport::XboxOne(_))
        ));

        let guide = [XBOX_ONE_GUIDE_COMMAND, 0x20, 0x01, 0x02, 0x01, 0x5b];
        assert_eq!(
            classify_primary(&guide, guide.len()),
            PrimaryFrame::Report(InputReport::Guide(GuideReport { pressed: true }))
        );
    }

    #[test]
    fn received_length_is_clamped_to_buffer() {
        let buffer = standard_buffer();
        assert!(classify_primary(&buffer, 4096).report().is_some());
    }

    #[test]
    fn accessory_frame_rules() {
        let buffer = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB];
        let frame = classify_accessory(&buffer, 5).expect("valid frame");
        assert_eq!(frame.payload(), [0x01, 0x02, 0x03, 0x04]);

        assert!(classify_accessory(&buffer, 4).is_none());
        assert!(classify_accessory(&buffer, 6).is_none());
        assert!(classify_accessory(&[0xF0, 0x03, 0x00, 0x00, 0x00], 5).is_none());
        assert!(classify_accessory(&[0x00, 0x00], 5).is_none());
    }
}
