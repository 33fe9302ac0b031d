use padlink::report::{
    classify_accessory, classify_primary, DiscardReason, InputReport, PrimaryFrame,
    STANDARD_REPORT_LEN,
};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn classification_never_panics(
        buffer in proptest::collection::vec(any::<u8>(), 0..64),
        received in 0usize..128,
    ) {
        let _ = classify_primary(&buffer, received);
        let _ = classify_accessory(&buffer, received);
    }

    #[test]
    fn unknown_commands_are_discarded(
        command in any::<u8>(),
        tail in proptest::collection::vec(any::<u8>(), 0..40),
    ) {
        prop_assume!(![0x00u8, 0x20, 0x07].contains(&command));
        let mut buffer = vec![command];
        buffer.extend(tail);
        prop_assert_eq!(
            classify_primary(&buffer, buffer.len()),
            PrimaryFrame::Discard(DiscardReason::UnknownCommand(command))
        );
    }

    #[test]
    fn standard_reports_need_declared_size_twenty(
        declared in any::<u8>(),
        payload in proptest::collection::vec(any::<u8>(), 18),
    ) {
        let mut buffer = vec![0x00, declared];
        buffer.extend(payload);
        let frame = classify_primary(&buffer, buffer.len());
        if usize::from(declared) == STANDARD_REPORT_LEN {
            let standard = matches!(frame, PrimaryFrame::Report(InputReport::Standard(_)));
            prop_assert!(standard, "expected a standard report, got {:?}", frame);
        } else {
            let mismatch = matches!(frame, PrimaryFrame::Discard(DiscardReason::SizeMismatch { .. }));
            prop_assert!(mismatch, "expected a size mismatch, got {:?}", frame);
        }
    }

    #[test]
    fn accessory_accepts_exactly_zero_prefixed_five_byte_frames(
        buffer in proptest::collection::vec(any::<u8>(), 0..12),
    ) {
        let accepted = classify_accessory(&buffer, buffer.len());
        let expected = buffer.len() == 5 && buffer[0] == 0x00;
        prop_assert_eq!(accepted.is_some(), expected);
        if let Some(frame) = accepted {
            prop_assert_eq!(&frame.as_bytes()[..], &buffer[..]);
        }
    }
}
