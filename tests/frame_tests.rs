//! Tests for the `frame.rs` module: structural validation of received long
//! frames and packing of the frames the reader transmits.

use mbus_heatmeter::error::FrameError;
use mbus_heatmeter::mbus::frame::{calculate_checksum, pack_frame, validate_frame};
use proptest::prelude::*;

/// Tests that the Step 1 request packs to the exact bytes the meter expects.
#[test]
fn test_pack_step1_request() {
    let bytes = pack_frame(0x53, 0xFE, 0x51, &[0x0F, 0x00, 0x00, 0x04, 0x5C]);
    assert_eq!(
        bytes.as_ref(),
        &[0x68, 0x08, 0x08, 0x68, 0x53, 0xFE, 0x51, 0x0F, 0x00, 0x00, 0x04, 0x5C, 0x11, 0x16]
    );
}

/// Tests that a valid long frame is split into its fields.
#[test]
fn test_validate_long_frame() {
    let bytes = [
        0x68, 0x08, 0x08, 0x68, 0x53, 0x01, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x63, 0x16,
    ];
    let frame = validate_frame(&bytes).unwrap();
    assert_eq!(frame.control, 0x53);
    assert_eq!(frame.address, 0x01);
    assert_eq!(frame.control_information, 0x00);
    assert_eq!(frame.data, vec![0x01, 0x02, 0x03, 0x04, 0x05]);
    assert_eq!(frame.checksum, 0x63);
    assert_eq!(calculate_checksum(&frame.payload()), frame.checksum);
}

/// Tests that a wrong first or fourth byte is reported as a bad start.
#[test]
fn test_bad_start() {
    let mut bytes = pack_frame(0x08, 0x00, 0x72, &[0x01]).to_vec();
    bytes[0] = 0x10;
    assert_eq!(validate_frame(&bytes), Err(FrameError::BadStart));

    let mut bytes = pack_frame(0x08, 0x00, 0x72, &[0x01]).to_vec();
    bytes[3] = 0x69;
    assert_eq!(validate_frame(&bytes), Err(FrameError::BadStart));
}

/// Tests that disagreeing length fields are reported before the stop byte.
#[test]
fn test_bad_length() {
    let mut bytes = pack_frame(0x08, 0x00, 0x72, &[0x01]).to_vec();
    bytes[2] = 0x05;
    let last = bytes.len() - 1;
    bytes[last] = 0x00;
    assert_eq!(
        validate_frame(&bytes),
        Err(FrameError::BadLength {
            first: 0x04,
            second: 0x05
        })
    );
}

/// Tests that an intact frame with L below 3 is reported as missing its header.
#[test]
fn test_frame_without_header_fields() {
    let bytes = [0x68, 0x00, 0x00, 0x68, 0x00, 0x16];
    assert_eq!(
        validate_frame(&bytes),
        Err(FrameError::MissingHeader { declared: 0x00 })
    );
}

/// Tests that a candidate whose size disagrees with L is rejected.
#[test]
fn test_length_mismatch() {
    let mut bytes = pack_frame(0x08, 0x00, 0x72, &[0x01]).to_vec();
    bytes.insert(7, 0x00);
    assert!(matches!(
        validate_frame(&bytes),
        Err(FrameError::LengthMismatch { declared: 0x04, .. })
    ));
}

/// Tests that a wrong stop byte is reported.
#[test]
fn test_bad_stop() {
    let mut bytes = pack_frame(0x08, 0x00, 0x72, &[0x01]).to_vec();
    let last = bytes.len() - 1;
    bytes[last] = 0x17;
    assert_eq!(validate_frame(&bytes), Err(FrameError::BadStop(0x17)));
}

/// Tests that a wrong checksum is reported with both values.
#[test]
fn test_bad_checksum() {
    let mut bytes = pack_frame(0x08, 0x00, 0x72, &[0x01]).to_vec();
    let index = bytes.len() - 2;
    let expected = bytes[index];
    bytes[index] = expected.wrapping_add(1);
    assert_eq!(
        validate_frame(&bytes),
        Err(FrameError::BadChecksum {
            expected: expected.wrapping_add(1),
            calculated: expected
        })
    );
}

proptest! {
    /// Packed frames always validate and carry their fields through.
    #[test]
    fn packed_frames_validate(
        control in any::<u8>(),
        address in any::<u8>(),
        ci in any::<u8>(),
        data in proptest::collection::vec(any::<u8>(), 0..=252),
    ) {
        let bytes = pack_frame(control, address, ci, &data);
        let frame = validate_frame(&bytes).unwrap();
        prop_assert_eq!(frame.control, control);
        prop_assert_eq!(frame.address, address);
        prop_assert_eq!(frame.control_information, ci);
        prop_assert_eq!(frame.data, data);
    }

    /// Changing any single byte covered by the checksum causes rejection.
    #[test]
    fn single_byte_corruption_is_rejected(
        data in proptest::collection::vec(any::<u8>(), 0..=64),
        position in any::<prop::sample::Index>(),
        delta in 1u8..=255,
    ) {
        let mut bytes = pack_frame(0x08, 0x00, 0x72, &data).to_vec();
        let index = 4 + position.index(bytes.len() - 6);
        bytes[index] = bytes[index].wrapping_add(delta);
        let rejected = matches!(validate_frame(&bytes), Err(FrameError::BadChecksum { .. }));
        prop_assert!(rejected);
    }
}
