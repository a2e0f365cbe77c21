#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_heatmeter::mbus::frame::{refresh_checksum, validate_frame};
use mbus_heatmeter::payload::record::decode_telegram;

fuzz_target!(|data: &[u8]| {
    // Arbitrary candidates must be rejected or accepted, never panic
    let _ = validate_frame(data);

    // Force consistent length fields and checksum so decoding is reached
    if data.len() >= 9 && data.len() <= 261 {
        let mut candidate = data.to_vec();
        let length = (candidate.len() - 6) as u8;
        candidate[0] = 0x68;
        candidate[1] = length;
        candidate[2] = length;
        candidate[3] = 0x68;
        candidate[4] = 0x08;
        candidate[6] = 0x72;
        let last = candidate.len() - 1;
        candidate[last] = 0x16;
        refresh_checksum(&mut candidate);

        let frame = validate_frame(&candidate).expect("repaired frame must validate");
        let _ = decode_telegram(&frame);
    }
});
