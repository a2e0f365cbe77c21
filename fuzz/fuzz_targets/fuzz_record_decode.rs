#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_heatmeter::payload::record::RecordDecoder;

fuzz_target!(|data: &[u8]| {
    let mut errors = 0;
    for item in RecordDecoder::new(data) {
        if item.is_err() {
            errors += 1;
        }
    }
    // Decoding stops at the first error
    assert!(errors <= 1);
});
