#![no_main]

use libfuzzer_sys::fuzz_target;
use mbus_heatmeter::mbus::sync::{FeedResult, FrameSynchronizer};

fuzz_target!(|data: &[u8]| {
    let mut sync = FrameSynchronizer::new();
    for &byte in data {
        match sync.feed(byte) {
            FeedResult::FrameReady(frame) => {
                assert_eq!(frame[0], 0x68);
                assert_eq!(frame.len(), frame[1] as usize + 6);
            }
            FeedResult::FrameTooLong(len) => assert!(len <= 261),
            _ => {}
        }
        assert!(sync.buffered().len() < 261);
    }
});
