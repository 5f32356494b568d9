//! Fuzz target for the bencode decoder
//!
//! Arbitrary bytes must never panic the decoder, and anything it accepts
//! must survive an encode/decode cycle.

#![no_main]

use fcnet_core::benc::{self, FrameStatus};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok((value, used)) = benc::decode_prefix(data) {
        assert_eq!(benc::frame(data), FrameStatus::Complete(used));

        let reencoded = benc::encode(&value);
        assert_eq!(benc::decode(&reencoded).ok(), Some(value));
    }
});
