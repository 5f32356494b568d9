//! Fuzz target for configuration parsing
//!
//! Covers both the initial config written by the supervisor and the TOML
//! settings file.

#![no_main]

use fcnet_core::CoreSettings;
use fcnet_core::handshake::InitialConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = InitialConfig::parse(data);

    if let Ok(s) = std::str::from_utf8(data) {
        let _: Result<CoreSettings, _> = toml::from_str(s);
    }
});
