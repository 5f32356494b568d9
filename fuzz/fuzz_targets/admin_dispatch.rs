//! Fuzz target for admin request dispatch
//!
//! Any request must produce either no response or one that carries the
//! request's transaction id.

#![no_main]

use fcnet_core::admin::{Admin, AdminSettings, Request};
use fcnet_core::benc::{self, Dict};
use fcnet_core::handshake::SyncToken;
use libfuzzer_sys::fuzz_target;
use zeroize::Zeroizing;

fuzz_target!(|data: &[u8]| {
    let admin = Admin::new(
        Zeroizing::new(b"fuzz".to_vec()),
        SyncToken::from_bytes([7; 8]),
        AdminSettings::default(),
    );
    let _ = admin.register("ping", false, |_: &Request| Ok(Dict::new().with("q", "pong")));
    let _ = admin.register("secret", true, |_: &Request| Ok(Dict::new()));

    if let Some(response) = admin.dispatch(data) {
        let request = benc::decode_dict(data).ok();
        let txid = request.as_ref().and_then(|d| d.get_bytes(b"txid"));
        assert_eq!(response.get_bytes(b"txid"), txid);
    }
});
