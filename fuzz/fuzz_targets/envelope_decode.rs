//! Hex envelope decoding must never panic, whatever the field contents.

#![no_main]

use keygate_proto::WireEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|fields: (String, String, String)| {
    let (iv, payload, tag) = fields;
    let envelope = WireEnvelope { iv, payload, tag };
    let _ = envelope.decode();
});
