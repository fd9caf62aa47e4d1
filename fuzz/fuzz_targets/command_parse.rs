//! Decrypted command parsing must never panic on arbitrary plaintext.

#![no_main]

use keygate_proto::AuthCommand;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = AuthCommand::parse(data);
});
