//! Fuzz target: inbound wire payloads
//!
//! Any byte string must decode to a message or an error. Decoded messages
//! re-encode to something that decodes back to the same message.
//!
//! Run: cargo +nightly fuzz run fuzz_net_message -- -max_len=65536

#![no_main]
use bee_network::NetMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = NetMessage::decode(data) {
        let bytes = msg.encode().expect("decoded message must re-encode");
        assert_eq!(NetMessage::decode(&bytes).ok(), Some(msg));
    }
});
