//! Fuzz target: address decoding
//!
//! Arbitrary strings through validate_address() and Script::from_address(),
//! arbitrary bytes through public_key_to_address().
//!
//! Run: cargo +nightly fuzz run fuzz_address_validation -- -max_len=256

#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let valid = bee_crypto::validate_address(s);
        let script = bee_core::Script::from_address(s);
        assert_eq!(valid, script.is_ok(), "validate_address and Script disagree on {:?}", s);
        if let Ok(script) = script {
            assert_eq!(script.to_address().as_deref(), Some(s));
        }
    }

    if !data.is_empty() {
        let addr = bee_crypto::public_key_to_address(data);
        assert!(bee_crypto::validate_address(&addr), "generated address must validate: {}", addr);
    }
});
