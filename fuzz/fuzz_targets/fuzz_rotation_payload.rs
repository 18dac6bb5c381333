//! Fuzz target: SPORK_18 / SPORK_20 rotation payloads
//!
//! Parsing never panics, and a schedule built from any payload answers
//! every height without panicking.
//!
//! Run: cargo +nightly fuzz run fuzz_rotation_payload -- -max_len=1024

#![no_main]
use bee_consensus::evolution::{is_valid_rotation, parse_rotation, EvolutionSchedule};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(payload) = std::str::from_utf8(data) else {
        return;
    };
    let entries = parse_rotation(payload);
    if !is_valid_rotation(payload) {
        assert!(entries.is_empty());
    }

    let mut schedule = EvolutionSchedule::new();
    schedule.set_payees(payload);
    assert_eq!(schedule.payees().len(), entries.len());
    for height in [0u32, 1, 7, u32::MAX] {
        let _ = schedule.payee_address(height);
        let _ = schedule.payee_script(height);
    }
});
