// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS - bee-crypto
//
// Run: cargo test -p bee-crypto --test prop_crypto
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bee_crypto::{
    address_to_key_id, generate_keypair_from_seed, hash256, key_id_to_address, sign_message,
    validate_address, verify_signature,
};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────
// SIGNATURES
// ─────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// PROPERTY: a signature verifies for exactly the message it was made over
    #[test]
    fn prop_signature_binds_message(
        seed in prop::collection::vec(any::<u8>(), 16..64),
        message in prop::collection::vec(any::<u8>(), 0..512),
        flip in any::<usize>(),
    ) {
        let kp = generate_keypair_from_seed(&seed).unwrap();
        let sig = sign_message(&message, &kp.secret_key).unwrap();
        prop_assert!(verify_signature(&message, &sig, &kp.public_key));

        if !message.is_empty() {
            let mut tampered = message.clone();
            let idx = flip % tampered.len();
            tampered[idx] ^= 0x01;
            prop_assert!(!verify_signature(&tampered, &sig, &kp.public_key));
        }
    }

    /// PROPERTY: hashing is a pure function of its input
    #[test]
    fn prop_hash_deterministic(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        prop_assert_eq!(hash256(&data), hash256(&data));
    }
}

// ─────────────────────────────────────────────────────────────────
// ADDRESSES
// ─────────────────────────────────────────────────────────────────

proptest! {
    /// PROPERTY: every 160-bit key id survives address encoding
    #[test]
    fn prop_key_id_address_roundtrip(id in any::<[u8; 20]>()) {
        let address = key_id_to_address(&id);
        prop_assert!(validate_address(&address));
        prop_assert_eq!(address_to_key_id(&address).unwrap(), id);
    }

    /// PROPERTY: arbitrary strings never panic the validator
    #[test]
    fn prop_validate_never_panics(s in "\\PC{0,64}") {
        let _ = validate_address(&s);
    }
}
