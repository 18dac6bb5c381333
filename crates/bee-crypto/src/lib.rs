// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BEENODE - CRYPTOGRAPHY MODULE
//
// Primitives shared by the spork and masternode payment subsystems.
// - 256-bit message digests (SHA3-256)
// - Ed25519 key generation, signing and verification
// - Payout address derivation (Base58Check with BLAKE2b-160)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use digest::Digest;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sha3::Sha3_256;
use thiserror::Error;
use zeroize::Zeroize;

/// Identity of a signed object on the wire (sporks, payment votes).
pub type Hash256 = [u8; 32];

/// 160-bit key hash embedded in payout scripts and addresses.
pub type KeyId = [u8; 20];

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Address version byte; encodes to a leading 'B' in Base58.
pub const ADDRESS_VERSION: u8 = 0x19;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid key format")]
    InvalidKey,
    #[error("Signature verification failed")]
    VerificationFailed,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HASHING
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn hash256(data: &[u8]) -> Hash256 {
    Sha3_256::digest(data).into()
}

/// Hash several fields as one contiguous message.
///
/// Every field is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn hash_fields(fields: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha3_256::new();
    for field in fields {
        hasher.update((field.len() as u32).to_le_bytes());
        hasher.update(field);
    }
    hasher.finalize().into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// KEYS AND SIGNATURES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

/// Secret bytes are wiped when the pair goes out of scope.
impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl KeyPair {
    fn from_signing_key(signing: &SigningKey) -> Self {
        KeyPair {
            public_key: signing.verifying_key().to_bytes().to_vec(),
            secret_key: signing.to_bytes().to_vec(),
        }
    }

    pub fn key_id(&self) -> KeyId {
        key_id(&self.public_key)
    }
}

pub fn generate_keypair() -> KeyPair {
    let signing = SigningKey::generate(&mut rand::rngs::OsRng);
    KeyPair::from_signing_key(&signing)
}

/// Deterministic keypair from seed material.
///
/// Domain separation:
///   salt = SHA-256("bee-ed25519-keygen-v1")
///   secret = SHA-256(salt || seed)
///
/// The seed must carry at least 16 bytes.
pub fn generate_keypair_from_seed(seed: &[u8]) -> Result<KeyPair, CryptoError> {
    if seed.len() < 16 {
        return Err(CryptoError::InvalidKey);
    }

    let salt = Sha256::digest(b"bee-ed25519-keygen-v1");
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(seed);
    let mut derived: [u8; 32] = hasher.finalize().into();

    let signing = SigningKey::from_bytes(&derived);
    derived.zeroize();

    Ok(KeyPair::from_signing_key(&signing))
}

/// Rebuild a keypair from a raw 32-byte secret.
pub fn keypair_from_secret(secret_bytes: &[u8]) -> Result<KeyPair, CryptoError> {
    let mut secret: [u8; SECRET_KEY_LEN] =
        secret_bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
    let signing = SigningKey::from_bytes(&secret);
    secret.zeroize();
    Ok(KeyPair::from_signing_key(&signing))
}

pub fn sign_message(message: &[u8], secret_key_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut secret: [u8; SECRET_KEY_LEN] = secret_key_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey)?;
    let signing = SigningKey::from_bytes(&secret);
    secret.zeroize();
    Ok(signing.sign(message).to_bytes().to_vec())
}

/// Verify an Ed25519 signature. Malformed keys or signatures verify as false.
pub fn verify_signature(message: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8]) -> bool {
    let pk_array: [u8; PUBLIC_KEY_LEN] = match public_key_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    let vk = match VerifyingKey::from_bytes(&pk_array) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig = match Signature::from_slice(signature_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    vk.verify(message, &sig).is_ok()
}

/// Parse a hex-encoded public key, checking that it is a valid curve point.
pub fn public_key_from_hex(encoded: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = hex::decode(encoded.trim()).map_err(|_| CryptoError::InvalidKey)?;
    let pk_array: [u8; PUBLIC_KEY_LEN] =
        bytes.as_slice().try_into().map_err(|_| CryptoError::InvalidKey)?;
    VerifyingKey::from_bytes(&pk_array).map_err(|_| CryptoError::InvalidKey)?;
    Ok(bytes)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ADDRESSES (Base58Check)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// BLAKE2b-512 of the public key, truncated to 160 bits.
pub fn key_id(public_key_bytes: &[u8]) -> KeyId {
    let digest = blake2::Blake2b512::digest(public_key_bytes);
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest[..20]);
    id
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let twice = Sha256::digest(Sha256::digest(payload));
    [twice[0], twice[1], twice[2], twice[3]]
}

/// Format: Base58(version || key_id || SHA256(SHA256(version || key_id))[..4])
pub fn key_id_to_address(id: &KeyId) -> String {
    let mut bytes = Vec::with_capacity(25);
    bytes.push(ADDRESS_VERSION);
    bytes.extend_from_slice(id);
    let check = checksum(&bytes);
    bytes.extend_from_slice(&check);
    bs58::encode(bytes).into_string()
}

pub fn public_key_to_address(public_key_bytes: &[u8]) -> String {
    key_id_to_address(&key_id(public_key_bytes))
}

pub fn address_to_key_id(address: &str) -> Result<KeyId, CryptoError> {
    let decoded = bs58::decode(address)
        .into_vec()
        .map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;

    if decoded.len() != 25 {
        return Err(CryptoError::InvalidAddress(format!(
            "expected 25 bytes, got {}",
            decoded.len()
        )));
    }
    if decoded[0] != ADDRESS_VERSION {
        return Err(CryptoError::InvalidAddress(format!(
            "unknown version byte 0x{:02x}",
            decoded[0]
        )));
    }
    if checksum(&decoded[..21]) != decoded[21..] {
        return Err(CryptoError::InvalidAddress("bad checksum".to_string()));
    }

    let mut id = [0u8; 20];
    id.copy_from_slice(&decoded[1..21]);
    Ok(id)
}

pub fn validate_address(address: &str) -> bool {
    address_to_key_id(address).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_flow() {
        let kp = generate_keypair();
        let msg = b"spork 10001 value 0";
        let sig = sign_message(msg, &kp.secret_key).unwrap();

        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(verify_signature(msg, &sig, &kp.public_key));
        assert!(!verify_signature(b"spork 10001 value 1", &sig, &kp.public_key));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = generate_keypair();
        let other = generate_keypair();
        let sig = sign_message(b"payload", &signer.secret_key).unwrap();
        assert!(!verify_signature(b"payload", &sig, &other.public_key));
    }

    #[test]
    fn test_malformed_inputs_verify_false() {
        let kp = generate_keypair();
        let sig = sign_message(b"m", &kp.secret_key).unwrap();
        assert!(!verify_signature(b"m", &sig[..10], &kp.public_key));
        assert!(!verify_signature(b"m", &sig, &kp.public_key[..31]));
        assert!(sign_message(b"m", &[1u8; 7]).is_err());
    }

    #[test]
    fn test_seeded_keys_are_deterministic() {
        let a = generate_keypair_from_seed(&[7u8; 32]).unwrap();
        let b = generate_keypair_from_seed(&[7u8; 32]).unwrap();
        let c = generate_keypair_from_seed(&[8u8; 32]).unwrap();
        assert_eq!(a.public_key, b.public_key);
        assert_ne!(a.public_key, c.public_key);
        assert_eq!(
            generate_keypair_from_seed(&[1u8; 4]).unwrap_err(),
            CryptoError::InvalidKey
        );
    }

    #[test]
    fn test_keypair_from_secret_matches() {
        let kp = generate_keypair();
        let rebuilt = keypair_from_secret(&kp.secret_key).unwrap();
        assert_eq!(kp.public_key, rebuilt.public_key);
    }

    #[test]
    fn test_address_roundtrip() {
        let kp = generate_keypair();
        let address = public_key_to_address(&kp.public_key);
        assert!(validate_address(&address));
        assert_eq!(address_to_key_id(&address).unwrap(), kp.key_id());
    }

    #[test]
    fn test_address_checksum_detects_typo() {
        let kp = generate_keypair();
        let address = public_key_to_address(&kp.public_key);
        let mut chars: Vec<char> = address.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '2' { '3' } else { '2' };
        let typo: String = chars.into_iter().collect();
        assert!(!validate_address(&typo));
        assert!(!validate_address(""));
        assert!(!validate_address("0OIl"));
    }

    #[test]
    fn test_hash_fields_is_length_prefixed() {
        assert_ne!(hash_fields(&[b"ab", b"c"]), hash_fields(&[b"a", b"bc"]));
        assert_eq!(hash_fields(&[b"x"]), hash_fields(&[b"x"]));
    }

    #[test]
    fn test_public_key_from_hex() {
        let kp = generate_keypair();
        let parsed = public_key_from_hex(&hex::encode(&kp.public_key)).unwrap();
        assert_eq!(parsed, kp.public_key);
        assert!(public_key_from_hex("abcd").is_err());
        assert!(public_key_from_hex("zz").is_err());
    }
}
