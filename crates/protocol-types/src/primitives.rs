//! Address, hash, and signature primitives

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

/// 32-byte collision-resistant hash (blake3 over the borsh encoding)
pub type Hash = [u8; 32];

/// Placeholder hash carried by EOP-only commitments in `raw_tx_list_hash`
pub const ZERO_HASH: Hash = [0u8; 32];

/// Operator address - the 32-byte ed25519 verifying key of the operator
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Address(#[serde(with = "hex")] pub [u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    /// Derive the address from a signing key
    pub fn from_signing_key(key: &SigningKey) -> Self {
        Address(key.verifying_key().to_bytes())
    }

    /// Generate a fresh random address with its signing key
    pub fn generate() -> (Self, SigningKey) {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        (Address::from_signing_key(&key), key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Detached ed25519 signature over a 32-byte message hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "hex")] pub [u8; 64]);

impl Signature {
    /// Sign a message hash with the given key
    pub fn sign(key: &SigningKey, message: &Hash) -> Self {
        Signature(key.sign(message).to_bytes())
    }

    /// Verify this signature over a message hash against a signer address
    pub fn verify(&self, signer: &Address, message: &Hash) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&signer.0) else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&self.0);
        key.verify(message, &sig).is_ok()
    }
}

/// Hash a borsh-serializable value
pub fn hash_of<T: BorshSerialize>(value: &T) -> Hash {
    let bytes = borsh::to_vec(value).expect("borsh serialization should not fail");
    *blake3::hash(&bytes).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let (address, key) = Address::generate();
        let message = hash_of(&42u64);

        let sig = Signature::sign(&key, &message);
        assert!(sig.verify(&address, &message));

        let (other, _) = Address::generate();
        assert!(!sig.verify(&other, &message));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_of(&(1u64, 2u64)), hash_of(&(1u64, 2u64)));
        assert_ne!(hash_of(&(1u64, 2u64)), hash_of(&(2u64, 1u64)));
    }
}
