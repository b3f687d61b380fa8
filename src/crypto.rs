//! Signature primitive used by the proof-of-authority seal (secp256k1 ECDSA)
//!
//! The authority signs the SHA-256 digest of a block's unsealed header and the compact
//! 64-byte signature becomes the seal value. Only compressed public keys identify an
//! authority.

use crate::error::ChainError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// Shared signing and verification context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub use secp256k1::constants::COMPACT_SIGNATURE_SIZE as SIGNATURE_SIZE;

/// Signing key of a sealing authority.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Fresh authority key drawn from `OsRng`.
    pub fn generate() -> Self {
        Self::from_secret_key(SecretKey::new(&mut OsRng))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(ChainError::CryptoError(format!(
                "authority secret key has {} bytes, expected {}",
                bytes.len(),
                SECRET_KEY_SIZE
            )));
        }
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::CryptoError(format!("authority secret key rejected: {}", e)))?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Secret key as configured: 64 hex digits.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, ChainError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| ChainError::CryptoError(format!("authority secret key is not hex: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Compressed SEC1 form, the authority's identity in configuration.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Compact signature over the SHA-256 digest of `header`.
    pub fn sign(&self, header: &[u8]) -> Result<[u8; SIGNATURE_SIZE], ChainError> {
        let digest = header_digest(header)?;
        Ok(SECP256K1_CONTEXT
            .sign_ecdsa(&digest, &self.secret_key)
            .serialize_compact())
    }
}

fn header_digest(header: &[u8]) -> Result<Message, ChainError> {
    Message::from_digest_slice(&Sha256::digest(header))
        .map_err(|e| ChainError::CryptoError(format!("header digest rejected: {}", e)))
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, ChainError> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "authority public key has {} bytes, expected {} (compressed)",
            bytes.len(),
            PUBLIC_KEY_SIZE
        )));
    }
    PublicKey::from_slice(bytes)
        .map_err(|e| ChainError::CryptoError(format!("authority public key rejected: {}", e)))
}

/// Checks that `bytes` is a compressed point on the curve and returns it normalized.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<[u8; PUBLIC_KEY_SIZE], ChainError> {
    parse_public_key(bytes).map(|key| key.serialize())
}

/// Verifies that `signature_bytes` is the authority's compact signature over `header`.
pub fn verify_signature(
    public_key_bytes: &[u8],
    header: &[u8],
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if signature_bytes.len() != SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "seal signature has {} bytes, expected {}",
            signature_bytes.len(),
            SIGNATURE_SIZE
        )));
    }
    let public_key = parse_public_key(public_key_bytes)?;
    let digest = header_digest(header)?;
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("seal signature is malformed: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&digest, &signature, &public_key)
        .map_err(|_| ChainError::CryptoError("seal signature does not match the authority".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] = b"0`1700000000`0`genesis`True`";

    #[test]
    fn test_authority_signs_header() {
        let authority = KeyPair::generate();
        let signature = authority.sign(HEADER).unwrap();
        assert_eq!(signature.len(), SIGNATURE_SIZE);
        assert!(verify_signature(&authority.public_key_bytes(), HEADER, &signature).is_ok());
        assert_eq!(authority.sign(HEADER).unwrap(), signature);
    }

    #[test]
    fn test_other_authority_rejected() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = signer.sign(HEADER).unwrap();

        let result = verify_signature(&other.public_key_bytes(), HEADER, &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Cryptographic error: seal signature does not match the authority"
        );
    }

    #[test]
    fn test_signature_bound_to_header() {
        let authority = KeyPair::generate();
        let signature = authority.sign(HEADER).unwrap();
        let other_header = b"0`1700000001`0`genesis`True`";
        assert!(verify_signature(&authority.public_key_bytes(), other_header, &signature).is_err());
    }

    #[test]
    fn test_key_and_signature_lengths() {
        let authority = KeyPair::generate();
        let signature = authority.sign(HEADER).unwrap();
        let public_key = authority.public_key_bytes();

        let err = verify_signature(&public_key[1..], HEADER, &signature).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cryptographic error: authority public key has 32 bytes, expected 33 (compressed)"
        );

        let err = verify_signature(&public_key, HEADER, &signature[1..]).unwrap_err();
        assert_eq!(err.to_string(), "Cryptographic error: seal signature has 63 bytes, expected 64");

        assert_eq!(public_key_from_bytes(&public_key).unwrap(), public_key);
    }

    #[test]
    fn test_secret_hex_roundtrip() {
        let authority = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&hex::encode(authority.secret_key.secret_bytes())).unwrap();
        assert_eq!(restored.public_key_bytes(), authority.public_key_bytes());

        let short = hex::encode([1u8; SECRET_KEY_SIZE - 1]);
        assert_eq!(
            KeyPair::from_secret_hex(&short).unwrap_err().to_string(),
            "Cryptographic error: authority secret key has 31 bytes, expected 32"
        );
        assert!(KeyPair::from_secret_hex(&hex::encode([0u8; SECRET_KEY_SIZE])).is_err());
        assert!(KeyPair::from_secret_hex("zz").is_err());
    }
}
