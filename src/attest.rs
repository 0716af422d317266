//! Keeper Attestation Digests and Signature Verification
//!
//! Keepers attest that a specific Bitcoin transaction funded a specific
//! pending receipt by signing a digest that binds the system identity, the
//! receipt id, the transaction id and the block height. Keeper identity is
//! the hex-encoded compressed secp256k1 public key; signatures travel as
//! hex-encoded 64-byte compact ECDSA.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use thiserror::Error;

/// Domain separation tag for attestation digests
const ATTEST_DOMAIN: &[u8] = b"kbtc/attest/v1";

/// Attestation errors
#[derive(Debug, Error)]
pub enum AttestError {
    #[error("invalid keeper key {0}")]
    InvalidKeeperKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("invalid bitcoin txid: {0}")]
    InvalidTxid(String),

    #[error("signature does not verify for keeper {0}")]
    SignatureMismatch(String),
}

/// Digest every keeper signs for a mint attestation.
///
/// Fields are length-prefixed so boundaries stay unambiguous.
pub fn attestation_digest(
    system_id: &str,
    receipt_id: &str,
    btc_txid: &str,
    btc_height: u64,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(ATTEST_DOMAIN);
    for field in [system_id.as_bytes(), receipt_id.as_bytes(), btc_txid.as_bytes()] {
        hasher.update((field.len() as u32).to_be_bytes());
        hasher.update(field);
    }
    hasher.update(btc_height.to_be_bytes());
    hasher.finalize().into()
}

/// Parse a keeper identity into a public key
pub fn parse_keeper_key(keeper: &str) -> Result<PublicKey, AttestError> {
    let bytes = hex::decode(keeper)
        .map_err(|_| AttestError::InvalidKeeperKey(keeper.to_string()))?;
    PublicKey::from_slice(&bytes).map_err(|_| AttestError::InvalidKeeperKey(keeper.to_string()))
}

/// Verify one keeper's signature over an attestation digest
pub fn verify_attestation(
    keeper: &str,
    signature_hex: &str,
    digest: &[u8; 32],
) -> Result<(), AttestError> {
    let pubkey = parse_keeper_key(keeper)?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))?;
    let signature = Signature::from_compact(&sig_bytes)
        .map_err(|e| AttestError::InvalidSignature(e.to_string()))?;

    let message = Message::from_digest(*digest);
    SECP256K1
        .verify_ecdsa(&message, &signature, &pubkey)
        .map_err(|_| AttestError::SignatureMismatch(keeper.to_string()))
}

/// Sign an attestation digest (keeper side; used by the demo and tests)
pub fn sign_attestation(secret: &SecretKey, digest: &[u8; 32]) -> String {
    let message = Message::from_digest(*digest);
    let signature = SECP256K1.sign_ecdsa(&message, secret);
    hex::encode(signature.serialize_compact())
}

/// Generate a fresh keeper keypair: (secret, hex identity)
pub fn generate_keeper_key() -> (SecretKey, String) {
    let (secret, public) = SECP256K1.generate_keypair(&mut secp256k1::rand::thread_rng());
    (secret, hex::encode(public.serialize()))
}

/// Validate a Bitcoin transaction id
pub fn validate_txid(txid: &str) -> Result<(), AttestError> {
    bitcoin::Txid::from_str(txid)
        .map(|_| ())
        .map_err(|_| AttestError::InvalidTxid(txid.to_string()))
}
