// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Ethereum wallet helpers: address checks, sign-in nonces and EIP-191
//! personal-sign signature recovery.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};

use crate::error::AppError;

const SIGN_IN_PREFIX: &str = "Sign in to Sentrix: ";

/// `^0x[a-fA-F0-9]{40}$`
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate and lowercase a wallet address.
pub fn normalize_address(address: &str) -> Result<String, AppError> {
    if !is_valid_address(address) {
        return Err(AppError::bad_request("invalid wallet address format"));
    }
    Ok(address.to_ascii_lowercase())
}

pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The exact message a wallet signs to log in.
pub fn auth_message(nonce: &str) -> String {
    format!("{SIGN_IN_PREFIX}{nonce}")
}

/// keccak256 of the EIP-191 personal-sign envelope.
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());

    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn address_of(key: &VerifyingKey) -> String {
    let encoded = key.to_encoded_point(false);
    let hash = Keccak256::digest(&encoded.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// Recover the lowercase address that produced a 65-byte `0x` signature.
pub fn recover_signer(message: &str, signature: &str) -> Result<String, AppError> {
    let raw = signature
        .strip_prefix("0x")
        .ok_or_else(|| AppError::bad_request("signature must be 0x-prefixed"))?;
    let bytes = hex::decode(raw).map_err(|_| AppError::bad_request("signature is not hex"))?;
    if bytes.len() != 65 {
        return Err(AppError::bad_request("signature must be 65 bytes"));
    }

    let v = match bytes[64] {
        27 | 28 => bytes[64] - 27,
        v @ (0 | 1) => v,
        _ => return Err(AppError::bad_request("invalid signature recovery byte")),
    };

    let mut recovery_id = RecoveryId::from_byte(v)
        .ok_or_else(|| AppError::bad_request("invalid signature recovery byte"))?;
    let mut sig = Signature::from_slice(&bytes[..64])
        .map_err(|_| AppError::bad_request("malformed signature"))?;

    // k256 only verifies low-s signatures
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let prehash = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| AppError::unauthorized("invalid signature"))?;

    Ok(address_of(&key))
}

/// True when `signature` over `message` was produced by `address`.
pub fn verify_wallet_signature(message: &str, signature: &str, address: &str) -> bool {
    match recover_signer(message, signature) {
        Ok(signer) => signer.eq_ignore_ascii_case(address),
        Err(error) => {
            tracing::debug!(%error, "signature recovery failed");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use k256::ecdsa::SigningKey;

    use super::{address_of, personal_message_hash};

    pub fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).expect("valid test key")
    }

    pub fn address(key: &SigningKey) -> String {
        address_of(key.verifying_key())
    }

    /// personal_sign as a wallet would produce it (v = 27/28).
    pub fn personal_sign(key: &SigningKey, message: &str) -> String {
        let (sig, recovery_id) = key
            .sign_prehash_recoverable(&personal_message_hash(message))
            .expect("signing succeeds");
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn address_format_is_enforced() {
        assert!(is_valid_address("0x1234567890123456789012345678901234567890"));
        assert!(is_valid_address("0xABCDEFabcdef1234567890123456789012345678"));
        assert!(!is_valid_address("invalid-address"));
        assert!(!is_valid_address("0x12345"));
        assert!(!is_valid_address("1x1234567890123456789012345678901234567890"));
        assert!(!is_valid_address("0x123456789012345678901234567890123456789g"));
    }

    #[test]
    fn normalize_lowercases_valid_addresses() {
        assert_eq!(
            normalize_address("0xABCDEFabcdef1234567890123456789012345678").unwrap(),
            "0xabcdefabcdef1234567890123456789012345678"
        );
        assert!(normalize_address("nope").is_err());
    }

    #[test]
    fn auth_message_has_expected_format() {
        assert_eq!(auth_message("test-nonce-123"), "Sign in to Sentrix: test-nonce-123");
    }

    #[test]
    fn nonces_are_unique_and_non_empty() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }

    #[test]
    fn recovers_the_signing_wallet() {
        let key = signing_key(7);
        let message = auth_message("abc");
        let signature = personal_sign(&key, &message);

        assert_eq!(recover_signer(&message, &signature).unwrap(), address(&key));
        assert!(verify_wallet_signature(&message, &signature, &address(&key).to_uppercase().replacen("0X", "0x", 1)));
    }

    #[test]
    fn signature_over_another_message_does_not_verify() {
        let key = signing_key(7);
        let signature = personal_sign(&key, &auth_message("abc"));

        assert!(!verify_wallet_signature(&auth_message("xyz"), &signature, &address(&key)));
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let message = auth_message("abc");
        assert!(recover_signer(&message, "deadbeef").is_err());
        assert!(recover_signer(&message, "0xzz").is_err());
        assert!(recover_signer(&message, &format!("0x{}", "11".repeat(64))).is_err());
    }
}
