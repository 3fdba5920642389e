//! EIP-191 signature verification and Ethereum address handling.
//!
//! Pure and stateless: no I/O, so the whole module is trivially testable
//! without a running store.

use crate::auth::message;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use tiny_keccak::{Hasher, Keccak};

/// Result of a successful verification: the signer plus the message's
/// embedded issued-at for caller-side expiry double-checks. The canonical
/// expiry check lives in the challenge store.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// EIP-55 checksummed address of the recovered signer.
    pub address: String,
    pub issued_at: DateTime<Utc>,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Check that a string is a well-formed Ethereum address (`0x` + 40 hex).
pub fn is_well_formed_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Render an address in EIP-55 checksum form.
///
/// Input must be a well-formed address; casing of the input is ignored.
pub fn to_checksum_address(address: &str) -> String {
    let lower = address[2..].to_ascii_lowercase();
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Recover the signing address from an EIP-191 `personal_sign` signature.
///
/// The message is prefixed with `"\x19Ethereum Signed Message:\n{len}"`,
/// hashed with Keccak-256, and the public key recovered from the 65-byte
/// `r || s || v` signature. Returns the lowercase 0x-prefixed address.
pub fn recover_signer(message: &str, signature: &str) -> Result<String, AppError> {
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|e| AppError::SignatureInvalid(format!("invalid signature hex: {}", e)))?;

    if sig_bytes.len() != 65 {
        return Err(AppError::SignatureInvalid(format!(
            "signature must be 65 bytes, got {}",
            sig_bytes.len()
        )));
    }

    let (rs, v_byte) = sig_bytes.split_at(64);
    let v = match v_byte[0] {
        0 | 27 => 0u8,
        1 | 28 => 1u8,
        v => {
            return Err(AppError::SignatureInvalid(format!(
                "invalid recovery id: {}",
                v
            )))
        }
    };

    let signature = Signature::from_slice(rs)
        .map_err(|e| AppError::SignatureInvalid(format!("invalid ECDSA signature: {}", e)))?;
    let recovery_id = RecoveryId::new(v != 0, false);

    let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
    let digest = keccak256(prefixed.as_bytes());

    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|e| AppError::SignatureInvalid(format!("recovery failed: {}", e)))?;

    // Address is the low 20 bytes of the keccak of the uncompressed pubkey
    let encoded = verifying_key.to_encoded_point(false);
    let pubkey_uncompressed = &encoded.as_bytes()[1..]; // skip 0x04
    let address_hash = keccak256(pubkey_uncompressed);
    Ok(format!("0x{}", hex::encode(&address_hash[12..])))
}

/// Verify a signed challenge message against the claimed address.
///
/// Parses the message, recovers the signer, and compares case-insensitively.
pub fn verify(
    claimed_address: &str,
    raw_message: &str,
    signature: &str,
) -> Result<VerifiedIdentity, AppError> {
    let fields = message::parse(raw_message)
        .map_err(|e| AppError::SignatureInvalid(e.to_string()))?;

    let recovered = recover_signer(raw_message, signature)?;
    if !recovered.eq_ignore_ascii_case(claimed_address) {
        return Err(AppError::AddressMismatch);
    }

    Ok(VerifiedIdentity {
        address: to_checksum_address(&recovered),
        issued_at: fields.issued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::message::{compose, generate_nonce};
    use chrono::Utc;
    use k256::ecdsa::SigningKey;

    /// Generate a random secp256k1 key and its lowercase address.
    pub fn test_wallet() -> (SigningKey, String) {
        loop {
            let mut seed = [0u8; 32];
            rand::fill(&mut seed);
            if let Ok(key) = SigningKey::from_slice(&seed) {
                let encoded = key.verifying_key().to_encoded_point(false);
                let hash = keccak256(&encoded.as_bytes()[1..]);
                let address = format!("0x{}", hex::encode(&hash[12..]));
                return (key, address);
            }
        }
    }

    /// EIP-191 personal_sign, returning the 0x-hex 65-byte signature.
    pub fn sign_message(key: &SigningKey, message: &str) -> String {
        let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", message.len(), message);
        let digest = keccak256(prefixed.as_bytes());
        let (signature, recovery_id) = key.sign_prehash_recoverable(&digest).unwrap();

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte() + 27);
        format!("0x{}", hex::encode(bytes))
    }

    fn test_challenge(address: &str) -> String {
        compose(
            "localhost:5173",
            address,
            "http://localhost:5173",
            1,
            &generate_nonce(),
            Utc::now(),
        )
    }

    #[test]
    fn test_keccak256_known_vector() {
        assert_eq!(
            hex::encode(keccak256(b"hello")),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_address_well_formedness() {
        assert!(is_well_formed_address(
            "0x8ba1f109551bD432803012645Ac136ddd64DBA72"
        ));
        assert!(!is_well_formed_address("0x8ba1f109"));
        assert!(!is_well_formed_address(
            "8ba1f109551bd432803012645ac136ddd64dba72ab"
        ));
        assert!(!is_well_formed_address(
            "0xZZa1f109551bd432803012645ac136ddd64dba72"
        ));
    }

    #[test]
    fn test_eip55_checksum_known_vectors() {
        // Vectors from the EIP-55 reference
        assert_eq!(
            to_checksum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(
            to_checksum_address("0xFB6916095CA1DF60BB79CE92CE3EA74C37C5D359"),
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359"
        );
    }

    #[test]
    fn test_recover_roundtrip() {
        let (key, address) = test_wallet();
        let challenge = test_challenge(&address);
        let signature = sign_message(&key, &challenge);

        let recovered = recover_signer(&challenge, &signature).unwrap();
        assert_eq!(recovered, address);
    }

    #[test]
    fn test_verify_accepts_any_claimed_casing() {
        let (key, address) = test_wallet();
        let challenge = test_challenge(&address);
        let signature = sign_message(&key, &challenge);

        let identity = verify(&address.to_uppercase().replace("0X", "0x"), &challenge, &signature)
            .unwrap();
        assert_eq!(identity.address, to_checksum_address(&address));
    }

    #[test]
    fn test_verify_wrong_key_is_mismatch() {
        // Signed by key A, claimed as address B
        let (key_a, _) = test_wallet();
        let (_, address_b) = test_wallet();
        let challenge = test_challenge(&address_b);
        let signature = sign_message(&key_a, &challenge);

        let result = verify(&address_b, &challenge, &signature);
        assert!(matches!(result.unwrap_err(), AppError::AddressMismatch));
    }

    #[test]
    fn test_verify_tampered_message_is_mismatch() {
        // A valid signature over a different message recovers a different
        // (effectively random) signer, so tampering surfaces as a mismatch.
        let (key, address) = test_wallet();
        let challenge = test_challenge(&address);
        let signature = sign_message(&key, &challenge);

        let tampered = test_challenge(&address); // fresh nonce, same address
        let result = verify(&address, &tampered, &signature);
        assert!(result.is_err());
    }

    #[test]
    fn test_recover_rejects_garbage() {
        let result = recover_signer("message", "not-hex");
        assert!(matches!(result.unwrap_err(), AppError::SignatureInvalid(_)));

        let short = format!("0x{}", hex::encode([0u8; 10]));
        let result = recover_signer("message", &short);
        assert!(matches!(result.unwrap_err(), AppError::SignatureInvalid(_)));

        let bad_v = format!("0x{}99", hex::encode([0u8; 64]));
        let result = recover_signer("message", &bad_v);
        assert!(matches!(result.unwrap_err(), AppError::SignatureInvalid(_)));
    }
}
