//! Stateless session tokens (HS384 JWT).
//!
//! Token validity is entirely determined by signature and expiry; there is
//! no server-side revocation list. Changing an account's session-duration
//! preference never alters tokens that were already issued.

use crate::error::AppError;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const JWT_ISSUER: &str = "walletgate";
const JWT_ALGORITHM: Algorithm = Algorithm::HS384;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Wallet address (lowercase) of the authenticated subject.
    pub sub: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

/// Mints and validates session tokens from a shared signing secret.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Mint a token for an address, valid for `duration_minutes` from `now`
    /// (unix seconds).
    pub fn issue(
        &self,
        address: &str,
        duration_minutes: u64,
        now: u64,
    ) -> Result<String, AppError> {
        let claims = SessionClaims {
            sub: address.to_ascii_lowercase(),
            iss: JWT_ISSUER.to_string(),
            iat: now,
            exp: now + duration_minutes * 60,
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Verify signature, issuer, and expiry; returns the claims on success.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, AppError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.set_issuer(&[JWT_ISSUER]);
        validation.leeway = 0;

        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AppError::TokenExpired),
                _ => Err(AppError::TokenInvalid(e.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "0x8ba1f109551bd432803012645ac136ddd64dba72";

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn signer() -> TokenSigner {
        TokenSigner::new(b"0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn test_issue_validate_roundtrip() {
        let signer = signer();
        let token = signer.issue(ADDRESS, 60, now()).unwrap();

        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.sub, ADDRESS);
        assert_eq!(claims.iss, "walletgate");
        assert_eq!(claims.exp, claims.iat + 3600);
    }

    #[test]
    fn test_subject_is_lowercased() {
        let signer = signer();
        let token = signer
            .issue("0x8BA1F109551BD432803012645AC136DDD64DBA72", 60, now())
            .unwrap();
        let claims = signer.validate(&token).unwrap();
        assert_eq!(claims.sub, ADDRESS);
    }

    #[test]
    fn test_expired_token_is_distinct_kind() {
        let signer = signer();
        // Issued two hours in the past with a one-hour lifetime
        let token = signer.issue(ADDRESS, 60, now() - 7200).unwrap();

        let result = signer.validate(&token);
        assert!(matches!(result.unwrap_err(), AppError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = signer().issue(ADDRESS, 60, now()).unwrap();

        let other = TokenSigner::new(b"ffffffffffffffffffffffffffffffff");
        let result = other.validate(&token);
        assert!(matches!(result.unwrap_err(), AppError::TokenInvalid(_)));
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let result = signer().validate("not.a.token");
        assert!(matches!(result.unwrap_err(), AppError::TokenInvalid(_)));
    }

    #[test]
    fn test_duration_change_does_not_alter_issued_tokens() {
        // Historical tokens keep their original expiry
        let signer = signer();
        let issued_at = now();
        let long = signer.issue(ADDRESS, 120, issued_at).unwrap();
        let short = signer.issue(ADDRESS, 1, issued_at).unwrap();

        let long_claims = signer.validate(&long).unwrap();
        let short_claims = signer.validate(&short).unwrap();
        assert_eq!(long_claims.exp, issued_at + 7200);
        assert_eq!(short_claims.exp, issued_at + 60);
    }
}
