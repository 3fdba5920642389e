//! Challenge message composition, parsing, and nonce generation.
//!
//! Challenges are structured plaintext in the sign-in-with-Ethereum layout:
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! ```
//!
//! The server never trusts client-supplied structured fields: the stored
//! message is the source of truth, and `parse` exists so the verifier can
//! read back what the server itself issued.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;

const SIGN_IN_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const STATEMENT: &str = "Sign in to access your account";
pub const PROTOCOL_VERSION: &str = "1";

/// Structured fields embedded in a challenge message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeFields {
    pub domain: String,
    pub address: String,
    pub statement: String,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Malformed challenge message: {0}")]
    Malformed(&'static str),
}

/// Generate a cryptographically random challenge nonce.
///
/// Returns a hex string (64 characters) from 32 random bytes.
pub fn generate_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    hex::encode(bytes)
}

/// Compose the plaintext challenge message for an address.
pub fn compose(
    domain: &str,
    address: &str,
    uri: &str,
    chain_id: u64,
    nonce: &str,
    issued_at: DateTime<Utc>,
) -> String {
    format!(
        "{domain}{SIGN_IN_SUFFIX}\n\
         {address}\n\
         \n\
         {STATEMENT}\n\
         \n\
         URI: {uri}\n\
         Version: {PROTOCOL_VERSION}\n\
         Chain ID: {chain_id}\n\
         Nonce: {nonce}\n\
         Issued At: {}",
        issued_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Parse a challenge message back into its structured fields.
pub fn parse(raw: &str) -> Result<ChallengeFields, MessageError> {
    let lines: Vec<&str> = raw.split('\n').collect();
    if lines.len() != 10 {
        return Err(MessageError::Malformed("unexpected line count"));
    }

    let domain = lines[0]
        .strip_suffix(SIGN_IN_SUFFIX)
        .ok_or(MessageError::Malformed("missing sign-in preamble"))?;
    let address = lines[1];
    if !lines[2].is_empty() || !lines[4].is_empty() {
        return Err(MessageError::Malformed("missing separator lines"));
    }
    let statement = lines[3];

    let uri = lines[5]
        .strip_prefix("URI: ")
        .ok_or(MessageError::Malformed("missing URI field"))?;
    let version = lines[6]
        .strip_prefix("Version: ")
        .ok_or(MessageError::Malformed("missing Version field"))?;
    let chain_id = lines[7]
        .strip_prefix("Chain ID: ")
        .ok_or(MessageError::Malformed("missing Chain ID field"))?
        .parse::<u64>()
        .map_err(|_| MessageError::Malformed("non-numeric chain id"))?;
    let nonce = lines[8]
        .strip_prefix("Nonce: ")
        .ok_or(MessageError::Malformed("missing Nonce field"))?;
    let issued_at = lines[9]
        .strip_prefix("Issued At: ")
        .ok_or(MessageError::Malformed("missing Issued At field"))?;
    let issued_at = DateTime::parse_from_rfc3339(issued_at)
        .map_err(|_| MessageError::Malformed("invalid Issued At timestamp"))?
        .with_timezone(&Utc);

    Ok(ChallengeFields {
        domain: domain.to_string(),
        address: address.to_string(),
        statement: statement.to_string(),
        uri: uri.to_string(),
        version: version.to_string(),
        chain_id,
        nonce: nonce.to_string(),
        issued_at,
    })
}
