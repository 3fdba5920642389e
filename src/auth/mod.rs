//! Authentication: challenge messages, EIP-191 signature verification,
//! session tokens, and request extractors.

pub mod message;
pub mod middleware;
pub mod token;
pub mod verify;
