//! Request and response models for the API.
//!
//! All models use serde for serialization/deserialization.
//! Storage models represent Redis data structures.

use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Response containing the challenge message to sign.
#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// Request to exchange a signed challenge for a session token.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub address: String,
    pub signature: String, // 0x-prefixed hex, 65 bytes
}

/// Response after successful verification.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
}

/// Account summary returned by /userinfo.
#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub address: String,
    pub login_count: u64,
    pub last_login: Option<u64>,
    pub display_name: Option<String>,
    pub session_duration_minutes: u64,
}

/// Request to update the session-duration preference.
///
/// `minutes` is signed so that negative values reach our range check
/// instead of failing JSON deserialization.
#[derive(Debug, Deserialize)]
pub struct SessionDurationRequest {
    pub minutes: i64,
}

/// Best-effort background login registration.
#[derive(Debug, Deserialize)]
pub struct RegisterIpRequest {
    pub address: String,
    pub ip: String,
}

/// Aggregate user statistics.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_users: u64,
    pub active_last_30_days: u64,
}

// ============================================================================
// Storage Models
// ============================================================================

/// Account data as stored in Redis (`account:{address}`).
///
/// The login log lives in a separate Redis list (`logins:{address}`) so
/// appends are atomic and never rewrite this document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub address: String, // lowercase 0x-prefixed
    #[serde(default)]
    pub display_name: Option<String>,
    pub session_duration_minutes: u64,
    pub created_at: u64,
}

/// One entry in an account's append-only login log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub timestamp: u64,
    pub ip: String,
}

/// Outcome of an account upsert, so callers can distinguish first-login
/// from returning-user without re-querying.
#[derive(Debug, Clone)]
pub enum AccountUpsert {
    Created(Account),
    Existing(Account),
}

impl AccountUpsert {
    pub fn account(&self) -> &Account {
        match self {
            AccountUpsert::Created(a) | AccountUpsert::Existing(a) => a,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AccountUpsert::Created(_))
    }
}

/// Challenge data as stored in Redis (`challenge:{address}:{nonce}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub address: String, // lowercase 0x-prefixed
    pub nonce: String,
    pub message: String,
    pub expires_at: u64,
    pub used: bool,
}

impl StoredChallenge {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}
