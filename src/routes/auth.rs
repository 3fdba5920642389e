//! Challenge/response auth endpoints.

use crate::auth::middleware::{check_rate_limit, client_ip, AppState};
use crate::auth::{message, verify};
use crate::error::AppError;
use crate::models::{
    AuthRequest, AuthResponse, ChallengeResponse, RegisterIpRequest, StoredChallenge,
};
use crate::recorder::LoginRecord;
use crate::storage::{self, challenge::ClaimOutcome};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::net::SocketAddr;

/// GET /challenge/{address} — Issue a new sign-in challenge
pub async fn request_challenge(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !verify::is_well_formed_address(&address) {
        return Err(AppError::InvalidInput("Invalid Ethereum address".to_string()));
    }
    let address = address.to_ascii_lowercase();

    let mut con = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(AppError::from)?;

    // Keyed by address: the route carries an address path parameter
    let rate_key = format!("ratelimit:challenge:{}", address);
    let decision = check_rate_limit(
        &mut con,
        &rate_key,
        state.config.rate_limit_max,
        state.config.rate_limit_window_secs,
    )
    .await?;
    if !decision.allowed {
        tracing::warn!(action = "rate_limited", endpoint = "challenge", address = %address, "Rate limit exceeded");
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    let nonce = message::generate_nonce();
    let issued_at = Utc::now();
    let challenge_text = message::compose(
        &state.config.auth_domain,
        &verify::to_checksum_address(&address),
        &state.config.auth_uri,
        state.config.chain_id,
        &nonce,
        issued_at,
    );

    let challenge = StoredChallenge {
        address: address.clone(),
        nonce,
        message: challenge_text.clone(),
        expires_at: storage::now_secs() + state.config.challenge_ttl_secs,
        used: false,
    };
    storage::challenge::store_challenge(&mut con, &challenge, state.config.challenge_ttl_secs)
        .await?;

    tracing::info!(action = "challenge_issued", address = %address, "Challenge created");

    Ok(Json(ChallengeResponse {
        challenge: challenge_text,
    }))
}

/// POST /auth — Verify a signed challenge and mint a session token
pub async fn authenticate(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<AuthRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !verify::is_well_formed_address(&req.address) {
        return Err(AppError::InvalidInput("Invalid Ethereum address".to_string()));
    }
    if req.signature.len() < 132 || !req.signature.starts_with("0x") {
        return Err(AppError::InvalidInput("Invalid signature format".to_string()));
    }
    let address = req.address.to_ascii_lowercase();
    let ip = client_ip(&headers, remote, state.config.trusted_proxy_count);

    let mut con = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(AppError::from)?;

    // No address in the path here, so key by client origin
    let rate_key = format!("ratelimit:auth:{}", ip);
    let decision = check_rate_limit(
        &mut con,
        &rate_key,
        state.config.rate_limit_max,
        state.config.rate_limit_window_secs,
    )
    .await?;
    if !decision.allowed {
        tracing::warn!(action = "rate_limited", endpoint = "auth", ip = %ip, "Rate limit exceeded");
        return Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_secs,
        });
    }

    // The signature binds to exactly one stored message: recovery only
    // yields the claimed address for the message the client actually
    // signed. Walk the outstanding records to find it.
    let candidates = storage::challenge::outstanding_for_address(&mut con, &address).await?;
    if candidates.is_empty() {
        return Err(AppError::ChallengeNotFound);
    }

    let now = storage::now_secs();
    let mut matched: Option<&StoredChallenge> = None;
    let mut saw_valid_signature = false;

    for candidate in &candidates {
        match verify::verify(&address, &candidate.message, &req.signature) {
            Ok(_) => {
                matched = Some(candidate);
                break;
            }
            Err(AppError::AddressMismatch) => saw_valid_signature = true,
            Err(_) => {}
        }
    }

    let Some(challenge) = matched else {
        // Well-formed signature that recovers some other signer for every
        // stored message: the client signed with the wrong wallet.
        if saw_valid_signature {
            return Err(AppError::AddressMismatch);
        }
        return Err(AppError::SignatureInvalid(
            "signature does not match any outstanding challenge".to_string(),
        ));
    };

    if challenge.used {
        return Err(AppError::ChallengeAlreadyConsumed);
    }
    if challenge.is_expired(now) {
        return Err(AppError::ChallengeExpired);
    }

    // Atomic claim: exactly one concurrent caller wins.
    match storage::challenge::claim(&mut con, &address, &challenge.nonce).await? {
        ClaimOutcome::Claimed(_) => {}
        ClaimOutcome::AlreadyUsed => return Err(AppError::ChallengeAlreadyConsumed),
        ClaimOutcome::Missing => return Err(AppError::ChallengeNotFound),
    }

    // A verified login retires every other outstanding challenge
    storage::challenge::invalidate_others(&mut con, &address, &challenge.nonce).await?;

    // Implicit account creation on first login; session duration comes
    // from the account preference.
    let upsert = storage::account::upsert_account(
        &mut con,
        &address,
        state.config.session_default_minutes,
        now,
    )
    .await?;
    let minutes = upsert.account().session_duration_minutes;

    let token = state.signer.issue(&address, minutes, now)?;

    tracing::info!(
        action = "auth_success",
        address = %address,
        first_login = upsert.is_new(),
        "User authenticated"
    );

    // Login bookkeeping happens off the response path
    state.recorder.record(LoginRecord {
        address,
        ip: ip.to_string(),
    });

    Ok(Json(AuthResponse {
        success: true,
        token,
    }))
}

/// POST /register-ip — Best-effort background login registration
///
/// Exempt from rate limiting: it never grants a session, and the telemetry
/// is useful. Always 200 on well-formed input.
pub async fn register_ip(
    State(state): State<AppState>,
    Json(req): Json<RegisterIpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !verify::is_well_formed_address(&req.address) {
        return Err(AppError::InvalidInput("Invalid Ethereum address".to_string()));
    }
    if req.ip.parse::<std::net::IpAddr>().is_err() {
        return Err(AppError::InvalidInput("Invalid IP address".to_string()));
    }

    state.recorder.record(LoginRecord {
        address: req.address.to_ascii_lowercase(),
        ip: req.ip,
    });

    Ok(Json(serde_json::json!({ "success": true })))
}
