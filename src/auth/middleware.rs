//! Axum extractors, rate limiting, and client IP resolution.

use crate::auth::token::TokenSigner;
use crate::config::Config;
use crate::error::AppError;
use crate::recorder::LoginRecorder;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use rand::Rng;
use redis::AsyncCommands;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub redis: redis::Client,
    pub config: Arc<Config>,
    pub signer: Arc<TokenSigner>,
    pub recorder: LoginRecorder,
}

/// Authenticated session extractor.
///
/// Validates the `Authorization: Bearer {token}` JWT. Purely local
/// computation, no storage round-trip. Returns 401 if missing, malformed,
/// or expired.
pub struct AuthSession {
    /// Lowercase wallet address from the token subject.
    pub address: String,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::TokenInvalid("missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::TokenInvalid("invalid authorization format".to_string()))?;

        let claims = state.signer.validate(token)?;

        Ok(AuthSession {
            address: claims.sub,
        })
    }
}

/// Resolve the client IP, honoring `X-Forwarded-For` up to the configured
/// number of trusted proxies and normalizing IPv6 (v4-mapped addresses
/// collapse to plain IPv4, canonical text form).
pub fn client_ip(headers: &HeaderMap, remote: SocketAddr, trusted_proxies: usize) -> IpAddr {
    let forwarded = if trusted_proxies > 0 {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|value| {
                let hops: Vec<&str> = value.split(',').map(str::trim).collect();
                // The entry N-from-the-end is the first hop not added by
                // our own proxies.
                hops.len()
                    .checked_sub(trusted_proxies)
                    .and_then(|idx| hops.get(idx))
                    .and_then(|hop| hop.parse::<IpAddr>().ok())
            })
    } else {
        None
    };

    normalize_ip(forwarded.unwrap_or_else(|| remote.ip()))
}

fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}

/// Decision from the sliding-window rate limiter.
#[derive(Debug)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until a slot frees up; meaningful when `allowed` is false.
    pub retry_after_secs: u64,
}

/// Sliding-window rate limit check against a Redis sorted set.
///
/// One Lua script prunes entries older than the window, counts what is
/// left, and either admits the request (recording it) or reports how long
/// until the oldest entry ages out. Atomic, so concurrent requests never
/// undercount.
pub async fn check_rate_limit<C>(
    con: &mut C,
    key: &str,
    max: u32,
    window_secs: u64,
) -> Result<RateDecision, redis::RedisError>
where
    C: AsyncCommands,
{
    let script = redis::Script::new(
        r"
        local window_ms = tonumber(ARGV[1])
        local max = tonumber(ARGV[2])
        local now_ms = tonumber(ARGV[3])
        redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, now_ms - window_ms)
        local count = redis.call('ZCARD', KEYS[1])
        if count >= max then
            local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
            local retry_ms = tonumber(oldest[2]) + window_ms - now_ms
            if retry_ms < 1000 then retry_ms = 1000 end
            return {0, retry_ms}
        end
        redis.call('ZADD', KEYS[1], now_ms, ARGV[4])
        redis.call('PEXPIRE', KEYS[1], window_ms)
        return {1, 0}
        ",
    );

    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let member = format!("{}-{:016x}", now_ms, rand::rng().random::<u64>());

    let (allowed, retry_ms): (i64, u64) = script
        .key(key)
        .arg(window_secs * 1000)
        .arg(max)
        .arg(now_ms)
        .arg(member)
        .invoke_async(con)
        .await?;

    Ok(RateDecision {
        allowed: allowed == 1,
        retry_after_secs: retry_ms.div_ceil(1000),
    })
}
