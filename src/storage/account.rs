//! Account and login-log Redis operations.
//!
//! Redis key patterns:
//! - `account:{address}` — account document (JSON), address lowercase
//! - `logins:{address}` — append-only login log (list of JSON events)
//!
//! The login log is a Redis list so appends are atomic (RPUSH) and never
//! rewrite the account document. Accounts are never deleted by this core.

use crate::models::{Account, AccountUpsert, LoginEvent};
use redis::AsyncCommands;

const THIRTY_DAYS_SECS: u64 = 30 * 24 * 60 * 60;

fn account_key(address: &str) -> String {
    format!("account:{}", address)
}

fn logins_key(address: &str) -> String {
    format!("logins:{}", address)
}

/// Create the account if missing (SET NX, atomic), returning a tagged
/// outcome so callers can distinguish first-login from returning-user.
pub async fn upsert_account<C>(
    con: &mut C,
    address: &str,
    default_session_minutes: u64,
    now: u64,
) -> Result<AccountUpsert, redis::RedisError>
where
    C: AsyncCommands,
{
    let account = Account {
        address: address.to_string(),
        display_name: None,
        session_duration_minutes: default_session_minutes,
        created_at: now,
    };
    let json =
        serde_json::to_string(&account).map_err(|e| super::json_error("JSON serialize", e))?;

    let created: bool = con.set_nx(account_key(address), json).await?;
    if created {
        return Ok(AccountUpsert::Created(account));
    }

    match get_account(con, address).await? {
        Some(existing) => Ok(AccountUpsert::Existing(existing)),
        // The document vanished between SET NX and GET; treat our copy as
        // authoritative rather than failing the login.
        None => Ok(AccountUpsert::Created(account)),
    }
}

pub async fn get_account<C>(
    con: &mut C,
    address: &str,
) -> Result<Option<Account>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(account_key(address)).await?;
    match json {
        Some(data) => {
            let account = serde_json::from_str(&data)
                .map_err(|e| super::json_error("JSON deserialize", e))?;
            Ok(Some(account))
        }
        None => Ok(None),
    }
}

/// Overwrite the account document (preference updates).
pub async fn save_account<C>(con: &mut C, account: &Account) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let json =
        serde_json::to_string(account).map_err(|e| super::json_error("JSON serialize", e))?;
    con.set::<_, _, ()>(account_key(&account.address), json)
        .await?;
    Ok(())
}

/// Append a login event to the account's log.
pub async fn append_login<C>(
    con: &mut C,
    address: &str,
    event: &LoginEvent,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let json = serde_json::to_string(event).map_err(|e| super::json_error("JSON serialize", e))?;
    con.rpush::<_, _, ()>(logins_key(address), json).await?;
    Ok(())
}

/// Upsert the account and append one login entry. Used by the background
/// login writer; callers on the request path should not await this.
pub async fn record_login<C>(
    con: &mut C,
    address: &str,
    ip: &str,
    default_session_minutes: u64,
    now: u64,
) -> Result<AccountUpsert, redis::RedisError>
where
    C: AsyncCommands,
{
    let outcome = upsert_account(con, address, default_session_minutes, now).await?;
    append_login(
        con,
        address,
        &LoginEvent {
            timestamp: now,
            ip: ip.to_string(),
        },
    )
    .await?;
    Ok(outcome)
}

pub async fn login_count<C>(con: &mut C, address: &str) -> Result<u64, redis::RedisError>
where
    C: AsyncCommands,
{
    let count: u64 = con.llen(logins_key(address)).await?;
    Ok(count)
}

/// Most recent login event, if any.
pub async fn last_login<C>(
    con: &mut C,
    address: &str,
) -> Result<Option<LoginEvent>, redis::RedisError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.lindex(logins_key(address), -1).await?;
    match json {
        Some(data) => {
            let event = serde_json::from_str(&data)
                .map_err(|e| super::json_error("JSON deserialize", e))?;
            Ok(Some(event))
        }
        None => Ok(None),
    }
}

/// Total accounts and accounts with a login in the last 30 days.
///
/// Scans `account:*`, so results are capped by the SCAN limit; good enough
/// for a developer stats endpoint.
pub async fn user_stats<C>(con: &mut C, now: u64) -> Result<(u64, u64), redis::RedisError>
where
    C: AsyncCommands,
{
    let keys = super::scan_keys(con, "account:*").await?;
    let total = keys.len() as u64;

    let cutoff = now.saturating_sub(THIRTY_DAYS_SECS);
    let mut active = 0u64;
    for key in keys {
        let Some(address) = key.strip_prefix("account:") else {
            continue;
        };
        if let Some(event) = last_login(con, address).await? {
            if event.timestamp >= cutoff {
                active += 1;
            }
        }
    }
    Ok((total, active))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::now_secs;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    async fn test_connection() -> Option<redis::aio::MultiplexedConnection> {
        let client = redis::Client::open(redis_url()).ok()?;
        client.get_multiplexed_async_connection().await.ok()
    }

    fn test_address(tag: &str) -> String {
        format!("0xacct{}{}", tag, now_secs())
    }

    #[tokio::test]
    async fn test_upsert_distinguishes_created_from_existing() {
        let Some(mut con) = test_connection().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let address = test_address("upsert");
        let now = now_secs();

        let first = upsert_account(&mut con, &address, 60, now).await.unwrap();
        assert!(first.is_new());
        assert_eq!(first.account().session_duration_minutes, 60);

        let second = upsert_account(&mut con, &address, 60, now).await.unwrap();
        assert!(!second.is_new());
    }

    #[tokio::test]
    async fn test_login_log_is_append_only_and_ordered() {
        let Some(mut con) = test_connection().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let address = test_address("logins");
        let now = now_secs();

        record_login(&mut con, &address, "10.0.0.1", 60, now)
            .await
            .unwrap();
        record_login(&mut con, &address, "10.0.0.2", 60, now + 1)
            .await
            .unwrap();

        assert_eq!(login_count(&mut con, &address).await.unwrap(), 2);

        let last = last_login(&mut con, &address).await.unwrap().unwrap();
        assert_eq!(last.ip, "10.0.0.2");
        assert_eq!(last.timestamp, now + 1);
    }

    #[tokio::test]
    async fn test_preference_update_preserves_account() {
        let Some(mut con) = test_connection().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let address = test_address("pref");
        let now = now_secs();

        upsert_account(&mut con, &address, 60, now).await.unwrap();

        let mut account = get_account(&mut con, &address).await.unwrap().unwrap();
        account.session_duration_minutes = 240;
        save_account(&mut con, &account).await.unwrap();

        let reloaded = get_account(&mut con, &address).await.unwrap().unwrap();
        assert_eq!(reloaded.session_duration_minutes, 240);
        assert_eq!(reloaded.created_at, now);
    }
}
