//! Challenge ledger Redis operations.
//!
//! Redis key patterns:
//! - `challenge:{address}:{nonce}` — challenge record (JSON)
//! - `challenges:{address}` — set of outstanding nonces for the address
//!
//! A challenge has exactly two terminal states: consumed (the `used` flag
//! flipped by [`claim`]) or expired (passive, checked against `expires_at`
//! at read time). The claim is a single Lua compare-and-swap so two
//! concurrent verification attempts can never both win.
//!
//! Records outlive their logical expiry by a short grace window (and
//! consumed records keep their remaining TTL) so that replays and late
//! submissions surface as "already consumed" / "expired" rather than
//! "not found".

use crate::models::StoredChallenge;
use redis::AsyncCommands;

/// Extra seconds a record is retained past its logical expiry.
const EXPIRED_RETENTION_SECS: u64 = 120;

fn challenge_key(address: &str, nonce: &str) -> String {
    format!("challenge:{}:{}", address, nonce)
}

fn index_key(address: &str) -> String {
    format!("challenges:{}", address)
}

/// Outcome of an atomic claim attempt.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// This caller won; the record as it was before the flip.
    Claimed(StoredChallenge),
    /// Another caller consumed the challenge first.
    AlreadyUsed,
    /// No record exists (never issued, or retention lapsed).
    Missing,
}

/// Store a freshly issued challenge.
///
/// No prior record for the address is altered; multiple outstanding
/// challenges per address are allowed.
pub async fn store_challenge<C>(
    con: &mut C,
    challenge: &StoredChallenge,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let key = challenge_key(&challenge.address, &challenge.nonce);
    let index = index_key(&challenge.address);
    let json =
        serde_json::to_string(challenge).map_err(|e| super::json_error("JSON serialize", e))?;

    let retention = ttl_secs + EXPIRED_RETENTION_SECS;
    con.set_ex::<_, _, ()>(&key, json, retention).await?;
    con.sadd::<_, _, ()>(&index, &challenge.nonce).await?;
    // Challenges for one address share a TTL, so the newest insert extends
    // the index far enough for every member.
    con.expire::<_, ()>(&index, retention as i64).await?;

    Ok(())
}

/// All challenge records still held for an address, used or not.
///
/// Nonces whose records have lapsed are pruned from the index as a side
/// effect.
pub async fn outstanding_for_address<C>(
    con: &mut C,
    address: &str,
) -> Result<Vec<StoredChallenge>, redis::RedisError>
where
    C: AsyncCommands,
{
    let index = index_key(address);
    let nonces: Vec<String> = con.smembers(&index).await?;

    let mut challenges = Vec::with_capacity(nonces.len());
    for nonce in nonces {
        let json: Option<String> = con.get(challenge_key(address, &nonce)).await?;
        match json {
            Some(data) => {
                let challenge = serde_json::from_str(&data)
                    .map_err(|e| super::json_error("JSON deserialize", e))?;
                challenges.push(challenge);
            }
            None => {
                con.srem::<_, _, ()>(&index, &nonce).await?;
            }
        }
    }
    Ok(challenges)
}

/// Atomically flip a challenge's `used` flag from false to true.
///
/// Implemented as a single Lua conditional update: concurrent claims of the
/// same challenge yield exactly one `Claimed`, the rest `AlreadyUsed`. The
/// record keeps its remaining TTL so later replays are still recognizable.
pub async fn claim<C>(
    con: &mut C,
    address: &str,
    nonce: &str,
) -> Result<ClaimOutcome, redis::RedisError>
where
    C: AsyncCommands,
{
    let script = redis::Script::new(
        r"
        local val = redis.call('GET', KEYS[1])
        if not val then
            return nil
        end
        local obj = cjson.decode(val)
        if obj.used then
            return 'USED'
        end
        obj.used = true
        redis.call('SET', KEYS[1], cjson.encode(obj), 'KEEPTTL')
        return val
        ",
    );

    let result: Option<String> = script
        .key(challenge_key(address, nonce))
        .invoke_async(con)
        .await?;

    match result {
        None => Ok(ClaimOutcome::Missing),
        Some(val) if val == "USED" => Ok(ClaimOutcome::AlreadyUsed),
        Some(val) => {
            let challenge =
                serde_json::from_str(&val).map_err(|e| super::json_error("JSON deserialize", e))?;
            Ok(ClaimOutcome::Claimed(challenge))
        }
    }
}

/// Delete every challenge for an address except the one just consumed.
///
/// Defense against a client holding multiple stale challenges: once one is
/// verified, the rest can never be replayed.
pub async fn invalidate_others<C>(
    con: &mut C,
    address: &str,
    keep_nonce: &str,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let index = index_key(address);
    let nonces: Vec<String> = con.smembers(&index).await?;

    for nonce in nonces {
        if nonce == keep_nonce {
            continue;
        }
        con.del::<_, ()>(challenge_key(address, &nonce)).await?;
        con.srem::<_, _, ()>(&index, &nonce).await?;
    }
    Ok(())
}
