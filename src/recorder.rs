//! Background login recorder.
//!
//! Successful logins (and best-effort IP registrations) are written to the
//! identity store off the request path: handlers enqueue a record into a
//! bounded channel and respond immediately; a worker task drains the queue,
//! upserting the account and appending the login event with a small retry
//! budget. A storage hiccup here is logged and dropped, never surfaced to
//! the client.

use crate::storage;
use std::time::Duration;
use tokio::sync::mpsc;

const WRITE_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// One login to persist.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    /// Lowercase wallet address.
    pub address: String,
    pub ip: String,
}

/// Handle for enqueueing login records. Cheap to clone.
#[derive(Clone)]
pub struct LoginRecorder {
    tx: mpsc::Sender<LoginRecord>,
}

impl LoginRecorder {
    /// Spawn the worker task and return the enqueue handle.
    pub fn spawn(
        redis: redis::Client,
        capacity: usize,
        default_session_minutes: u64,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        tokio::spawn(run_worker(redis, rx, default_session_minutes));
        Self { tx }
    }

    /// Enqueue a record without blocking. A full queue drops the record
    /// with a warning; the login itself already succeeded.
    pub fn record(&self, record: LoginRecord) {
        if let Err(e) = self.tx.try_send(record) {
            tracing::warn!(error = %e, "Login record queue full, dropping entry");
        }
    }
}

async fn run_worker(
    redis: redis::Client,
    mut rx: mpsc::Receiver<LoginRecord>,
    default_session_minutes: u64,
) {
    while let Some(record) = rx.recv().await {
        let mut last_err = None;
        for attempt in 1..=WRITE_ATTEMPTS {
            match write_record(&redis, &record, default_session_minutes).await {
                Ok(first_login) => {
                    tracing::debug!(
                        address = %record.address,
                        first_login,
                        "Login recorded"
                    );
                    last_err = None;
                    break;
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt < WRITE_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        if let Some(e) = last_err {
            tracing::error!(
                address = %record.address,
                error = %e,
                "Failed to record login after {} attempts",
                WRITE_ATTEMPTS
            );
        }
    }
}

async fn write_record(
    redis: &redis::Client,
    record: &LoginRecord,
    default_session_minutes: u64,
) -> Result<bool, redis::RedisError> {
    let mut con = redis.get_multiplexed_async_connection().await?;
    let outcome = storage::account::record_login(
        &mut con,
        &record.address,
        &record.ip,
        default_session_minutes,
        storage::now_secs(),
    )
    .await?;
    Ok(outcome.is_new())
}
