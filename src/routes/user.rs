//! Authenticated account endpoints and developer stats.

use crate::auth::middleware::{AppState, AuthSession};
use crate::auth::verify;
use crate::error::AppError;
use crate::models::{SessionDurationRequest, StatsResponse, UserInfoResponse};
use crate::storage;
use axum::{extract::State, response::IntoResponse, Json};

/// GET /userinfo — Account summary for the authenticated address
pub async fn userinfo(
    session: AuthSession,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let mut con = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(AppError::from)?;

    let account = storage::account::get_account(&mut con, &session.address)
        .await?
        .ok_or(AppError::AccountNotFound)?;

    let login_count = storage::account::login_count(&mut con, &session.address).await?;
    let last_login = storage::account::last_login(&mut con, &session.address)
        .await?
        .map(|event| event.timestamp);

    Ok(Json(UserInfoResponse {
        address: verify::to_checksum_address(&account.address),
        login_count,
        last_login,
        display_name: account.display_name,
        session_duration_minutes: account.session_duration_minutes,
    }))
}

/// POST /settings/session-duration — Update the session-duration preference
///
/// Bounded to 7 days. Does not retroactively affect tokens already issued.
pub async fn set_session_duration(
    session: AuthSession,
    State(state): State<AppState>,
    Json(req): Json<SessionDurationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let max = state.config.session_max_minutes;
    if req.minutes <= 0 || req.minutes as u64 > max {
        return Err(AppError::InvalidInput(format!(
            "Session duration must be between 1 and {} minutes",
            max
        )));
    }

    let mut con = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(AppError::from)?;

    let mut account = storage::account::get_account(&mut con, &session.address)
        .await?
        .ok_or(AppError::AccountNotFound)?;

    account.session_duration_minutes = req.minutes as u64;
    storage::account::save_account(&mut con, &account).await?;

    tracing::info!(
        action = "session_duration_updated",
        address = %session.address,
        minutes = req.minutes,
        "Session duration preference changed"
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "minutes": req.minutes,
    })))
}

/// GET /stats/users — Aggregate user counts
pub async fn user_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut con = state
        .redis
        .get_multiplexed_async_connection()
        .await
        .map_err(AppError::from)?;

    let (total_users, active_last_30_days) =
        storage::account::user_stats(&mut con, storage::now_secs()).await?;

    Ok(Json(StatsResponse {
        total_users,
        active_last_30_days,
    }))
}
