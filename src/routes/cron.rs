use axum::extract::{Query, State};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    error::{AppError, AppResult},
    ingest::{self, SyncReport},
    payroll::{self, RebuildReport},
    response::{ok, ApiJson},
    routes::{admin::RecomputedMonth, resolve_month},
    state::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CronQuery {
    pub secret: Option<String>,
    pub month: Option<String>,
}

/// Cron calls carry the shared secret as `?secret=` or as a bearer token.
/// Without a configured secret the endpoints stay closed.
fn check_secret(
    state: &AppState,
    query: &CronQuery,
    bearer: Option<&TypedHeader<Authorization<Bearer>>>,
) -> AppResult<()> {
    let Some(expected) = state.config.cron_secret.as_deref() else {
        tracing::warn!("cron call rejected: CRON_SECRET is not configured");
        return Err(AppError::forbidden());
    };
    let presented = query
        .secret
        .as_deref()
        .or_else(|| bearer.map(|TypedHeader(Authorization(b))| b.token()));
    match presented {
        Some(secret) if secrets_match(secret, expected) => Ok(()),
        _ => Err(AppError::forbidden()),
    }
}

/// Compares digests byte by byte without an early exit.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[derive(Serialize)]
pub struct CronSync {
    #[serde(flatten)]
    pub report: SyncReport,
    pub recomputed: Vec<RecomputedMonth>,
}

/// Pulls the attendance export from `ATTENDANCE_CSV_URL`, replaces the table
/// and recomputes the months it covers.
pub async fn sync(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AppResult<ApiJson<CronSync>> {
    check_secret(&state, &query, bearer.as_ref())?;
    let url = state
        .config
        .attendance_csv_url
        .as_deref()
        .ok_or_else(|| AppError::bad_request("ATTENDANCE_CSV_URL is not configured"))?;

    let response = state
        .http
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| {
            tracing::error!(error = %err, "attendance export download failed");
            AppError::new(
                axum::http::StatusCode::BAD_GATEWAY,
                "could not download attendance export",
            )
        })?;
    let bytes = response.bytes().await.map_err(AppError::internal)?;
    let text = ingest::decode_text(&bytes);

    let mut conn = state.db()?;
    let report = ingest::sync_attendance(&mut conn, &text)?;
    let mut recomputed = Vec::with_capacity(report.months.len());
    for month in &report.months {
        let earnings =
            payroll::recompute_monthly_earnings(&mut conn, *month, &state.config.payroll)?;
        recomputed.push(RecomputedMonth {
            month: *month,
            earnings,
        });
    }

    tracing::info!(
        inserted = report.inserted,
        months = recomputed.len(),
        "cron attendance sync finished"
    );
    Ok(ok(CronSync { report, recomputed }))
}

pub async fn rebuild(
    State(state): State<AppState>,
    Query(query): Query<CronQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> AppResult<ApiJson<RebuildReport>> {
    check_secret(&state, &query, bearer.as_ref())?;
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    let report = payroll::rebuild_month(&mut conn, month, &state.config.payroll)?;
    tracing::info!(
        month = %month,
        bonuses = report.bonuses,
        capped = report.capped,
        earnings = report.earnings,
        "cron rebuild finished"
    );
    Ok(ok(report))
}
