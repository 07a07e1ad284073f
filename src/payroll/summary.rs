use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use super::WorkerStats;
use crate::month::MonthDate;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursSummaryRow {
    pub worker_id: Uuid,
    pub display_name: String,
    pub minutes_free: i32,
    pub minutes_rueda: i32,
    pub minutes_cliente: i32,
    pub minutes_repite: i32,
    pub minutes_total: i32,
    pub hours_total: f64,
    pub presence_minutes: i64,
    pub presence_hours: f64,
}

impl HoursSummaryRow {
    pub fn new(display_name: String, stats: &WorkerStats, presence_minutes: i64) -> Self {
        Self {
            worker_id: stats.worker_id,
            display_name,
            minutes_free: stats.minutes_free,
            minutes_rueda: stats.minutes_rueda,
            minutes_cliente: stats.minutes_cliente,
            minutes_repite: stats.minutes_repite,
            minutes_total: stats.minutes_total(),
            hours_total: hours(i64::from(stats.minutes_total())),
            presence_minutes,
            presence_hours: hours(presence_minutes),
        }
    }
}

fn hours(minutes: i64) -> f64 {
    (minutes as f64 / 60.0 * 100.0).round() / 100.0
}

/// Whole minutes of a session that fall inside `month`. Open sessions count
/// up to `now`.
pub fn session_minutes_in_month(
    started_at: NaiveDateTime,
    ended_at: Option<NaiveDateTime>,
    month: MonthDate,
    now: NaiveDateTime,
) -> i64 {
    let start = started_at.max(month.start_datetime());
    let end = ended_at.unwrap_or(now).min(month.end_datetime());
    if end <= start {
        return 0;
    }
    (end - start).num_minutes()
}
