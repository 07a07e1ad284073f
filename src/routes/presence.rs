use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{CurrentWorker, Role},
    error::AppResult,
    models::{PresenceCurrent, PresenceEvent, PresenceSession},
    month::MonthDate,
    payroll::summary::session_minutes_in_month,
    presence::{self, LatenessPolicy, LoginOutcome, PresenceSnapshot, PresenceState},
    response::{ok, ApiJson},
    routes::{resolve_month, MonthQuery},
    schema::{presence_current, presence_events, presence_sessions, workers},
    state::AppState,
};

const STAFF: &[Role] = &[Role::Admin, Role::Central];
const DEFAULT_EVENT_LIMIT: i64 = 100;
const MAX_EVENT_LIMIT: i64 = 500;

pub async fn login(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<LoginOutcome>> {
    let policy = LatenessPolicy {
        offset: state.config.local_offset(),
        grace_minutes: state.config.late_grace_minutes,
    };
    let mut conn = state.db()?;
    let outcome = presence::login(&mut conn, &current.worker, policy, Utc::now())?;
    if let Some(incident_id) = outcome.late_incident_id {
        tracing::info!(worker_id = %current.id(), incident_id = %incident_id, "late login recorded");
    }
    Ok(ok(outcome))
}

pub async fn logout(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<PresenceSnapshot>> {
    let mut conn = state.db()?;
    let snapshot = presence::logout(&mut conn, current.id(), Utc::now().naive_utc())?;
    Ok(ok(snapshot))
}

#[derive(Deserialize)]
pub struct StateRequest {
    pub state: String,
}

pub async fn change_state(
    State(state): State<AppState>,
    current: CurrentWorker,
    Json(payload): Json<StateRequest>,
) -> AppResult<ApiJson<PresenceSnapshot>> {
    let target = PresenceState::parse(&payload.state)?;
    let mut conn = state.db()?;
    let snapshot =
        presence::change_state(&mut conn, current.id(), target, Utc::now().naive_utc())?;
    Ok(ok(snapshot))
}

pub async fn me(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<PresenceSnapshot>> {
    let mut conn = state.db()?;
    Ok(ok(presence::current(&mut conn, current.id())?))
}

#[derive(Serialize)]
pub struct PresenceBoardRow {
    pub worker_id: Uuid,
    pub display_name: String,
    pub role: String,
    pub state: PresenceState,
    pub session_id: Option<Uuid>,
    pub changed_at: Option<NaiveDateTime>,
}

/// Live board of every active worker. Workers that never clocked in show as
/// offline.
pub async fn current(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<Vec<PresenceBoardRow>>> {
    current.require(STAFF)?;
    let mut conn = state.db()?;

    let roster: Vec<(Uuid, String, String)> = workers::table
        .filter(workers::is_active.eq(true))
        .select((workers::id, workers::display_name, workers::role))
        .order(workers::display_name.asc())
        .load(&mut conn)?;
    let rows: HashMap<Uuid, PresenceCurrent> = presence_current::table
        .load::<PresenceCurrent>(&mut conn)?
        .into_iter()
        .map(|row| (row.worker_id, row))
        .collect();

    let board = roster
        .into_iter()
        .map(|(worker_id, display_name, role)| {
            let row = rows.get(&worker_id);
            PresenceBoardRow {
                worker_id,
                display_name,
                role,
                state: row
                    .and_then(|r| PresenceState::parse(&r.state).ok())
                    .unwrap_or(PresenceState::Offline),
                session_id: row.and_then(|r| r.session_id),
                changed_at: row.map(|r| r.changed_at),
            }
        })
        .collect();

    Ok(ok(board))
}

#[derive(Deserialize)]
pub struct EventsQuery {
    pub worker_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct EventView {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub display_name: String,
    pub session_id: Option<Uuid>,
    pub state: String,
    pub occurred_at: NaiveDateTime,
}

/// Most recent presence changes, newest first.
pub async fn events(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<EventsQuery>,
) -> AppResult<ApiJson<Vec<EventView>>> {
    current.require(STAFF)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);

    let mut conn = state.db()?;
    let mut listing = presence_events::table
        .inner_join(workers::table)
        .select((presence_events::all_columns, workers::display_name))
        .order(presence_events::occurred_at.desc())
        .limit(limit)
        .into_boxed();
    if let Some(worker_id) = query.worker_id {
        listing = listing.filter(presence_events::worker_id.eq(worker_id));
    }

    let rows: Vec<(PresenceEvent, String)> = listing.load(&mut conn)?;
    Ok(ok(rows
        .into_iter()
        .map(|(event, display_name)| EventView {
            id: event.id,
            worker_id: event.worker_id,
            display_name,
            session_id: event.session_id,
            state: event.state,
            occurred_at: event.occurred_at,
        })
        .collect()))
}

#[derive(Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub minutes_in_month: i64,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub worker_id: Uuid,
    pub month: MonthDate,
    pub total_minutes: i64,
    pub sessions: Vec<SessionView>,
}

/// Sessions overlapping the month. Staff may ask for any worker.
pub async fn sessions(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<SessionsResponse>> {
    let worker_id = current.target(query.worker_id)?;
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;

    let rows: Vec<PresenceSession> = presence_sessions::table
        .filter(presence_sessions::worker_id.eq(worker_id))
        .filter(presence_sessions::started_at.lt(month.end_datetime()))
        .filter(
            presence_sessions::ended_at
                .is_null()
                .or(presence_sessions::ended_at.gt(month.start_datetime())),
        )
        .order(presence_sessions::started_at.asc())
        .load(&mut conn)?;

    let now = Utc::now().naive_utc();
    let sessions: Vec<SessionView> = rows
        .into_iter()
        .map(|session| SessionView {
            minutes_in_month: session_minutes_in_month(
                session.started_at,
                session.ended_at,
                month,
                now,
            ),
            id: session.id,
            started_at: session.started_at,
            ended_at: session.ended_at,
        })
        .collect();

    Ok(ok(SessionsResponse {
        worker_id,
        month,
        total_minutes: sessions.iter().map(|s| s.minutes_in_month).sum(),
        sessions,
    }))
}
