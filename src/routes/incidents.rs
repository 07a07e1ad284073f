use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{CurrentWorker, Role},
    error::{AppError, AppResult},
    incidents::{
        self, IncidentDraft, IncidentKind, IncidentSource, IncidentStatus, Resolution,
    },
    models::ShiftIncident,
    month::MonthDate,
    response::{ok, ApiJson},
    schema::{shift_incidents, workers},
    state::AppState,
};

const LIST_LIMIT: i64 = 500;

#[derive(Debug, Serialize)]
pub struct IncidentView {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub worker_name: Option<String>,
    pub kind: String,
    pub incident_date: NaiveDate,
    pub month: MonthDate,
    pub status: String,
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
    pub source: String,
    pub created_by: Option<Uuid>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl IncidentView {
    fn new(row: ShiftIncident, worker_name: Option<String>) -> Self {
        Self {
            id: row.id,
            worker_id: row.worker_id,
            worker_name,
            kind: row.kind,
            incident_date: row.incident_date,
            month: MonthDate::containing(row.month_date),
            status: row.status,
            penalty_cents: row.penalty_cents,
            notes: row.notes,
            source: row.source,
            created_by: row.created_by,
            resolved_by: row.resolved_by,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct IncidentQuery {
    pub month: Option<String>,
    pub worker_id: Option<Uuid>,
    pub status: Option<String>,
}

/// Staff see every incident; tarotistas only their own.
pub async fn list_incidents(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<IncidentQuery>,
) -> AppResult<ApiJson<Vec<IncidentView>>> {
    let worker_filter = if current.is_staff() {
        query.worker_id
    } else {
        Some(current.target(query.worker_id)?)
    };
    let month = query
        .month
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(MonthDate::parse)
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            IncidentStatus::parse(raw)
                .ok_or_else(|| AppError::bad_request(format!("unknown status {raw:?}")))
        })
        .transpose()?;

    let mut conn = state.db()?;
    let mut listing = shift_incidents::table
        .inner_join(workers::table)
        .select((shift_incidents::all_columns, workers::display_name))
        .order((
            shift_incidents::incident_date.desc(),
            shift_incidents::created_at.desc(),
        ))
        .limit(LIST_LIMIT)
        .into_boxed();
    if let Some(worker_id) = worker_filter {
        listing = listing.filter(shift_incidents::worker_id.eq(worker_id));
    }
    if let Some(month) = month {
        listing = listing.filter(shift_incidents::month_date.eq(month.first_day()));
    }
    if let Some(status) = status {
        listing = listing.filter(shift_incidents::status.eq(status.as_str()));
    }

    let rows: Vec<(ShiftIncident, String)> = listing.load(&mut conn)?;
    Ok(ok(rows
        .into_iter()
        .map(|(row, name)| IncidentView::new(row, Some(name)))
        .collect()))
}

#[derive(Deserialize)]
pub struct CreateIncidentRequest {
    pub worker_id: Uuid,
    pub kind: String,
    pub incident_date: Option<NaiveDate>,
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
}

pub async fn create_incident(
    State(state): State<AppState>,
    current: CurrentWorker,
    Json(payload): Json<CreateIncidentRequest>,
) -> AppResult<(StatusCode, ApiJson<IncidentView>)> {
    current.require(&[Role::Admin, Role::Central])?;
    let kind = IncidentKind::parse(&payload.kind).ok_or_else(|| {
        AppError::bad_request("kind must be one of late, absence, manual")
    })?;
    let source = match current.role {
        Role::Admin => IncidentSource::Admin,
        _ => IncidentSource::Central,
    };

    let mut conn = state.db()?;
    let worker_name: String = workers::table
        .find(payload.worker_id)
        .select(workers::display_name)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("worker does not exist"))?;

    let incident = incidents::insert_incident(
        &mut conn,
        IncidentDraft {
            worker_id: payload.worker_id,
            kind,
            incident_date: payload
                .incident_date
                .unwrap_or_else(|| state.today()),
            penalty_cents: payload.penalty_cents,
            notes: payload
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            source,
            created_by: Some(current.id()),
        },
    )?;

    Ok((
        StatusCode::CREATED,
        ok(IncidentView::new(incident, Some(worker_name))),
    ))
}

pub async fn get_incident(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(incident_id): Path<Uuid>,
) -> AppResult<ApiJson<IncidentView>> {
    let mut conn = state.db()?;
    let (row, name): (ShiftIncident, String) = shift_incidents::table
        .inner_join(workers::table)
        .filter(shift_incidents::id.eq(incident_id))
        .select((shift_incidents::all_columns, workers::display_name))
        .first(&mut conn)?;
    current.require_view_of(row.worker_id)?;
    Ok(ok(IncidentView::new(row, Some(name))))
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub status: String,
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
}

pub async fn resolve_incident(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(incident_id): Path<Uuid>,
    Json(payload): Json<ResolveRequest>,
) -> AppResult<ApiJson<IncidentView>> {
    current.require(&[Role::Admin])?;
    let target = match IncidentStatus::parse(&payload.status) {
        Some(
            status @ (IncidentStatus::Justified
            | IncidentStatus::Unjustified
            | IncidentStatus::Resolved),
        ) => status,
        _ => {
            return Err(AppError::bad_request(
                "status must be one of justified, unjustified, resolved",
            ))
        }
    };

    let mut conn = state.db()?;
    let updated = incidents::resolve_incident(
        &mut conn,
        incident_id,
        target,
        Resolution {
            penalty_cents: payload.penalty_cents,
            notes: payload.notes,
        },
        current.id(),
    )?;
    Ok(ok(IncidentView::new(updated, None)))
}

#[derive(Deserialize, Default)]
pub struct CancelRequest {
    pub notes: Option<String>,
}

pub async fn cancel_incident(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(incident_id): Path<Uuid>,
    payload: Option<Json<CancelRequest>>,
) -> AppResult<ApiJson<IncidentView>> {
    current.require(&[Role::Admin])?;
    let notes = payload.and_then(|Json(body)| body.notes);

    let mut conn = state.db()?;
    let updated = incidents::resolve_incident(
        &mut conn,
        incident_id,
        IncidentStatus::Cancelled,
        Resolution {
            penalty_cents: None,
            notes,
        },
        current.id(),
    )?;
    Ok(ok(IncidentView::new(updated, None)))
}
