use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::{password, CurrentWorker, Role},
    error::{AppError, AppResult},
    ingest::{self, normalize::fold_key, SyncReport},
    models::{
        AttendanceRow, NewTeam, NewTeamMember, NewUser, NewWorker, NewWorkerNameMapping, Team,
        Worker, WorkerNameMapping,
    },
    month::MonthDate,
    payroll::{self, HoursSummaryRow, RebuildReport},
    response::{ok, ApiJson},
    routes::{resolve_month, MonthQuery},
    schema::{attendance_rows, team_members, teams, users, worker_name_mappings, workers},
    state::AppState,
    utils::json::{nullable_string, optional_bool, optional_string, Patch},
};

const ADMIN: &[Role] = &[Role::Admin];

#[derive(Debug, Serialize)]
pub struct WorkerView {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub external_ref: Option<String>,
    pub shift_start: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Worker> for WorkerView {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            user_id: worker.user_id,
            email: None,
            display_name: worker.display_name,
            role: worker.role,
            is_active: worker.is_active,
            external_ref: worker.external_ref,
            shift_start: worker.shift_start.map(|t| t.format("%H:%M").to_string()),
            created_at: worker.created_at,
            updated_at: worker.updated_at,
        }
    }
}

fn parse_role(raw: &str) -> AppResult<Role> {
    Role::parse(raw).ok_or_else(|| {
        AppError::bad_request(format!(
            "role must be one of admin, central, tarotista; got {raw:?}"
        ))
    })
}

fn parse_shift_start(raw: &str) -> Result<NaiveTime, String> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| format!("shift_start must be HH:MM, got {raw:?}"))
}

fn validate_password(raw: &str) -> AppResult<()> {
    if raw.chars().count() < password::MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must have at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("email is invalid"));
    }
    Ok(email)
}

fn is_unique_violation(err: &diesel::result::Error) -> bool {
    matches!(
        err,
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _
        )
    )
}

pub async fn list_workers(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<Vec<WorkerView>>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;

    let rows: Vec<(Worker, String)> = workers::table
        .inner_join(users::table)
        .select((workers::all_columns, users::email))
        .order(workers::display_name.asc())
        .load(&mut conn)?;

    Ok(ok(rows
        .into_iter()
        .map(|(worker, email)| WorkerView {
            email: Some(email),
            ..WorkerView::from(worker)
        })
        .collect()))
}

#[derive(Deserialize)]
pub struct CreateWorkerRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub role: String,
    pub external_ref: Option<String>,
    pub shift_start: Option<String>,
}

pub async fn create_worker(
    State(state): State<AppState>,
    current: CurrentWorker,
    Json(payload): Json<CreateWorkerRequest>,
) -> AppResult<(StatusCode, ApiJson<WorkerView>)> {
    current.require(ADMIN)?;

    let email = normalize_email(&payload.email)?;
    validate_password(&payload.password)?;
    let role = parse_role(&payload.role)?;
    let display_name = payload.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(AppError::bad_request("display_name must not be empty"));
    }
    let shift_start = payload
        .shift_start
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(parse_shift_start)
        .transpose()
        .map_err(AppError::bad_request)?;
    let password_hash = password::hash_password(&payload.password)?;

    let mut conn = state.db()?;
    let created = conn.transaction::<Worker, diesel::result::Error, _>(|conn| {
        let user = NewUser {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
        };
        diesel::insert_into(users::table)
            .values(&user)
            .execute(conn)?;

        diesel::insert_into(workers::table)
            .values(&NewWorker {
                id: Uuid::new_v4(),
                user_id: user.id,
                display_name,
                role: role.as_str().to_string(),
                is_active: true,
                external_ref: payload
                    .external_ref
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty()),
                shift_start,
            })
            .get_result(conn)
    });

    let worker = match created {
        Ok(worker) => worker,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::bad_request("email already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(worker_id = %worker.id, role = %worker.role, "worker created");
    Ok((
        StatusCode::CREATED,
        ok(WorkerView {
            email: Some(email),
            ..WorkerView::from(worker)
        }),
    ))
}

pub async fn get_worker(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(worker_id): Path<Uuid>,
) -> AppResult<ApiJson<WorkerView>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;
    let (worker, email): (Worker, String) = workers::table
        .inner_join(users::table)
        .filter(workers::id.eq(worker_id))
        .select((workers::all_columns, users::email))
        .first(&mut conn)?;
    Ok(ok(WorkerView {
        email: Some(email),
        ..WorkerView::from(worker)
    }))
}

#[derive(AsChangeset)]
#[diesel(table_name = workers)]
struct WorkerChangeset {
    display_name: Option<String>,
    role: Option<String>,
    is_active: Option<bool>,
    external_ref: Option<Option<String>>,
    shift_start: Option<Option<NaiveTime>>,
    updated_at: NaiveDateTime,
}

pub async fn update_worker(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(worker_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<ApiJson<WorkerView>> {
    current.require(ADMIN)?;

    let display_name = optional_string(&body, "display_name")
        .map_err(AppError::bad_request)?
        .map(|name| name.trim().to_string());
    if display_name.as_deref() == Some("") {
        return Err(AppError::bad_request("display_name must not be empty"));
    }
    let role = optional_string(&body, "role")
        .map_err(AppError::bad_request)?
        .map(|raw| parse_role(&raw))
        .transpose()?;
    let is_active = optional_bool(&body, "is_active").map_err(AppError::bad_request)?;
    let external_ref = nullable_string(&body, "external_ref")
        .map_err(AppError::bad_request)?
        .map(|raw| Ok(raw.trim().to_string()))
        .map_err(AppError::bad_request)?;
    let external_ref = match external_ref {
        Patch::Value(value) if value.is_empty() => Patch::Null,
        other => other,
    };
    let shift_start = nullable_string(&body, "shift_start")
        .and_then(|patch| patch.map(|raw| parse_shift_start(&raw)))
        .map_err(AppError::bad_request)?;

    if worker_id == current.id() && (is_active == Some(false) || role.is_some_and(|r| r != Role::Admin)) {
        return Err(AppError::bad_request(
            "admins cannot deactivate or demote themselves",
        ));
    }

    let changes = WorkerChangeset {
        display_name,
        role: role.map(|r| r.as_str().to_string()),
        is_active,
        external_ref: external_ref.into_change(),
        shift_start: shift_start.into_change(),
        updated_at: Utc::now().naive_utc(),
    };

    let mut conn = state.db()?;
    let worker: Worker = diesel::update(workers::table.find(worker_id))
        .set(&changes)
        .get_result(&mut conn)?;

    tracing::info!(worker_id = %worker.id, "worker updated");
    Ok(ok(WorkerView::from(worker)))
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn update_credentials(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(worker_id): Path<Uuid>,
    Json(payload): Json<CredentialsRequest>,
) -> AppResult<ApiJson<Value>> {
    current.require(ADMIN)?;
    if payload.email.is_none() && payload.password.is_none() {
        return Err(AppError::bad_request("provide email or password"));
    }

    let email = payload.email.as_deref().map(normalize_email).transpose()?;
    let password_hash = match payload.password.as_deref() {
        Some(raw) => {
            validate_password(raw)?;
            Some(password::hash_password(raw)?)
        }
        None => None,
    };

    let mut conn = state.db()?;
    let user_id: Uuid = workers::table
        .find(worker_id)
        .select(workers::user_id)
        .first(&mut conn)?;
    let now = Utc::now().naive_utc();

    let result = conn.transaction::<(), diesel::result::Error, _>(|conn| {
        if let Some(email) = &email {
            diesel::update(users::table.find(user_id))
                .set((users::email.eq(email), users::updated_at.eq(now)))
                .execute(conn)?;
        }
        if let Some(hash) = &password_hash {
            diesel::update(users::table.find(user_id))
                .set((users::password_hash.eq(hash), users::updated_at.eq(now)))
                .execute(conn)?;
        }
        Ok(())
    });
    match result {
        Ok(()) => {}
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::bad_request("email already exists"));
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(
        worker_id = %worker_id,
        email_changed = email.is_some(),
        password_changed = password_hash.is_some(),
        "credentials updated"
    );
    Ok(ok(serde_json::json!({ "worker_id": worker_id, "updated": true })))
}

#[derive(Serialize)]
pub struct MappingView {
    pub id: Uuid,
    pub source_key: String,
    pub worker_id: Uuid,
    pub worker_name: String,
    pub created_at: NaiveDateTime,
}

pub async fn list_mappings(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<Vec<MappingView>>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;

    let rows: Vec<(WorkerNameMapping, String)> = worker_name_mappings::table
        .inner_join(workers::table)
        .select((worker_name_mappings::all_columns, workers::display_name))
        .order(worker_name_mappings::source_key.asc())
        .load(&mut conn)?;

    Ok(ok(rows
        .into_iter()
        .map(|(mapping, worker_name)| MappingView {
            id: mapping.id,
            source_key: mapping.source_key,
            worker_id: mapping.worker_id,
            worker_name,
            created_at: mapping.created_at,
        })
        .collect()))
}

#[derive(Deserialize)]
pub struct CreateMappingRequest {
    pub source_name: String,
    pub worker_id: Uuid,
}

pub async fn create_mapping(
    State(state): State<AppState>,
    current: CurrentWorker,
    Json(payload): Json<CreateMappingRequest>,
) -> AppResult<(StatusCode, ApiJson<MappingView>)> {
    current.require(ADMIN)?;
    let source_key = fold_key(&payload.source_name);
    if source_key.is_empty() {
        return Err(AppError::bad_request("source_name must not be empty"));
    }

    let mut conn = state.db()?;
    let worker_name: String = workers::table
        .find(payload.worker_id)
        .select(workers::display_name)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("worker does not exist"))?;

    let inserted = diesel::insert_into(worker_name_mappings::table)
        .values(&NewWorkerNameMapping {
            id: Uuid::new_v4(),
            source_key,
            worker_id: payload.worker_id,
        })
        .get_result::<WorkerNameMapping>(&mut conn);
    let mapping = match inserted {
        Ok(mapping) => mapping,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::bad_request("a mapping for that name already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(source_key = %mapping.source_key, worker_id = %mapping.worker_id, "name mapping created");
    Ok((
        StatusCode::CREATED,
        ok(MappingView {
            id: mapping.id,
            source_key: mapping.source_key,
            worker_id: mapping.worker_id,
            worker_name,
            created_at: mapping.created_at,
        }),
    ))
}

pub async fn delete_mapping(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(mapping_id): Path<Uuid>,
) -> AppResult<ApiJson<Value>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;
    let removed = diesel::delete(worker_name_mappings::table.find(mapping_id)).execute(&mut conn)?;
    if removed == 0 {
        return Err(AppError::not_found());
    }
    Ok(ok(serde_json::json!({ "deleted": mapping_id })))
}

/// Accepts the export either as the raw request body or as the `file` field
/// of a multipart form.
async fn read_csv_body(state: &AppState, request: Request) -> AppResult<String> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    let bytes = if is_multipart {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        let mut file = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?
        {
            if field.name() == Some("file") {
                file = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| AppError::bad_request(err.to_string()))?,
                );
            }
        }
        file.ok_or_else(|| AppError::bad_request("multipart field \"file\" is required"))?
    } else {
        Bytes::from_request(request, state)
            .await
            .map_err(|err| AppError::bad_request(err.body_text()))?
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::bad_request("CSV body is empty"));
    }
    Ok(ingest::decode_text(&bytes))
}

#[derive(Serialize)]
pub struct SyncResponse {
    #[serde(flatten)]
    pub report: SyncReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recomputed: Option<Vec<RecomputedMonth>>,
}

#[derive(Serialize)]
pub struct RecomputedMonth {
    pub month: MonthDate,
    pub earnings: usize,
}

/// Parse, replace attendance and recompute every month the file touches.
pub async fn sync_csv(
    State(state): State<AppState>,
    current: CurrentWorker,
    request: Request,
) -> AppResult<ApiJson<SyncResponse>> {
    current.require(ADMIN)?;
    let text = read_csv_body(&state, request).await?;

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

    Ok(ok(SyncResponse {
        report,
        recomputed: Some(recomputed),
    }))
}

/// Parse and replace attendance only.
pub async fn sync(
    State(state): State<AppState>,
    current: CurrentWorker,
    request: Request,
) -> AppResult<ApiJson<SyncResponse>> {
    current.require(ADMIN)?;
    let text = read_csv_body(&state, request).await?;
    let mut conn = state.db()?;
    let report = ingest::sync_attendance(&mut conn, &text)?;
    Ok(ok(SyncResponse {
        report,
        recomputed: None,
    }))
}

#[derive(Serialize)]
pub struct AttendanceView {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub worker_name: String,
    pub work_date: NaiveDate,
    pub minutes: i32,
    pub code: String,
    pub captured: bool,
    pub source_name: String,
}

pub(crate) fn attendance_for(
    conn: &mut PgConnection,
    month: MonthDate,
    worker_id: Option<Uuid>,
) -> AppResult<Vec<AttendanceView>> {
    let mut query = attendance_rows::table
        .inner_join(workers::table)
        .filter(attendance_rows::work_date.ge(month.first_day()))
        .filter(attendance_rows::work_date.lt(month.end_exclusive()))
        .select((attendance_rows::all_columns, workers::display_name))
        .order((attendance_rows::work_date.asc(), workers::display_name.asc()))
        .into_boxed();
    if let Some(worker_id) = worker_id {
        query = query.filter(attendance_rows::worker_id.eq(worker_id));
    }

    let rows: Vec<(AttendanceRow, String)> = query.load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(row, worker_name)| AttendanceView {
            id: row.id,
            worker_id: row.worker_id,
            worker_name,
            work_date: row.work_date,
            minutes: row.minutes,
            code: row.code,
            captured: row.captured,
            source_name: row.source_name,
        })
        .collect())
}

pub async fn list_attendance(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<AttendanceView>>> {
    current.require(ADMIN)?;
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    Ok(ok(attendance_for(&mut conn, month, query.worker_id)?))
}

/// Month from `?month=` or a JSON body `{"month": ...}`, defaulting to the
/// current one.
fn month_from(
    state: &AppState,
    query: &MonthQuery,
    body: Option<Json<MonthQuery>>,
) -> AppResult<MonthDate> {
    let raw = query
        .month
        .clone()
        .or_else(|| body.and_then(|Json(b)| b.month));
    resolve_month(state, raw.as_deref())
}

pub async fn recompute_earnings(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
    body: Option<Json<MonthQuery>>,
) -> AppResult<ApiJson<RecomputedMonth>> {
    current.require(ADMIN)?;
    let month = month_from(&state, &query, body)?;
    let mut conn = state.db()?;
    let earnings = payroll::recompute_monthly_earnings(&mut conn, month, &state.config.payroll)?;
    Ok(ok(RecomputedMonth { month, earnings }))
}

/// Generate bonuses, cap them and recompute earnings, as one unit.
pub async fn generate_bonus(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
    body: Option<Json<MonthQuery>>,
) -> AppResult<ApiJson<RebuildReport>> {
    current.require(ADMIN)?;
    let month = month_from(&state, &query, body)?;
    let mut conn = state.db()?;
    Ok(ok(payroll::rebuild_month(
        &mut conn,
        month,
        &state.config.payroll,
    )?))
}

pub async fn hours_summary(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<HoursSummaryRow>>> {
    current.require(ADMIN)?;
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    Ok(ok(payroll::admin_hours_summary(
        &mut conn,
        month,
        Utc::now().naive_utc(),
    )?))
}

#[derive(Serialize)]
pub struct TeamMemberView {
    pub worker_id: Uuid,
    pub display_name: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct TeamView {
    pub id: Uuid,
    pub name: String,
    pub central_id: Option<Uuid>,
    pub members: Vec<TeamMemberView>,
    pub created_at: NaiveDateTime,
}

pub(crate) fn load_team_views(
    conn: &mut PgConnection,
    team_list: Vec<Team>,
) -> AppResult<Vec<TeamView>> {
    let ids: Vec<Uuid> = team_list.iter().map(|t| t.id).collect();
    let rows: Vec<(Uuid, Uuid, String, String)> = team_members::table
        .inner_join(workers::table)
        .filter(team_members::team_id.eq_any(&ids))
        .select((
            team_members::team_id,
            workers::id,
            workers::display_name,
            workers::role,
        ))
        .order(workers::display_name.asc())
        .load(conn)?;

    let mut members: HashMap<Uuid, Vec<TeamMemberView>> = HashMap::new();
    for (team_id, worker_id, display_name, role) in rows {
        members.entry(team_id).or_default().push(TeamMemberView {
            worker_id,
            display_name,
            role,
        });
    }

    Ok(team_list
        .into_iter()
        .map(|team| TeamView {
            members: members.remove(&team.id).unwrap_or_default(),
            id: team.id,
            name: team.name,
            central_id: team.central_id,
            created_at: team.created_at,
        })
        .collect())
}

pub async fn list_teams(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<Vec<TeamView>>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;
    let team_list: Vec<Team> = teams::table.order(teams::name.asc()).load(&mut conn)?;
    Ok(ok(load_team_views(&mut conn, team_list)?))
}

#[derive(Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub central_id: Option<Uuid>,
}

pub async fn create_team(
    State(state): State<AppState>,
    current: CurrentWorker,
    Json(payload): Json<CreateTeamRequest>,
) -> AppResult<(StatusCode, ApiJson<TeamView>)> {
    current.require(ADMIN)?;
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let mut conn = state.db()?;
    if let Some(central_id) = payload.central_id {
        let role: Option<String> = workers::table
            .find(central_id)
            .select(workers::role)
            .first(&mut conn)
            .optional()?;
        if role.as_deref() != Some(Role::Central.as_str()) {
            return Err(AppError::bad_request("central_id must reference a central"));
        }
    }

    let inserted = diesel::insert_into(teams::table)
        .values(&NewTeam {
            id: Uuid::new_v4(),
            name,
            central_id: payload.central_id,
        })
        .get_result::<Team>(&mut conn);
    let team = match inserted {
        Ok(team) => team,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::bad_request("team name already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(team_id = %team.id, "team created");
    let mut views = load_team_views(&mut conn, vec![team])?;
    let view = views.pop().ok_or_else(AppError::not_found)?;
    Ok((StatusCode::CREATED, ok(view)))
}

pub async fn delete_team(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path(team_id): Path<Uuid>,
) -> AppResult<ApiJson<Value>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;
    let removed = conn.transaction::<usize, diesel::result::Error, _>(|conn| {
        diesel::delete(team_members::table.filter(team_members::team_id.eq(team_id)))
            .execute(conn)?;
        diesel::delete(teams::table.find(team_id)).execute(conn)
    })?;
    if removed == 0 {
        return Err(AppError::not_found());
    }
    tracing::info!(team_id = %team_id, "team deleted");
    Ok(ok(serde_json::json!({ "deleted": team_id })))
}

/// Adds a worker to a team, moving them out of any previous one.
pub async fn put_team_member(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path((team_id, worker_id)): Path<(Uuid, Uuid)>,
) -> AppResult<ApiJson<Value>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;

    teams::table.find(team_id).first::<Team>(&mut conn)?;
    workers::table.find(worker_id).first::<Worker>(&mut conn)?;

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(team_members::table.filter(team_members::worker_id.eq(worker_id)))
            .execute(conn)?;
        diesel::insert_into(team_members::table)
            .values(&NewTeamMember { team_id, worker_id })
            .execute(conn)
    })?;

    tracing::info!(team_id = %team_id, worker_id = %worker_id, "team member set");
    Ok(ok(serde_json::json!({ "team_id": team_id, "worker_id": worker_id })))
}

pub async fn delete_team_member(
    State(state): State<AppState>,
    current: CurrentWorker,
    Path((team_id, worker_id)): Path<(Uuid, Uuid)>,
) -> AppResult<ApiJson<Value>> {
    current.require(ADMIN)?;
    let mut conn = state.db()?;
    let removed = diesel::delete(
        team_members::table
            .filter(team_members::team_id.eq(team_id))
            .filter(team_members::worker_id.eq(worker_id)),
    )
    .execute(&mut conn)?;
    if removed == 0 {
        return Err(AppError::not_found());
    }
    Ok(ok(serde_json::json!({ "team_id": team_id, "worker_id": worker_id, "removed": true })))
}
