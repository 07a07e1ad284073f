use std::collections::HashMap;

use axum::extract::{Query, State};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::{CurrentWorker, Role},
    error::{AppError, AppResult},
    incidents::IncidentStatus,
    models::{MonthlyBonus, MonthlyEarnings, Team},
    month::MonthDate,
    payroll::{self, TeamStanding},
    presence::{self, PresenceSnapshot, PresenceState},
    response::{ok, ApiJson},
    routes::{
        admin::{attendance_for, load_team_views, AttendanceView, TeamView, WorkerView},
        resolve_month, MonthQuery,
    },
    schema::{
        invoices, monthly_bonuses, monthly_earnings, monthly_rankings, presence_current,
        shift_incidents, team_members, teams, workers,
    },
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct EarningsView {
    pub worker_id: Uuid,
    pub month: MonthDate,
    pub minutes_total: i32,
    pub minutes_free: i32,
    pub minutes_rueda: i32,
    pub minutes_cliente: i32,
    pub minutes_repite: i32,
    pub captadas: i32,
    pub base_cents: i64,
    pub bonus_cents: i64,
    pub penalty_cents: i64,
    pub total_cents: i64,
    pub computed_at: NaiveDateTime,
}

impl From<MonthlyEarnings> for EarningsView {
    fn from(row: MonthlyEarnings) -> Self {
        Self {
            worker_id: row.worker_id,
            month: MonthDate::containing(row.month_date),
            minutes_total: row.minutes_total,
            minutes_free: row.minutes_free,
            minutes_rueda: row.minutes_rueda,
            minutes_cliente: row.minutes_cliente,
            minutes_repite: row.minutes_repite,
            captadas: row.captadas,
            base_cents: row.base_cents,
            bonus_cents: row.bonus_cents,
            penalty_cents: row.penalty_cents,
            total_cents: row.total_cents,
            computed_at: row.computed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BonusView {
    pub id: Uuid,
    pub month: MonthDate,
    pub category: String,
    pub position: i32,
    pub amount_cents: i64,
    pub capped: bool,
}

impl From<MonthlyBonus> for BonusView {
    fn from(row: MonthlyBonus) -> Self {
        Self {
            id: row.id,
            month: MonthDate::containing(row.month_date),
            category: row.category,
            position: row.position,
            amount_cents: row.amount_cents,
            capped: row.capped,
        }
    }
}

fn load_earnings(
    conn: &mut PgConnection,
    worker_id: Uuid,
    month: MonthDate,
) -> QueryResult<Option<MonthlyEarnings>> {
    monthly_earnings::table
        .find((worker_id, month.first_day()))
        .first(conn)
        .optional()
}

fn load_bonuses(
    conn: &mut PgConnection,
    worker_id: Uuid,
    month: MonthDate,
) -> QueryResult<Vec<MonthlyBonus>> {
    monthly_bonuses::table
        .filter(monthly_bonuses::worker_id.eq(worker_id))
        .filter(monthly_bonuses::month_date.eq(month.first_day()))
        .order((monthly_bonuses::category.asc(), monthly_bonuses::position.asc()))
        .load(conn)
}

#[derive(Serialize)]
pub struct PanelMe {
    pub worker: WorkerView,
    pub presence: PresenceSnapshot,
    pub team: Option<String>,
}

pub async fn me(
    State(state): State<AppState>,
    current: CurrentWorker,
) -> AppResult<ApiJson<PanelMe>> {
    let mut conn = state.db()?;
    let presence = presence::current(&mut conn, current.id())?;
    let team: Option<String> = team_members::table
        .inner_join(teams::table)
        .filter(team_members::worker_id.eq(current.id()))
        .select(teams::name)
        .first(&mut conn)
        .optional()?;

    Ok(ok(PanelMe {
        worker: WorkerView::from(current.worker),
        presence,
        team,
    }))
}

#[derive(Serialize)]
pub struct Dashboard {
    pub worker_id: Uuid,
    pub month: MonthDate,
    pub earnings: Option<EarningsView>,
    pub position: Option<i32>,
    pub bonuses: Vec<BonusView>,
    pub pending_incidents: i64,
    pub invoice_status: Option<String>,
    pub presence: PresenceSnapshot,
}

/// Month overview for the caller, or for any worker when an admin asks.
pub async fn dashboard(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Dashboard>> {
    let worker_id = match query.worker_id {
        Some(worker_id) if worker_id != current.id() => {
            current.require(&[Role::Admin])?;
            worker_id
        }
        _ => current.id(),
    };
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;

    let earnings = load_earnings(&mut conn, worker_id, month)?;
    let position: Option<i32> = monthly_rankings::table
        .find((worker_id, month.first_day()))
        .select(monthly_rankings::position)
        .first(&mut conn)
        .optional()?;
    let bonuses = load_bonuses(&mut conn, worker_id, month)?;
    let pending_incidents: i64 = shift_incidents::table
        .filter(shift_incidents::worker_id.eq(worker_id))
        .filter(shift_incidents::month_date.eq(month.first_day()))
        .filter(shift_incidents::status.eq(IncidentStatus::Pending.as_str()))
        .count()
        .get_result(&mut conn)?;
    let invoice_status: Option<String> = invoices::table
        .filter(invoices::worker_id.eq(worker_id))
        .filter(invoices::month_date.eq(month.first_day()))
        .select(invoices::status)
        .first(&mut conn)
        .optional()?;
    let presence = presence::current(&mut conn, worker_id)?;

    Ok(ok(Dashboard {
        worker_id,
        month,
        earnings: earnings.map(EarningsView::from),
        position,
        bonuses: bonuses.into_iter().map(BonusView::from).collect(),
        pending_incidents,
        invoice_status,
        presence,
    }))
}

pub async fn attendance(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<AttendanceView>>> {
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    Ok(ok(attendance_for(&mut conn, month, Some(current.id()))?))
}

pub async fn earnings(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Option<EarningsView>>> {
    let worker_id = current.target(query.worker_id)?;
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    Ok(ok(load_earnings(&mut conn, worker_id, month)?.map(EarningsView::from)))
}

pub async fn bonuses(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<BonusView>>> {
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    let rows = load_bonuses(&mut conn, current.id(), month)?;
    Ok(ok(rows.into_iter().map(BonusView::from).collect()))
}

#[derive(Serialize)]
pub struct RankingEntry {
    pub position: i32,
    pub worker_id: Uuid,
    pub display_name: String,
    pub minutes_total: i32,
    pub captadas: i32,
    pub pct_cliente: f64,
    pub pct_repite: f64,
    pub is_me: bool,
}

pub async fn ranking(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<RankingEntry>>> {
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;

    let rows: Vec<(i32, Uuid, String, i32, i32, f64, f64)> = monthly_rankings::table
        .inner_join(workers::table)
        .filter(monthly_rankings::month_date.eq(month.first_day()))
        .select((
            monthly_rankings::position,
            monthly_rankings::worker_id,
            workers::display_name,
            monthly_rankings::minutes_total,
            monthly_rankings::captadas,
            monthly_rankings::pct_cliente,
            monthly_rankings::pct_repite,
        ))
        .order((monthly_rankings::position.asc(), workers::display_name.asc()))
        .load(&mut conn)?;

    let me = current.id();
    Ok(ok(rows
        .into_iter()
        .map(
            |(position, worker_id, display_name, minutes_total, captadas, pct_cliente, pct_repite)| {
                RankingEntry {
                    position,
                    worker_id,
                    display_name,
                    minutes_total,
                    captadas,
                    pct_cliente,
                    pct_repite,
                    is_me: worker_id == me,
                }
            },
        )
        .collect()))
}

pub async fn team_ranking(
    State(state): State<AppState>,
    _current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<TeamStanding>>> {
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;
    Ok(ok(payroll::team_ranking(&mut conn, month)?))
}

#[derive(Serialize)]
pub struct MemberSnapshot {
    pub worker_id: Uuid,
    pub display_name: String,
    pub presence: PresenceState,
    pub minutes_total: i32,
    pub captadas: i32,
    pub pending_incidents: i64,
}

#[derive(Serialize)]
pub struct CentralTeam {
    pub team: TeamView,
    pub month: MonthDate,
    pub members: Vec<MemberSnapshot>,
}

/// The teams a central supervises, with each member's live state and month
/// so far.
pub async fn team(
    State(state): State<AppState>,
    current: CurrentWorker,
    Query(query): Query<MonthQuery>,
) -> AppResult<ApiJson<Vec<CentralTeam>>> {
    current.require(&[Role::Central])?;
    let month = resolve_month(&state, query.month.as_deref())?;
    let mut conn = state.db()?;

    let owned: Vec<Team> = teams::table
        .filter(teams::central_id.eq(current.id()))
        .order(teams::name.asc())
        .load(&mut conn)?;
    if owned.is_empty() {
        return Err(AppError::not_found());
    }
    let views = load_team_views(&mut conn, owned)?;

    let member_ids: Vec<Uuid> = views
        .iter()
        .flat_map(|team| team.members.iter().map(|m| m.worker_id))
        .collect();

    let states: HashMap<Uuid, String> = presence_current::table
        .filter(presence_current::worker_id.eq_any(&member_ids))
        .select((presence_current::worker_id, presence_current::state))
        .load::<(Uuid, String)>(&mut conn)?
        .into_iter()
        .collect();
    let totals: HashMap<Uuid, (i32, i32)> = monthly_earnings::table
        .filter(monthly_earnings::worker_id.eq_any(&member_ids))
        .filter(monthly_earnings::month_date.eq(month.first_day()))
        .select((
            monthly_earnings::worker_id,
            monthly_earnings::minutes_total,
            monthly_earnings::captadas,
        ))
        .load::<(Uuid, i32, i32)>(&mut conn)?
        .into_iter()
        .map(|(id, minutes, captadas)| (id, (minutes, captadas)))
        .collect();
    let pending: HashMap<Uuid, i64> = shift_incidents::table
        .filter(shift_incidents::worker_id.eq_any(&member_ids))
        .filter(shift_incidents::status.eq(IncidentStatus::Pending.as_str()))
        .group_by(shift_incidents::worker_id)
        .select((shift_incidents::worker_id, diesel::dsl::count_star()))
        .load::<(Uuid, i64)>(&mut conn)?
        .into_iter()
        .collect();

    let result = views
        .into_iter()
        .map(|team| {
            let members = team
                .members
                .iter()
                .map(|member| {
                    let (minutes_total, captadas) =
                        totals.get(&member.worker_id).copied().unwrap_or((0, 0));
                    MemberSnapshot {
                        worker_id: member.worker_id,
                        display_name: member.display_name.clone(),
                        presence: states
                            .get(&member.worker_id)
                            .and_then(|raw| PresenceState::parse(raw).ok())
                            .unwrap_or(PresenceState::Offline),
                        minutes_total,
                        captadas,
                        pending_incidents: pending.get(&member.worker_id).copied().unwrap_or(0),
                    }
                })
                .collect();
            CentralTeam {
                team,
                month,
                members,
            }
        })
        .collect();

    Ok(ok(result))
}
