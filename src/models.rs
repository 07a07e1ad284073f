use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = workers)]
#[diesel(belongs_to(User))]
pub struct Worker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub external_ref: Option<String>,
    pub shift_start: Option<NaiveTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = workers)]
pub struct NewWorker {
    pub id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub role: String,
    pub is_active: bool,
    pub external_ref: Option<String>,
    pub shift_start: Option<NaiveTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = worker_name_mappings)]
pub struct WorkerNameMapping {
    pub id: Uuid,
    pub source_key: String,
    pub worker_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = worker_name_mappings)]
pub struct NewWorkerNameMapping {
    pub id: Uuid,
    pub source_key: String,
    pub worker_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = attendance_rows)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub work_date: NaiveDate,
    pub minutes: i32,
    pub code: String,
    pub captured: bool,
    pub source_name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = attendance_rows)]
pub struct NewAttendanceRow {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub work_date: NaiveDate,
    pub minutes: i32,
    pub code: String,
    pub captured: bool,
    pub source_name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = presence_sessions)]
pub struct PresenceSession {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = presence_sessions)]
pub struct NewPresenceSession {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub started_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = presence_events)]
pub struct PresenceEvent {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub session_id: Option<Uuid>,
    pub state: String,
    pub occurred_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = presence_events)]
pub struct NewPresenceEvent {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub session_id: Option<Uuid>,
    pub state: String,
    pub occurred_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = presence_current)]
pub struct PresenceCurrent {
    pub worker_id: Uuid,
    pub state: String,
    pub session_id: Option<Uuid>,
    pub changed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = shift_incidents)]
pub struct ShiftIncident {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub kind: String,
    pub incident_date: NaiveDate,
    pub month_date: NaiveDate,
    pub status: String,
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
    pub source: String,
    pub created_by: Option<Uuid>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = shift_incidents)]
pub struct NewShiftIncident {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub kind: String,
    pub incident_date: NaiveDate,
    pub month_date: NaiveDate,
    pub status: String,
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
    pub source: String,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = teams)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub central_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = teams)]
pub struct NewTeam {
    pub id: Uuid,
    pub name: String,
    pub central_id: Option<Uuid>,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Queryable, Associations)]
#[diesel(table_name = team_members)]
#[diesel(belongs_to(Team))]
#[diesel(belongs_to(Worker))]
#[diesel(primary_key(team_id, worker_id))]
pub struct TeamMember {
    pub team_id: Uuid,
    pub worker_id: Uuid,
    pub joined_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = team_members)]
pub struct NewTeamMember {
    pub team_id: Uuid,
    pub worker_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = monthly_earnings)]
pub struct MonthlyEarnings {
    pub worker_id: Uuid,
    pub month_date: NaiveDate,
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

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = monthly_rankings)]
pub struct MonthlyRanking {
    pub worker_id: Uuid,
    pub month_date: NaiveDate,
    pub position: i32,
    pub minutes_total: i32,
    pub captadas: i32,
    pub pct_cliente: f64,
    pub pct_repite: f64,
    pub computed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = monthly_bonuses)]
pub struct MonthlyBonus {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub month_date: NaiveDate,
    pub category: String,
    pub position: i32,
    pub amount_cents: i64,
    pub capped: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = monthly_bonuses)]
pub struct NewMonthlyBonus {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub month_date: NaiveDate,
    pub category: String,
    pub position: i32,
    pub amount_cents: i64,
    pub capped: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = invoices)]
pub struct Invoice {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub month_date: NaiveDate,
    pub storage_key: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub status: String,
    pub response_note: Option<String>,
    pub responded_by: Option<Uuid>,
    pub responded_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoices)]
pub struct NewInvoice {
    pub id: Uuid,
    pub worker_id: Uuid,
    pub month_date: NaiveDate,
    pub storage_key: String,
    pub original_name: String,
    pub size_bytes: i64,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
