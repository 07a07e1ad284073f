//! Clock-in presence tracking.
//!
//! `presence_current` holds one row per worker and is the lock every change
//! takes. Sessions span login to logout, and every state change is appended to
//! `presence_events`.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::incidents::{insert_incident, IncidentDraft, IncidentError, IncidentKind, IncidentSource};
use crate::models::{NewPresenceEvent, NewPresenceSession, PresenceCurrent, Worker};
use crate::schema::{presence_current, presence_events, presence_sessions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Offline,
    Online,
    Pause,
    Bathroom,
}

impl PresenceState {
    pub fn as_str(self) -> &'static str {
        match self {
            PresenceState::Offline => "offline",
            PresenceState::Online => "online",
            PresenceState::Pause => "pause",
            PresenceState::Bathroom => "bathroom",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TransitionError> {
        match value.trim() {
            "offline" => Ok(PresenceState::Offline),
            "online" => Ok(PresenceState::Online),
            "pause" => Ok(PresenceState::Pause),
            "bathroom" => Ok(PresenceState::Bathroom),
            other => Err(TransitionError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("unknown presence state {0:?}")]
    UnknownState(String),
    #[error("cannot go from {from} to {to}")]
    Illegal {
        from: PresenceState,
        to: PresenceState,
    },
}

pub fn check_transition(from: PresenceState, to: PresenceState) -> Result<(), TransitionError> {
    use PresenceState::*;

    let legal = matches!(
        (from, to),
        (Offline, Online)
            | (Online, Pause)
            | (Online, Bathroom)
            | (Pause, Online)
            | (Bathroom, Online)
            | (Online | Pause | Bathroom, Offline)
    );
    if legal {
        Ok(())
    } else {
        Err(TransitionError::Illegal { from, to })
    }
}

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Incident(#[from] IncidentError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceSnapshot {
    pub worker_id: Uuid,
    pub state: PresenceState,
    pub session_id: Option<Uuid>,
    pub changed_at: NaiveDateTime,
}

impl TryFrom<PresenceCurrent> for PresenceSnapshot {
    type Error = TransitionError;

    fn try_from(row: PresenceCurrent) -> Result<Self, Self::Error> {
        Ok(Self {
            worker_id: row.worker_id,
            state: PresenceState::parse(&row.state)?,
            session_id: row.session_id,
            changed_at: row.changed_at,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub current: PresenceSnapshot,
    pub already_online: bool,
    pub late_incident_id: Option<Uuid>,
}

/// Lateness rule applied on the first login of a local day.
#[derive(Debug, Clone, Copy)]
pub struct LatenessPolicy {
    pub offset: FixedOffset,
    pub grace_minutes: i64,
}

pub fn is_late(shift_start: NaiveTime, local_time: NaiveTime, grace_minutes: i64) -> bool {
    local_time.signed_duration_since(shift_start) > Duration::minutes(grace_minutes)
}

/// UTC instant at which the local day containing `local_now` began.
fn local_day_start_utc(local_now: DateTime<FixedOffset>) -> NaiveDateTime {
    let midnight = local_now.date_naive().and_time(NaiveTime::MIN);
    midnight - Duration::seconds(i64::from(local_now.offset().local_minus_utc()))
}

fn lock_current(
    conn: &mut PgConnection,
    worker_id: Uuid,
    now: NaiveDateTime,
) -> QueryResult<PresenceCurrent> {
    diesel::insert_into(presence_current::table)
        .values(&PresenceCurrent {
            worker_id,
            state: PresenceState::Offline.as_str().to_string(),
            session_id: None,
            changed_at: now,
        })
        .on_conflict_do_nothing()
        .execute(conn)?;

    presence_current::table
        .find(worker_id)
        .for_update()
        .get_result(conn)
}

/// Applies a legal transition on a locked current row and records it.
fn transition(
    conn: &mut PgConnection,
    locked: PresenceCurrent,
    to: PresenceState,
    now: NaiveDateTime,
) -> Result<PresenceSnapshot, PresenceError> {
    let worker_id = locked.worker_id;
    let from = PresenceState::parse(&locked.state)?;
    check_transition(from, to)?;

    let session_id = match (from, to) {
        (PresenceState::Offline, PresenceState::Online) => {
            let session = NewPresenceSession {
                id: Uuid::new_v4(),
                worker_id,
                started_at: now,
            };
            diesel::insert_into(presence_sessions::table)
                .values(&session)
                .execute(conn)?;
            Some(session.id)
        }
        (_, PresenceState::Offline) => {
            diesel::update(
                presence_sessions::table
                    .filter(presence_sessions::worker_id.eq(worker_id))
                    .filter(presence_sessions::ended_at.is_null()),
            )
            .set(presence_sessions::ended_at.eq(Some(now)))
            .execute(conn)?;
            None
        }
        _ => locked.session_id,
    };

    diesel::insert_into(presence_events::table)
        .values(&NewPresenceEvent {
            id: Uuid::new_v4(),
            worker_id,
            session_id: session_id.or(locked.session_id),
            state: to.as_str().to_string(),
            occurred_at: now,
        })
        .execute(conn)?;

    diesel::update(presence_current::table.find(worker_id))
        .set((
            presence_current::state.eq(to.as_str()),
            presence_current::session_id.eq(session_id),
            presence_current::changed_at.eq(now),
        ))
        .execute(conn)?;

    tracing::info!(worker_id = %worker_id, from = %from, to = %to, "presence changed");
    Ok(PresenceSnapshot {
        worker_id,
        state: to,
        session_id,
        changed_at: now,
    })
}

/// Opens a session. Calling it while already clocked in returns the current
/// state unchanged.
pub fn login(
    conn: &mut PgConnection,
    worker: &Worker,
    policy: LatenessPolicy,
    now: DateTime<Utc>,
) -> Result<LoginOutcome, PresenceError> {
    let now_naive = now.naive_utc();
    conn.transaction(|conn| {
        let locked = lock_current(conn, worker.id, now_naive)?;
        if PresenceState::parse(&locked.state)? != PresenceState::Offline {
            return Ok(LoginOutcome {
                current: PresenceSnapshot::try_from(locked)?,
                already_online: true,
                late_incident_id: None,
            });
        }

        let local_now = now.with_timezone(&policy.offset);
        let earlier_today: i64 = presence_sessions::table
            .filter(presence_sessions::worker_id.eq(worker.id))
            .filter(presence_sessions::started_at.ge(local_day_start_utc(local_now)))
            .count()
            .get_result(conn)?;

        let current = transition(conn, locked, PresenceState::Online, now_naive)?;

        let late_incident_id = match worker.shift_start {
            Some(shift_start)
                if earlier_today == 0
                    && is_late(shift_start, local_now.time(), policy.grace_minutes) =>
            {
                let notes = format!(
                    "Entrada a las {} (turno {})",
                    local_now.format("%H:%M"),
                    shift_start.format("%H:%M")
                );
                let incident = insert_incident(
                    conn,
                    IncidentDraft {
                        worker_id: worker.id,
                        kind: IncidentKind::Late,
                        incident_date: local_now.date_naive(),
                        penalty_cents: None,
                        notes: Some(notes),
                        source: IncidentSource::System,
                        created_by: None,
                    },
                )?;
                Some(incident.id)
            }
            _ => None,
        };

        Ok(LoginOutcome {
            current,
            already_online: false,
            late_incident_id,
        })
    })
}

/// Closes the open session. Logging out while offline is a no-op.
pub fn logout(
    conn: &mut PgConnection,
    worker_id: Uuid,
    now: NaiveDateTime,
) -> Result<PresenceSnapshot, PresenceError> {
    conn.transaction(|conn| {
        let locked = lock_current(conn, worker_id, now)?;
        if PresenceState::parse(&locked.state)? == PresenceState::Offline {
            return Ok(PresenceSnapshot::try_from(locked)?);
        }
        transition(conn, locked, PresenceState::Offline, now)
    })
}

/// Moves between online, pause and bathroom, or clocks out. Clocking in has
/// to go through [`login`].
pub fn change_state(
    conn: &mut PgConnection,
    worker_id: Uuid,
    to: PresenceState,
    now: NaiveDateTime,
) -> Result<PresenceSnapshot, PresenceError> {
    conn.transaction(|conn| {
        let locked = lock_current(conn, worker_id, now)?;
        let from = PresenceState::parse(&locked.state)?;
        if from == PresenceState::Offline && to == PresenceState::Online {
            return Err(TransitionError::Illegal { from, to }.into());
        }
        transition(conn, locked, to, now)
    })
}

pub fn current(conn: &mut PgConnection, worker_id: Uuid) -> Result<PresenceSnapshot, PresenceError> {
    let row = presence_current::table
        .find(worker_id)
        .first::<PresenceCurrent>(conn)
        .optional()?;
    match row {
        Some(row) => Ok(PresenceSnapshot::try_from(row)?),
        None => Ok(PresenceSnapshot {
            worker_id,
            state: PresenceState::Offline,
            session_id: None,
            changed_at: NaiveDateTime::default(),
        }),
    }
}
