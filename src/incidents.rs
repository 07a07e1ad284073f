//! Shift incidents: lateness, absences and manual notes against a worker.
//!
//! An incident starts `pending` and is closed exactly once by an admin.
//! Penalties of `unjustified` incidents are deducted from monthly earnings.

use std::fmt;

use chrono::{NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{NewShiftIncident, ShiftIncident};
use crate::month::MonthDate;
use crate::schema::shift_incidents;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value.trim() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(IncidentKind {
    Late => "late",
    Absence => "absence",
    Manual => "manual",
});

string_enum!(IncidentStatus {
    Pending => "pending",
    Justified => "justified",
    Unjustified => "unjustified",
    Resolved => "resolved",
    Cancelled => "cancelled",
});

string_enum!(IncidentSource {
    Central => "central",
    Admin => "admin",
    System => "system",
});

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("incident is already {0}")]
    NotPending(IncidentStatus),
    #[error("{0} is not a valid resolution")]
    InvalidResolution(IncidentStatus),
    #[error("penalty_cents must not be negative")]
    NegativePenalty,
    #[error("incident has unknown status {0:?}")]
    UnknownStatus(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// Only pending incidents move, and only to a closing status.
pub fn check_resolution(
    current: IncidentStatus,
    target: IncidentStatus,
) -> Result<(), IncidentError> {
    if current != IncidentStatus::Pending {
        return Err(IncidentError::NotPending(current));
    }
    if target == IncidentStatus::Pending {
        return Err(IncidentError::InvalidResolution(target));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct IncidentDraft {
    pub worker_id: Uuid,
    pub kind: IncidentKind,
    pub incident_date: NaiveDate,
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
    pub source: IncidentSource,
    pub created_by: Option<Uuid>,
}

pub fn insert_incident(
    conn: &mut PgConnection,
    draft: IncidentDraft,
) -> Result<ShiftIncident, IncidentError> {
    if draft.penalty_cents.is_some_and(|cents| cents < 0) {
        return Err(IncidentError::NegativePenalty);
    }

    let row = NewShiftIncident {
        id: Uuid::new_v4(),
        worker_id: draft.worker_id,
        kind: draft.kind.as_str().to_string(),
        incident_date: draft.incident_date,
        month_date: MonthDate::containing(draft.incident_date).first_day(),
        status: IncidentStatus::Pending.as_str().to_string(),
        penalty_cents: draft.penalty_cents,
        notes: draft.notes,
        source: draft.source.as_str().to_string(),
        created_by: draft.created_by,
    };

    let incident = diesel::insert_into(shift_incidents::table)
        .values(&row)
        .get_result::<ShiftIncident>(conn)?;

    tracing::info!(
        incident_id = %incident.id,
        worker_id = %incident.worker_id,
        kind = %incident.kind,
        source = %incident.source,
        "incident created"
    );
    Ok(incident)
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub penalty_cents: Option<i64>,
    pub notes: Option<String>,
}

/// Closes a pending incident under a row lock so two admins cannot both
/// resolve it.
pub fn resolve_incident(
    conn: &mut PgConnection,
    incident_id: Uuid,
    target: IncidentStatus,
    resolution: Resolution,
    resolver: Uuid,
) -> Result<ShiftIncident, IncidentError> {
    if resolution.penalty_cents.is_some_and(|cents| cents < 0) {
        return Err(IncidentError::NegativePenalty);
    }

    conn.transaction(|conn| {
        let incident = shift_incidents::table
            .find(incident_id)
            .for_update()
            .get_result::<ShiftIncident>(conn)?;
        let current = IncidentStatus::parse(&incident.status)
            .ok_or_else(|| IncidentError::UnknownStatus(incident.status.clone()))?;
        check_resolution(current, target)?;

        let now = Utc::now().naive_utc();
        let penalty_cents = resolution.penalty_cents.or(incident.penalty_cents);
        let notes = resolution.notes.or(incident.notes);

        let updated = diesel::update(shift_incidents::table.find(incident_id))
            .set((
                shift_incidents::status.eq(target.as_str()),
                shift_incidents::penalty_cents.eq(penalty_cents),
                shift_incidents::notes.eq(notes),
                shift_incidents::resolved_by.eq(Some(resolver)),
                shift_incidents::resolved_at.eq(Some(now)),
                shift_incidents::updated_at.eq(now),
            ))
            .get_result::<ShiftIncident>(conn)?;

        tracing::info!(
            incident_id = %incident_id,
            from = %current,
            to = %target,
            "incident resolved"
        );
        Ok(updated)
    })
}
