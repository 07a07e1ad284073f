use std::collections::BTreeSet;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::matcher::{MatchTier, WorkerDirectory, WorkerIdentity};
use super::{parse_attendance, CsvError, ParseOutcome};
use crate::models::NewAttendanceRow;
use crate::month::MonthDate;
use crate::schema::{attendance_rows, worker_name_mappings, workers};

const INSERT_CHUNK: usize = 1000;
const SOURCE_NAME_CHARS: usize = 255;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Csv(#[from] CsvError),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SyncReport {
    pub total_lines: usize,
    pub inserted: usize,
    pub skipped_bad: usize,
    pub skipped_no_worker: usize,
    pub skipped_empty_name: usize,
    pub matched_by_mapping: usize,
    pub matched_by_ref: usize,
    pub matched_by_name: usize,
    pub unmatched_names: Vec<String>,
    pub months: Vec<MonthDate>,
}

/// Ties parsed lines to workers. Lines whose name cannot be resolved are
/// dropped and reported.
pub fn plan_rows(
    outcome: ParseOutcome,
    directory: &WorkerDirectory,
) -> (Vec<NewAttendanceRow>, SyncReport) {
    let mut report = SyncReport {
        total_lines: outcome.total_lines,
        skipped_bad: outcome.skipped_bad,
        skipped_empty_name: outcome.skipped_empty_name,
        ..SyncReport::default()
    };
    let mut unmatched = BTreeSet::new();
    let mut months = BTreeSet::new();
    let mut rows = Vec::with_capacity(outcome.rows.len());

    for parsed in outcome.rows {
        let resolved =
            directory.resolve(&parsed.name_key, &parsed.name, parsed.external_ref.as_deref());
        let Some((worker_id, tier)) = resolved else {
            report.skipped_no_worker += 1;
            unmatched.insert(parsed.name);
            continue;
        };

        match tier {
            MatchTier::Mapping => report.matched_by_mapping += 1,
            MatchTier::ExternalRef => report.matched_by_ref += 1,
            MatchTier::DisplayName => report.matched_by_name += 1,
        }
        months.insert(MonthDate::containing(parsed.date));

        rows.push(NewAttendanceRow {
            id: Uuid::new_v4(),
            worker_id,
            work_date: parsed.date,
            minutes: parsed.minutes,
            code: parsed.code.as_str().to_string(),
            captured: parsed.captured,
            source_name: parsed.name.chars().take(SOURCE_NAME_CHARS).collect(),
        });
    }

    report.unmatched_names = unmatched.into_iter().collect();
    report.months = months.into_iter().collect();
    (rows, report)
}

pub fn load_directory(conn: &mut PgConnection) -> QueryResult<WorkerDirectory> {
    let mappings: Vec<(String, Uuid)> = worker_name_mappings::table
        .select((
            worker_name_mappings::source_key,
            worker_name_mappings::worker_id,
        ))
        .load(conn)?;

    let identities: Vec<(Uuid, String, Option<String>)> = workers::table
        .select((workers::id, workers::display_name, workers::external_ref))
        .order(workers::created_at.asc())
        .load(conn)?;

    Ok(WorkerDirectory::new(
        mappings,
        identities
            .into_iter()
            .map(|(id, display_name, external_ref)| WorkerIdentity {
                id,
                display_name,
                external_ref,
            }),
    ))
}

/// Replaces the whole attendance table in one transaction.
pub fn replace_attendance(conn: &mut PgConnection, rows: &[NewAttendanceRow]) -> QueryResult<usize> {
    conn.transaction(|conn| {
        let removed = diesel::delete(attendance_rows::table).execute(conn)?;
        let mut inserted = 0;
        for chunk in rows.chunks(INSERT_CHUNK) {
            inserted += diesel::insert_into(attendance_rows::table)
                .values(chunk)
                .execute(conn)?;
        }
        tracing::debug!(removed, inserted, "attendance table replaced");
        Ok(inserted)
    })
}

pub fn sync_attendance(conn: &mut PgConnection, text: &str) -> Result<SyncReport, SyncError> {
    let outcome = parse_attendance(text)?;
    let directory = load_directory(conn)?;
    let (rows, mut report) = plan_rows(outcome, &directory);
    report.inserted = replace_attendance(conn, &rows)?;

    tracing::info!(
        total_lines = report.total_lines,
        inserted = report.inserted,
        skipped_bad = report.skipped_bad,
        skipped_no_worker = report.skipped_no_worker,
        skipped_empty_name = report.skipped_empty_name,
        "attendance sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_reports_unmatched_names_once_and_collects_months() {
        let luna = WorkerIdentity {
            id: Uuid::new_v4(),
            display_name: "Luna".to_string(),
            external_ref: None,
        };
        let directory = WorkerDirectory::new([], [luna.clone()]);
        let outcome = parse_attendance(
            "fecha;tarotista;minutos;codigo\n\
             2024-03-30;Luna;10;cliente\n\
             2024-04-01;luna;5;free\n\
             2024-04-01;Desconocida;5;free\n\
             2024-04-02;Desconocida;7;free\n",
        )
        .unwrap();

        let (rows, report) = plan_rows(outcome, &directory);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.worker_id == luna.id));
        assert_eq!(report.skipped_no_worker, 2);
        assert_eq!(report.unmatched_names, vec!["Desconocida".to_string()]);
        assert_eq!(report.matched_by_name, 2);
        assert_eq!(
            report.months,
            vec![
                MonthDate::parse("2024-03").unwrap(),
                MonthDate::parse("2024-04").unwrap()
            ]
        );
    }

    #[test]
    fn overlong_source_names_are_cut_to_the_column_size() {
        let long_name = format!("Luna {}", "x".repeat(400));
        let luna = WorkerIdentity {
            id: Uuid::new_v4(),
            display_name: "Luna".to_string(),
            external_ref: Some("T-1".to_string()),
        };
        let directory = WorkerDirectory::new([], [luna]);
        let outcome = parse_attendance(&format!(
            "fecha,tarotista,minutos,ref\n2024-03-01,{long_name},10,T-1\n"
        ))
        .unwrap();

        let (rows, _) = plan_rows(outcome, &directory);
        assert_eq!(rows[0].source_name.chars().count(), SOURCE_NAME_CHARS);
    }
}
