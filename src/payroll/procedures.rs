//! Database side of the monthly computations. Each operation loads what it
//! needs for one month, runs the pure functions from the sibling modules and
//! replaces that month's snapshot rows inside a transaction.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::bonus::{apply_cap, award_bonuses, BonusAward, BonusCategory};
use super::earnings::{aggregate, breakdown, WorkerStats};
use super::ranking::{rank_teams, rank_workers, TeamStanding};
use super::summary::{session_minutes_in_month, HoursSummaryRow};
use super::PayrollRules;
use crate::auth::Role;
use crate::incidents::IncidentStatus;
use crate::ingest::CallCode;
use crate::models::{MonthlyBonus, MonthlyEarnings, MonthlyRanking, NewMonthlyBonus};
use crate::month::MonthDate;
use crate::schema::{
    attendance_rows, monthly_bonuses, monthly_earnings, monthly_rankings, presence_sessions,
    shift_incidents, team_members, teams, workers,
};

const INSERT_CHUNK: usize = 500;

pub fn load_month_stats(
    conn: &mut PgConnection,
    month: MonthDate,
) -> QueryResult<BTreeMap<Uuid, WorkerStats>> {
    let rows: Vec<(Uuid, String, i32, bool)> = attendance_rows::table
        .filter(attendance_rows::work_date.ge(month.first_day()))
        .filter(attendance_rows::work_date.lt(month.end_exclusive()))
        .select((
            attendance_rows::worker_id,
            attendance_rows::code,
            attendance_rows::minutes,
            attendance_rows::captured,
        ))
        .load(conn)?;

    Ok(aggregate(rows.into_iter().filter_map(
        |(worker_id, code, minutes, captured)| {
            let code = CallCode::from_db(&code)?;
            Some((worker_id, code, minutes, captured))
        },
    )))
}

fn sum_by_worker(rows: Vec<(Uuid, i64)>) -> HashMap<Uuid, i64> {
    let mut sums = HashMap::new();
    for (worker_id, amount) in rows {
        *sums.entry(worker_id).or_insert(0) += amount;
    }
    sums
}

/// Rebuilds `monthly_earnings` and `monthly_rankings` for `month`. Returns the
/// number of earnings rows written.
pub fn recompute_monthly_earnings(
    conn: &mut PgConnection,
    month: MonthDate,
    rules: &PayrollRules,
) -> QueryResult<usize> {
    conn.transaction(|conn| {
        let stats = load_month_stats(conn, month)?;

        let bonuses = sum_by_worker(
            monthly_bonuses::table
                .filter(monthly_bonuses::month_date.eq(month.first_day()))
                .select((monthly_bonuses::worker_id, monthly_bonuses::amount_cents))
                .load(conn)?,
        );
        let penalties: Vec<(Uuid, Option<i64>)> = shift_incidents::table
            .filter(shift_incidents::month_date.eq(month.first_day()))
            .filter(shift_incidents::status.eq(IncidentStatus::Unjustified.as_str()))
            .select((shift_incidents::worker_id, shift_incidents::penalty_cents))
            .load(conn)?;
        let penalties = sum_by_worker(
            penalties
                .into_iter()
                .filter_map(|(worker_id, cents)| cents.map(|c| (worker_id, c)))
                .collect(),
        );

        // Workers with only a bonus or a penalty still get a row.
        let worker_ids: BTreeSet<Uuid> = stats
            .keys()
            .chain(bonuses.keys())
            .chain(penalties.keys())
            .copied()
            .collect();

        let computed_at = Utc::now().naive_utc();
        let earnings: Vec<MonthlyEarnings> = worker_ids
            .into_iter()
            .map(|worker_id| {
                let worker_stats = stats
                    .get(&worker_id)
                    .cloned()
                    .unwrap_or_else(|| WorkerStats::new(worker_id));
                let totals = breakdown(
                    &worker_stats,
                    rules,
                    bonuses.get(&worker_id).copied().unwrap_or(0),
                    penalties.get(&worker_id).copied().unwrap_or(0),
                );
                MonthlyEarnings {
                    worker_id,
                    month_date: month.first_day(),
                    minutes_total: worker_stats.minutes_total(),
                    minutes_free: worker_stats.minutes_free,
                    minutes_rueda: worker_stats.minutes_rueda,
                    minutes_cliente: worker_stats.minutes_cliente,
                    minutes_repite: worker_stats.minutes_repite,
                    captadas: worker_stats.captadas,
                    base_cents: totals.base_cents,
                    bonus_cents: totals.bonus_cents,
                    penalty_cents: totals.penalty_cents,
                    total_cents: totals.total_cents,
                    computed_at,
                }
            })
            .collect();

        diesel::delete(
            monthly_earnings::table.filter(monthly_earnings::month_date.eq(month.first_day())),
        )
        .execute(conn)?;
        for chunk in earnings.chunks(INSERT_CHUNK) {
            diesel::insert_into(monthly_earnings::table)
                .values(chunk)
                .execute(conn)?;
        }

        let active: Vec<WorkerStats> = stats.into_values().collect();
        let rankings: Vec<MonthlyRanking> = rank_workers(&active)
            .into_iter()
            .map(|ranked| MonthlyRanking {
                worker_id: ranked.worker_id,
                month_date: month.first_day(),
                position: ranked.position,
                minutes_total: ranked.minutes_total,
                captadas: ranked.captadas,
                pct_cliente: ranked.pct_cliente,
                pct_repite: ranked.pct_repite,
                computed_at,
            })
            .collect();

        diesel::delete(
            monthly_rankings::table.filter(monthly_rankings::month_date.eq(month.first_day())),
        )
        .execute(conn)?;
        for chunk in rankings.chunks(INSERT_CHUNK) {
            diesel::insert_into(monthly_rankings::table)
                .values(chunk)
                .execute(conn)?;
        }

        tracing::info!(
            month = %month,
            earnings = earnings.len(),
            ranked = rankings.len(),
            "monthly earnings recomputed"
        );
        Ok(earnings.len())
    })
}

/// Replaces the month's bonus rows with fresh, uncapped awards for active
/// tarotistas.
pub fn generate_monthly_bonus(
    conn: &mut PgConnection,
    month: MonthDate,
    rules: &PayrollRules,
) -> QueryResult<Vec<BonusAward>> {
    conn.transaction(|conn| {
        let eligible: BTreeSet<Uuid> = workers::table
            .filter(workers::role.eq(Role::Tarotista.as_str()))
            .filter(workers::is_active.eq(true))
            .select(workers::id)
            .load::<Uuid>(conn)?
            .into_iter()
            .collect();

        let stats: Vec<WorkerStats> = load_month_stats(conn, month)?
            .into_values()
            .filter(|s| eligible.contains(&s.worker_id))
            .collect();
        let awards = award_bonuses(&stats, rules);

        diesel::delete(
            monthly_bonuses::table.filter(monthly_bonuses::month_date.eq(month.first_day())),
        )
        .execute(conn)?;
        let rows: Vec<NewMonthlyBonus> = awards
            .iter()
            .map(|award| NewMonthlyBonus {
                id: Uuid::new_v4(),
                worker_id: award.worker_id,
                month_date: month.first_day(),
                category: award.category.as_str().to_string(),
                position: award.position,
                amount_cents: award.amount_cents,
                capped: award.capped,
            })
            .collect();
        if !rows.is_empty() {
            diesel::insert_into(monthly_bonuses::table)
                .values(&rows)
                .execute(conn)?;
        }

        tracing::info!(month = %month, awards = awards.len(), "monthly bonuses generated");
        Ok(awards)
    })
}

/// Applies the per-worker ceiling to the month's stored bonuses. Returns how
/// many rows were reduced.
pub fn apply_bonus_cap(
    conn: &mut PgConnection,
    month: MonthDate,
    cap_cents: i64,
) -> QueryResult<usize> {
    conn.transaction(|conn| {
        let stored: Vec<MonthlyBonus> = monthly_bonuses::table
            .filter(monthly_bonuses::month_date.eq(month.first_day()))
            .load(conn)?;

        let (ids, mut awards): (Vec<Uuid>, Vec<BonusAward>) = stored
            .into_iter()
            .filter_map(|row| {
                let category = BonusCategory::from_db(&row.category)?;
                Some((
                    row.id,
                    BonusAward {
                        worker_id: row.worker_id,
                        category,
                        position: row.position,
                        amount_cents: row.amount_cents,
                        capped: row.capped,
                    },
                ))
            })
            .unzip();

        let before: Vec<i64> = awards.iter().map(|a| a.amount_cents).collect();
        let reduced = apply_cap(&mut awards, cap_cents);

        for ((id, award), previous) in ids.iter().zip(&awards).zip(before) {
            if award.amount_cents != previous {
                diesel::update(monthly_bonuses::table.find(*id))
                    .set((
                        monthly_bonuses::amount_cents.eq(award.amount_cents),
                        monthly_bonuses::capped.eq(true),
                    ))
                    .execute(conn)?;
            }
        }

        tracing::info!(month = %month, cap_cents, reduced, "bonus cap applied");
        Ok(reduced)
    })
}

/// Attendance minutes and presence time per worker for `month`. Active
/// workers appear even without activity; inactive ones only when they have
/// some.
pub fn admin_hours_summary(
    conn: &mut PgConnection,
    month: MonthDate,
    now: NaiveDateTime,
) -> QueryResult<Vec<HoursSummaryRow>> {
    let stats = load_month_stats(conn, month)?;

    let sessions: Vec<(Uuid, NaiveDateTime, Option<NaiveDateTime>)> = presence_sessions::table
        .filter(presence_sessions::started_at.lt(month.end_datetime()))
        .filter(
            presence_sessions::ended_at
                .is_null()
                .or(presence_sessions::ended_at.gt(month.start_datetime())),
        )
        .select((
            presence_sessions::worker_id,
            presence_sessions::started_at,
            presence_sessions::ended_at,
        ))
        .load(conn)?;
    let mut presence: HashMap<Uuid, i64> = HashMap::new();
    for (worker_id, started_at, ended_at) in sessions {
        *presence.entry(worker_id).or_insert(0) +=
            session_minutes_in_month(started_at, ended_at, month, now);
    }

    let people: Vec<(Uuid, String, bool)> = workers::table
        .select((workers::id, workers::display_name, workers::is_active))
        .order(workers::display_name.asc())
        .load(conn)?;

    Ok(people
        .into_iter()
        .filter_map(|(worker_id, display_name, is_active)| {
            let presence_minutes = presence.get(&worker_id).copied().unwrap_or(0);
            let worker_stats = stats.get(&worker_id);
            if !is_active && worker_stats.is_none() && presence_minutes == 0 {
                return None;
            }
            let worker_stats = worker_stats
                .cloned()
                .unwrap_or_else(|| WorkerStats::new(worker_id));
            Some(HoursSummaryRow::new(
                display_name,
                &worker_stats,
                presence_minutes,
            ))
        })
        .collect())
}

/// Team standings built from the stored earnings snapshot of `month`.
pub fn team_ranking(conn: &mut PgConnection, month: MonthDate) -> QueryResult<Vec<TeamStanding>> {
    let team_rows: Vec<(Uuid, String)> = teams::table
        .select((teams::id, teams::name))
        .order(teams::name.asc())
        .load(conn)?;
    let membership: HashMap<Uuid, Uuid> = team_members::table
        .select((team_members::worker_id, team_members::team_id))
        .load::<(Uuid, Uuid)>(conn)?
        .into_iter()
        .collect();

    let snapshot: Vec<MonthlyEarnings> = monthly_earnings::table
        .filter(monthly_earnings::month_date.eq(month.first_day()))
        .load(conn)?;
    let stats: Vec<WorkerStats> = snapshot
        .into_iter()
        .map(|row| WorkerStats {
            worker_id: row.worker_id,
            minutes_free: row.minutes_free,
            minutes_rueda: row.minutes_rueda,
            minutes_cliente: row.minutes_cliente,
            minutes_repite: row.minutes_repite,
            captadas: row.captadas,
        })
        .collect();

    Ok(rank_teams(&team_rows, &membership, &stats))
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub month: MonthDate,
    pub bonuses: usize,
    pub capped: usize,
    pub earnings: usize,
}

/// Generate bonuses, cap them, then recompute earnings so totals include the
/// capped amounts.
pub fn rebuild_month(
    conn: &mut PgConnection,
    month: MonthDate,
    rules: &PayrollRules,
) -> QueryResult<RebuildReport> {
    conn.transaction(|conn| {
        let awards = generate_monthly_bonus(conn, month, rules)?;
        let capped = apply_bonus_cap(conn, month, rules.bonus_cap_cents)?;
        let earnings = recompute_monthly_earnings(conn, month, rules)?;
        Ok(RebuildReport {
            month,
            bonuses: awards.len(),
            capped,
            earnings,
        })
    })
}
