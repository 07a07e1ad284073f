//! Monthly earnings, bonuses and rankings.
//!
//! The arithmetic lives in [`earnings`], [`bonus`], [`ranking`] and
//! [`summary`] as plain functions over in-memory rows; [`procedures`] loads
//! the month from the database, runs them and writes the snapshots back.

pub mod bonus;
pub mod earnings;
pub mod procedures;
pub mod ranking;
pub mod summary;

use serde::Serialize;

pub use bonus::{apply_cap, award_bonuses, BonusAward, BonusCategory};
pub use earnings::{aggregate, EarningsBreakdown, WorkerStats};
pub use procedures::{
    admin_hours_summary, apply_bonus_cap, generate_monthly_bonus, rebuild_month,
    recompute_monthly_earnings, team_ranking, RebuildReport,
};
pub use ranking::{rank_teams, rank_workers, RankedWorker, TeamStanding};
pub use summary::HoursSummaryRow;

use crate::ingest::CallCode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayrollRules {
    /// Cents paid per minute for each call code.
    pub rate_free_cents: i64,
    pub rate_rueda_cents: i64,
    pub rate_cliente_cents: i64,
    pub rate_repite_cents: i64,
    pub captada_bonus_cents: i64,
    /// Award per ranking position, index 0 is first place.
    pub bonus_amounts_cents: Vec<i64>,
    /// Minutes a worker needs before percentage categories count.
    pub bonus_min_minutes: i32,
    /// Monthly ceiling on a worker's bonuses; zero or less disables it.
    pub bonus_cap_cents: i64,
}

impl Default for PayrollRules {
    fn default() -> Self {
        Self {
            rate_free_cents: 2,
            rate_rueda_cents: 5,
            rate_cliente_cents: 10,
            rate_repite_cents: 12,
            captada_bonus_cents: 100,
            bonus_amounts_cents: vec![3000, 2000, 1000],
            bonus_min_minutes: 600,
            bonus_cap_cents: 5000,
        }
    }
}

impl PayrollRules {
    pub fn rate_for(&self, code: CallCode) -> i64 {
        match code {
            CallCode::Free => self.rate_free_cents,
            CallCode::Rueda => self.rate_rueda_cents,
            CallCode::Cliente => self.rate_cliente_cents,
            CallCode::Repite => self.rate_repite_cents,
        }
    }

    pub fn amount_for_position(&self, position: usize) -> Option<i64> {
        position
            .checked_sub(1)
            .and_then(|idx| self.bonus_amounts_cents.get(idx))
            .copied()
    }
}
