use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use super::PayrollRules;
use crate::ingest::CallCode;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub worker_id: Uuid,
    pub minutes_free: i32,
    pub minutes_rueda: i32,
    pub minutes_cliente: i32,
    pub minutes_repite: i32,
    pub captadas: i32,
}

impl WorkerStats {
    pub fn new(worker_id: Uuid) -> Self {
        Self {
            worker_id,
            ..Self::default()
        }
    }

    pub fn record(&mut self, code: CallCode, minutes: i32, captured: bool) {
        let slot = match code {
            CallCode::Free => &mut self.minutes_free,
            CallCode::Rueda => &mut self.minutes_rueda,
            CallCode::Cliente => &mut self.minutes_cliente,
            CallCode::Repite => &mut self.minutes_repite,
        };
        *slot = slot.saturating_add(minutes);
        if captured {
            self.captadas = self.captadas.saturating_add(1);
        }
    }

    pub fn minutes(&self, code: CallCode) -> i32 {
        match code {
            CallCode::Free => self.minutes_free,
            CallCode::Rueda => self.minutes_rueda,
            CallCode::Cliente => self.minutes_cliente,
            CallCode::Repite => self.minutes_repite,
        }
    }

    pub fn minutes_total(&self) -> i32 {
        CallCode::ALL
            .into_iter()
            .fold(0i32, |total, code| total.saturating_add(self.minutes(code)))
    }

    /// Share of the month's minutes spent on `code`, in percent.
    pub fn pct(&self, code: CallCode) -> f64 {
        percentage(self.minutes(code), self.minutes_total())
    }
}

pub(crate) fn percentage(part: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let raw = f64::from(part) * 100.0 / f64::from(total);
    (raw * 100.0).round() / 100.0
}

/// Folds `(worker, code, minutes, captured)` rows into per-worker stats,
/// ordered by worker id.
pub fn aggregate<I>(rows: I) -> BTreeMap<Uuid, WorkerStats>
where
    I: IntoIterator<Item = (Uuid, CallCode, i32, bool)>,
{
    let mut stats: BTreeMap<Uuid, WorkerStats> = BTreeMap::new();
    for (worker_id, code, minutes, captured) in rows {
        stats
            .entry(worker_id)
            .or_insert_with(|| WorkerStats::new(worker_id))
            .record(code, minutes, captured);
    }
    stats
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EarningsBreakdown {
    pub base_cents: i64,
    pub bonus_cents: i64,
    pub penalty_cents: i64,
    pub total_cents: i64,
}

pub fn base_pay_cents(stats: &WorkerStats, rules: &PayrollRules) -> i64 {
    let minutes_pay: i64 = CallCode::ALL
        .into_iter()
        .map(|code| i64::from(stats.minutes(code)) * rules.rate_for(code))
        .sum();
    minutes_pay + i64::from(stats.captadas) * rules.captada_bonus_cents
}

pub fn breakdown(
    stats: &WorkerStats,
    rules: &PayrollRules,
    bonus_cents: i64,
    penalty_cents: i64,
) -> EarningsBreakdown {
    let base_cents = base_pay_cents(stats, rules);
    EarningsBreakdown {
        base_cents,
        bonus_cents,
        penalty_cents,
        total_cents: base_cents + bonus_cents - penalty_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_minutes_per_code_and_counts_captadas() {
        let luna = Uuid::new_v4();
        let sol = Uuid::new_v4();
        let stats = aggregate([
            (luna, CallCode::Cliente, 30, true),
            (luna, CallCode::Repite, 10, false),
            (luna, CallCode::Cliente, 20, true),
            (sol, CallCode::Free, 5, false),
        ]);

        let luna_stats = &stats[&luna];
        assert_eq!(luna_stats.minutes_cliente, 50);
        assert_eq!(luna_stats.minutes_repite, 10);
        assert_eq!(luna_stats.minutes_total(), 60);
        assert_eq!(luna_stats.captadas, 2);
        assert_eq!(stats[&sol].minutes_total(), 5);
    }

    #[test]
    fn oversized_totals_saturate_instead_of_wrapping() {
        let luna = Uuid::new_v4();
        let stats = aggregate([
            (luna, CallCode::Cliente, 2_000_000_000, false),
            (luna, CallCode::Cliente, 2_000_000_000, false),
            (luna, CallCode::Repite, 5, false),
        ]);
        assert_eq!(stats[&luna].minutes_cliente, i32::MAX);
        assert_eq!(stats[&luna].minutes_total(), i32::MAX);
    }

    #[test]
    fn percentages_round_to_two_decimals_and_survive_zero_minutes() {
        let mut stats = WorkerStats::new(Uuid::nil());
        assert_eq!(stats.pct(CallCode::Cliente), 0.0);
        stats.record(CallCode::Cliente, 1, false);
        stats.record(CallCode::Repite, 2, false);
        assert_eq!(stats.pct(CallCode::Cliente), 33.33);
        assert_eq!(stats.pct(CallCode::Repite), 66.67);
    }

    #[test]
    fn base_pay_uses_code_rates_and_captada_bonus() {
        let rules = PayrollRules::default();
        let mut stats = WorkerStats::new(Uuid::nil());
        stats.record(CallCode::Free, 10, false);
        stats.record(CallCode::Rueda, 10, false);
        stats.record(CallCode::Cliente, 10, true);
        stats.record(CallCode::Repite, 10, false);
        // 10*2 + 10*5 + 10*10 + 10*12 + 1*100
        assert_eq!(base_pay_cents(&stats, &rules), 390);

        let totals = breakdown(&stats, &rules, 1000, 250);
        assert_eq!(totals.total_cents, 390 + 1000 - 250);
    }
}
