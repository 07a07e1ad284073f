use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PayrollRules, WorkerStats};
use crate::ingest::CallCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BonusCategory {
    Captadas,
    Cliente,
    Repite,
}

impl BonusCategory {
    pub const ALL: [BonusCategory; 3] = [
        BonusCategory::Captadas,
        BonusCategory::Cliente,
        BonusCategory::Repite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BonusCategory::Captadas => "captadas",
            BonusCategory::Cliente => "cliente",
            BonusCategory::Repite => "repite",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }

    /// `None` when the worker does not compete in this category.
    fn score(self, stats: &WorkerStats, rules: &PayrollRules) -> Option<f64> {
        let score = match self {
            BonusCategory::Captadas => f64::from(stats.captadas),
            BonusCategory::Cliente | BonusCategory::Repite => {
                if stats.minutes_total() < rules.bonus_min_minutes {
                    return None;
                }
                let code = if self == BonusCategory::Cliente {
                    CallCode::Cliente
                } else {
                    CallCode::Repite
                };
                stats.pct(code)
            }
        };
        (score > 0.0).then_some(score)
    }
}

impl fmt::Display for BonusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BonusAward {
    pub worker_id: Uuid,
    pub category: BonusCategory,
    pub position: i32,
    pub amount_cents: i64,
    pub capped: bool,
}

/// Ranks workers in every category and pays the configured amount per
/// position. Equal scores share a position (1, 1, 3).
pub fn award_bonuses(stats: &[WorkerStats], rules: &PayrollRules) -> Vec<BonusAward> {
    let mut awards = Vec::new();

    for category in BonusCategory::ALL {
        let mut scored: Vec<(Uuid, f64)> = stats
            .iter()
            .filter_map(|s| category.score(s, rules).map(|score| (s.worker_id, score)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut position = 0;
        let mut previous: Option<f64> = None;
        for (idx, (worker_id, score)) in scored.into_iter().enumerate() {
            if previous != Some(score) {
                position = idx + 1;
                previous = Some(score);
            }
            let Some(amount_cents) = rules.amount_for_position(position) else {
                break;
            };
            awards.push(BonusAward {
                worker_id,
                category,
                position: position as i32,
                amount_cents,
                capped: false,
            });
        }
    }

    awards
}

/// Limits each worker's bonus total to `cap_cents`. Larger awards are kept
/// first; the award that crosses the cap is trimmed and later ones drop to
/// zero. Returns how many awards were reduced.
pub fn apply_cap(awards: &mut [BonusAward], cap_cents: i64) -> usize {
    if cap_cents <= 0 {
        return 0;
    }

    let mut by_worker: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (idx, award) in awards.iter().enumerate() {
        by_worker.entry(award.worker_id).or_default().push(idx);
    }

    let mut reduced = 0;
    for indices in by_worker.values_mut() {
        indices.sort_by(|a, b| {
            awards[*b]
                .amount_cents
                .cmp(&awards[*a].amount_cents)
                .then_with(|| awards[*a].category.cmp(&awards[*b].category))
        });

        let mut remaining = cap_cents;
        for idx in indices.iter() {
            let award = &mut awards[*idx];
            if award.amount_cents <= remaining {
                remaining -= award.amount_cents;
            } else {
                award.amount_cents = remaining;
                award.capped = true;
                remaining = 0;
                reduced += 1;
            }
        }
    }

    reduced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(worker_id: Uuid, cliente: i32, repite: i32, captadas: i32) -> WorkerStats {
        WorkerStats {
            worker_id,
            minutes_cliente: cliente,
            minutes_repite: repite,
            captadas,
            ..WorkerStats::default()
        }
    }

    #[test]
    fn awards_positions_per_category() {
        let rules = PayrollRules::default();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let d = Uuid::from_u128(4);
        let all = vec![
            stats(a, 900, 100, 5),
            stats(b, 500, 500, 9),
            stats(c, 300, 700, 1),
            stats(d, 100, 50, 0),
        ];

        let awards = award_bonuses(&all, &rules);
        let captadas: Vec<_> = awards
            .iter()
            .filter(|aw| aw.category == BonusCategory::Captadas)
            .map(|aw| (aw.worker_id, aw.position, aw.amount_cents))
            .collect();
        assert_eq!(captadas, vec![(b, 1, 3000), (a, 2, 2000), (c, 3, 1000)]);

        // d has only 150 minutes and cannot compete on percentages.
        assert!(awards
            .iter()
            .filter(|aw| aw.category != BonusCategory::Captadas)
            .all(|aw| aw.worker_id != d));

        let repite_winner = awards
            .iter()
            .find(|aw| aw.category == BonusCategory::Repite && aw.position == 1)
            .unwrap();
        assert_eq!(repite_winner.worker_id, c);
    }

    #[test]
    fn ties_share_a_position() {
        let rules = PayrollRules::default();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let awards = award_bonuses(
            &[stats(a, 0, 0, 4), stats(b, 0, 0, 4), stats(c, 0, 0, 2)],
            &rules,
        );
        let positions: Vec<_> = awards.iter().map(|aw| (aw.worker_id, aw.position)).collect();
        assert_eq!(positions, vec![(a, 1), (b, 1), (c, 3)]);
        assert_eq!(awards[2].amount_cents, 1000);
    }

    #[test]
    fn cap_trims_the_crossing_award_and_zeroes_the_rest() {
        let w = Uuid::from_u128(7);
        let award = |category, amount_cents| BonusAward {
            worker_id: w,
            category,
            position: 1,
            amount_cents,
            capped: false,
        };
        let mut awards = vec![
            award(BonusCategory::Captadas, 2000),
            award(BonusCategory::Cliente, 3000),
            award(BonusCategory::Repite, 1000),
        ];

        let reduced = apply_cap(&mut awards, 4500);
        assert_eq!(reduced, 2);
        assert_eq!(awards[1].amount_cents, 3000);
        assert_eq!(awards[0].amount_cents, 1500);
        assert!(awards[0].capped);
        assert_eq!(awards[2].amount_cents, 0);
        assert!(awards[2].capped);
        assert_eq!(awards.iter().map(|a| a.amount_cents).sum::<i64>(), 4500);
    }

    #[test]
    fn non_positive_cap_leaves_awards_alone() {
        let mut awards = vec![BonusAward {
            worker_id: Uuid::nil(),
            category: BonusCategory::Captadas,
            position: 1,
            amount_cents: 9999,
            capped: false,
        }];
        assert_eq!(apply_cap(&mut awards, 0), 0);
        assert_eq!(awards[0].amount_cents, 9999);
    }
}
