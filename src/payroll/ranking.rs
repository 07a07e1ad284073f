use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use super::earnings::percentage;
use super::WorkerStats;
use crate::ingest::CallCode;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedWorker {
    pub worker_id: Uuid,
    pub position: i32,
    pub minutes_total: i32,
    pub captadas: i32,
    pub pct_cliente: f64,
    pub pct_repite: f64,
}

/// Orders by total minutes, then captadas. Workers equal on both share a
/// position.
pub fn rank_workers(stats: &[WorkerStats]) -> Vec<RankedWorker> {
    let mut sorted: Vec<&WorkerStats> = stats.iter().collect();
    sorted.sort_by(|a, b| {
        b.minutes_total()
            .cmp(&a.minutes_total())
            .then_with(|| b.captadas.cmp(&a.captadas))
            .then_with(|| a.worker_id.cmp(&b.worker_id))
    });

    let mut ranked: Vec<RankedWorker> = Vec::with_capacity(sorted.len());
    for (idx, s) in sorted.into_iter().enumerate() {
        let position = match ranked.last() {
            Some(prev) if prev.minutes_total == s.minutes_total() && prev.captadas == s.captadas => {
                prev.position
            }
            _ => idx as i32 + 1,
        };
        ranked.push(RankedWorker {
            worker_id: s.worker_id,
            position,
            minutes_total: s.minutes_total(),
            captadas: s.captadas,
            pct_cliente: s.pct(CallCode::Cliente),
            pct_repite: s.pct(CallCode::Repite),
        });
    }
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamStanding {
    pub team_id: Uuid,
    pub name: String,
    pub position: i32,
    pub members: usize,
    pub minutes_total: i32,
    pub captadas: i32,
    pub pct_cliente: f64,
    pub pct_repite: f64,
}

/// Sums member stats per team. Percentages are weighted by minutes, so a
/// member with more calls counts for more. Teams without activity still
/// appear, at the bottom.
pub fn rank_teams(
    teams: &[(Uuid, String)],
    membership: &HashMap<Uuid, Uuid>,
    stats: &[WorkerStats],
) -> Vec<TeamStanding> {
    let mut totals: HashMap<Uuid, (WorkerStats, usize)> = teams
        .iter()
        .map(|(team_id, _)| (*team_id, (WorkerStats::new(*team_id), 0)))
        .collect();

    for s in stats {
        let Some(team_id) = membership.get(&s.worker_id) else {
            continue;
        };
        if let Some((sum, _)) = totals.get_mut(team_id) {
            sum.minutes_free = sum.minutes_free.saturating_add(s.minutes_free);
            sum.minutes_rueda = sum.minutes_rueda.saturating_add(s.minutes_rueda);
            sum.minutes_cliente = sum.minutes_cliente.saturating_add(s.minutes_cliente);
            sum.minutes_repite = sum.minutes_repite.saturating_add(s.minutes_repite);
            sum.captadas = sum.captadas.saturating_add(s.captadas);
        }
    }
    for team_id in membership.values() {
        if let Some((_, members)) = totals.get_mut(team_id) {
            *members += 1;
        }
    }

    let mut standings: Vec<TeamStanding> = teams
        .iter()
        .filter_map(|(team_id, name)| {
            let (sum, members) = totals.get(team_id)?;
            Some(TeamStanding {
                team_id: *team_id,
                name: name.clone(),
                position: 0,
                members: *members,
                minutes_total: sum.minutes_total(),
                captadas: sum.captadas,
                pct_cliente: percentage(sum.minutes_cliente, sum.minutes_total()),
                pct_repite: percentage(sum.minutes_repite, sum.minutes_total()),
            })
        })
        .collect();

    standings.sort_by(|a, b| {
        b.minutes_total
            .cmp(&a.minutes_total)
            .then_with(|| b.captadas.cmp(&a.captadas))
            .then_with(|| a.name.cmp(&b.name))
    });
    for (idx, standing) in standings.iter_mut().enumerate() {
        standing.position = idx as i32 + 1;
    }
    standings
}
