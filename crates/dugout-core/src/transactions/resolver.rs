// Contention resolution for the closing transaction window.
//
// When several teams claim the same player in one window, the team with the
// worst record gets the player. Equal win fractions are common, so every
// competing team also draws a small random component once per resolution
// pass. The spread of that component is smaller than any realistic gap
// between two distinct win fractions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rand::Rng;
use tracing::{debug, info};

use crate::league::{PlayerId, TeamId};
use crate::transactions::model::{MoveGroupId, Transaction, TransactionId};

/// Bounds of the per-team tiebreak draw.
pub const TIEBREAK_MIN: f64 = 0.000_100_00;
pub const TIEBREAK_MAX: f64 = 0.000_999_99;

/// A team's standing in one contest. Lower keys claim first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityEntry {
    pub team: TeamId,
    pub win_fraction: f64,
    pub key: f64,
}

/// How a contested player was decided.
#[derive(Debug, Clone, PartialEq)]
pub struct Contest {
    pub player_id: PlayerId,
    pub winner: TeamId,
    pub winning_group: MoveGroupId,
    /// Every competing team, best priority first.
    pub ranking: Vec<PriorityEntry>,
}

/// A claim that lost its contest.
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub transaction: Transaction,
    pub winner: TeamId,
}

/// Outcome of one window-close resolution pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Winning transactions, uncontested ones included.
    pub processed: Vec<Transaction>,
    pub cancelled: Vec<Cancellation>,
    pub contests: Vec<Contest>,
}

impl Resolution {
    pub fn processed_ids(&self) -> Vec<TransactionId> {
        self.processed.iter().map(|t| t.id).collect()
    }

    pub fn cancelled_ids(&self) -> Vec<TransactionId> {
        self.cancelled.iter().map(|c| c.transaction.id).collect()
    }
}

/// Draw one priority key per team. Teams are visited in id order so that a
/// seeded generator always hands out the same draws.
pub fn draw_priority_keys<R: Rng>(
    teams: &BTreeSet<TeamId>,
    standings: &HashMap<TeamId, f64>,
    rng: &mut R,
) -> HashMap<TeamId, PriorityEntry> {
    teams
        .iter()
        .map(|&team| {
            let win_fraction = standings.get(&team).copied().unwrap_or(0.0);
            let key = win_fraction + rng.gen_range(TIEBREAK_MIN..=TIEBREAK_MAX);
            (
                team,
                PriorityEntry {
                    team,
                    win_fraction,
                    key,
                },
            )
        })
        .collect()
}

/// Decide every claim in `frozen`, the snapshot of transactions awaiting
/// resolution in the closing window.
///
/// Each claimed player ends up with exactly one winning move group; all other
/// claims on that player are cancelled. A team is expected to hold at most one
/// claim per player (enforced at submission).
pub fn resolve<R: Rng>(
    frozen: &[Transaction],
    standings: &HashMap<TeamId, f64>,
    rng: &mut R,
) -> Resolution {
    let mut by_player: BTreeMap<PlayerId, Vec<&Transaction>> = BTreeMap::new();
    for txn in frozen {
        by_player.entry(txn.player_id).or_default().push(txn);
    }

    let contested_teams: BTreeSet<TeamId> = by_player
        .values()
        .filter(|claims| distinct_teams(claims) > 1)
        .flat_map(|claims| claims.iter().map(|t| t.to_team))
        .collect();
    let keys = draw_priority_keys(&contested_teams, standings, rng);

    let mut resolution = Resolution::default();

    for (player_id, claims) in by_player {
        if distinct_teams(&claims) < 2 {
            resolution
                .processed
                .extend(claims.into_iter().cloned());
            continue;
        }

        let mut ranking: Vec<PriorityEntry> = claims
            .iter()
            .map(|t| t.to_team)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|team| keys.get(&team).copied())
            .collect();
        ranking.sort_by(|a, b| a.key.total_cmp(&b.key).then(a.team.cmp(&b.team)));

        let winner = ranking[0].team;
        let winning_group = claims
            .iter()
            .filter(|t| t.to_team == winner)
            .map(|t| t.move_group)
            .min()
            .unwrap_or_else(|| claims[0].move_group);

        for txn in claims {
            if txn.move_group == winning_group {
                resolution.processed.push(txn.clone());
            } else {
                resolution.cancelled.push(Cancellation {
                    transaction: txn.clone(),
                    winner,
                });
            }
        }

        info!(
            %player_id,
            %winner,
            contenders = ranking.len(),
            "contested claim resolved"
        );
        for entry in &ranking {
            debug!(
                %player_id,
                team = %entry.team,
                win_fraction = entry.win_fraction,
                key = entry.key,
                "priority"
            );
        }

        resolution.contests.push(Contest {
            player_id,
            winner,
            winning_group,
            ranking,
        });
    }

    resolution
}

fn distinct_teams(claims: &[&Transaction]) -> usize {
    claims.iter().map(|t| t.to_team).collect::<BTreeSet<_>>().len()
}
