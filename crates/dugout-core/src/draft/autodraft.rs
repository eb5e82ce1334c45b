// Pick eligibility and want-list selection.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::DraftConfig;
use crate::league::{Player, PlayerId, TeamId};
use crate::store::{ResourceStore, StoreError};

/// Roster value ceiling applied to every pick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapRule {
    pub limit: f64,
    pub top_n: usize,
    pub tolerance: f64,
}

impl CapRule {
    pub fn from_config(draft: &DraftConfig) -> Self {
        Self {
            limit: draft.swar_cap,
            top_n: draft.cap_top_n,
            tolerance: draft.cap_tolerance,
        }
    }

    /// Sum of the best `min(top_n, roster + 1)` sWAR values once `candidate`
    /// joins `roster`.
    pub fn counted_total(&self, roster: &[Player], candidate: &Player) -> f64 {
        let mut values: Vec<f64> = roster
            .iter()
            .chain(std::iter::once(candidate))
            .map(|p| p.swar)
            .collect();
        values.sort_by(|a, b| b.total_cmp(a));
        let n = self.top_n.min(values.len());
        values.iter().take(n).sum()
    }

    pub fn allows(&self, total: f64) -> bool {
        total <= self.limit + self.tolerance
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Ineligible {
    #[error("{player} is not a free agent")]
    NotFreeAgent { player: PlayerId },

    #[error("{player} would put the roster at {total:.5} sWAR, over the {limit} cap")]
    OverCap {
        player: PlayerId,
        total: f64,
        limit: f64,
    },
}

/// Whether `team` may draft `player` right now.
pub async fn check_eligibility(
    store: &dyn ResourceStore,
    team: TeamId,
    player: &Player,
    free_agent_team: TeamId,
    cap: &CapRule,
) -> Result<Result<(), Ineligible>, StoreError> {
    if !player.is_free_agent(free_agent_team) {
        return Ok(Err(Ineligible::NotFreeAgent { player: player.id }));
    }
    let roster = store.get_roster(team).await?;
    let total = cap.counted_total(&roster, player);
    if !cap.allows(total) {
        return Ok(Err(Ineligible::OverCap {
            player: player.id,
            total,
            limit: cap.limit,
        }));
    }
    Ok(Ok(()))
}

/// First player on the team's want-list that passes eligibility, if any.
pub async fn select_candidate(
    store: &dyn ResourceStore,
    team: TeamId,
    free_agent_team: TeamId,
    cap: &CapRule,
) -> Result<Option<Player>, StoreError> {
    let want_list = store.get_want_list(team).await?;
    if want_list.is_empty() {
        info!(%team, "no want-list on file");
        return Ok(None);
    }

    for player_id in want_list {
        let player = match store.get_player(player_id).await {
            Ok(player) => player,
            Err(StoreError::NotFound { .. }) => {
                debug!(%team, %player_id, "want-list entry no longer exists");
                continue;
            }
            Err(e) => return Err(e),
        };
        match check_eligibility(store, team, &player, free_agent_team, cap).await? {
            Ok(()) => return Ok(Some(player)),
            Err(reason) => debug!(%team, "skipping want-list candidate: {reason}"),
        }
    }
    Ok(None)
}
