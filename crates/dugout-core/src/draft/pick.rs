// Draft pick slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::league::{PlayerId, TeamId};

/// One slot in the season's draft order. All slots are created up front;
/// `player_id` and `picked_at` are written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPick {
    pub season: u32,
    /// 1-based position in the whole draft.
    pub overall: u32,
    pub round: u32,
    pub position_in_round: u32,
    pub owner_team_id: TeamId,
    pub player_id: Option<PlayerId>,
    /// Set when the pick comes on the clock with the timer running.
    pub deadline: Option<DateTime<Utc>>,
    pub picked_at: Option<DateTime<Utc>>,
}

impl DraftPick {
    pub fn is_filled(&self) -> bool {
        self.player_id.is_some()
    }

    /// A pick the clock has already moved past without a selection. Skipped
    /// picks stay fillable as makeup picks.
    pub fn is_skipped(&self, current_overall: u32) -> bool {
        self.overall < current_overall && self.player_id.is_none()
    }
}
