// Move submission and withdrawal.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::league::{PlayerId, TeamId};
use crate::store::{ResourceStore, StoreError};
use crate::transactions::model::{ProposedMove, Transaction, TransactionId, TransactionStatus};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("transactions are closed for the off-season")]
    OffSeason,

    #[error("a move set needs at least one move")]
    Empty,

    #[error("{player} is already on {team}")]
    SameTeam { player: PlayerId, team: TeamId },

    #[error("{0} appears more than once in the move set")]
    DuplicatePlayer(PlayerId),

    #[error("{player} is on {actual}, not {claimed}")]
    WrongTeam {
        player: PlayerId,
        claimed: TeamId,
        actual: TeamId,
    },

    #[error("{team} already has a claim on {player} for week {week}")]
    AlreadyClaimed {
        player: PlayerId,
        team: TeamId,
        week: u32,
    },

    #[error("{id} is {status} and can no longer be withdrawn")]
    NotWithdrawable {
        id: TransactionId,
        status: TransactionStatus,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a new move set lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionWindow {
    pub season: u32,
    pub current_week: u32,
    pub window_open: bool,
    pub off_season: bool,
}

impl SubmissionWindow {
    /// Week the moves contend in and the status they start with. While the
    /// window is open moves join the current week frozen; otherwise they wait
    /// for the next window as pending.
    pub fn target(&self) -> (u32, TransactionStatus) {
        if self.window_open {
            (self.current_week, TransactionStatus::Frozen)
        } else {
            (self.current_week + 1, TransactionStatus::Pending)
        }
    }
}

/// Validate and record a move set under one new move group.
pub async fn submit_moves(
    store: &dyn ResourceStore,
    window: SubmissionWindow,
    moves: &[ProposedMove],
    now: DateTime<Utc>,
) -> Result<Vec<Transaction>, SubmitError> {
    if window.off_season {
        return Err(SubmitError::OffSeason);
    }
    if moves.is_empty() {
        return Err(SubmitError::Empty);
    }

    let (week, status) = window.target();
    let existing = store.list_transactions(window.season, week).await?;

    let mut seen = HashSet::new();
    for mv in moves {
        if !seen.insert(mv.player_id) {
            return Err(SubmitError::DuplicatePlayer(mv.player_id));
        }
        if mv.from_team == mv.to_team {
            return Err(SubmitError::SameTeam {
                player: mv.player_id,
                team: mv.to_team,
            });
        }

        let player = store.get_player(mv.player_id).await?;
        if player.team_id != mv.from_team {
            return Err(SubmitError::WrongTeam {
                player: mv.player_id,
                claimed: mv.from_team,
                actual: player.team_id,
            });
        }

        let duplicate = existing.iter().any(|t| {
            t.player_id == mv.player_id && t.to_team == mv.to_team && !t.status.is_terminal()
        });
        if duplicate {
            return Err(SubmitError::AlreadyClaimed {
                player: mv.player_id,
                team: mv.to_team,
                week,
            });
        }
    }

    let created = store
        .create_move_group(window.season, week, status, moves, now)
        .await?;
    if let Some(first) = created.first() {
        info!(
            group = %first.move_group,
            moves = created.len(),
            %status,
            week,
            "move set submitted"
        );
    }
    Ok(created)
}

/// Withdraw a move that has not yet entered a window.
pub async fn withdraw_move(
    store: &dyn ResourceStore,
    id: TransactionId,
) -> Result<Transaction, SubmitError> {
    let txn = store.get_transaction(id).await?;
    if txn.status != TransactionStatus::Pending {
        return Err(SubmitError::NotWithdrawable {
            id,
            status: txn.status,
        });
    }
    store
        .set_transaction_status(id, TransactionStatus::Cancelled)
        .await?;
    info!(txn = %id, group = %txn.move_group, "move withdrawn");
    Ok(store.get_transaction(id).await?)
}
