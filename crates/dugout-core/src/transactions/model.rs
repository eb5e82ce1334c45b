// Transaction records and the lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::league::{PlayerId, TeamId};

/// Store-assigned transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// Correlates the moves a team submitted together.
///
/// `seq` is allocated by the store and is unique within a (season, week).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoveGroupId {
    pub season: u32,
    pub week: u32,
    pub seq: u32,
}

impl fmt::Display for MoveGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}W{}-{}", self.season, self.week, self.seq)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Submitted before its window opened.
    Pending,
    /// In contention for the current window, or awarded and waiting to be
    /// applied (see [`Transaction::is_awarded`]).
    Frozen,
    /// Applied to the roster. Terminal.
    Processed,
    /// Withdrawn or lost contention. Terminal.
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transaction transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transaction status `{0}`")]
pub struct UnknownStatus(pub String);

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Processed | TransactionStatus::Cancelled)
    }

    /// Check a status change against the lifecycle:
    ///
    /// - `Pending -> Frozen` at window-open
    /// - `Pending -> Cancelled` on withdrawal
    /// - `Frozen -> Processed` once the roster mutation lands
    /// - `Frozen -> Cancelled` on contention loss
    pub fn transition(self, to: TransactionStatus) -> Result<TransactionStatus, InvalidTransition> {
        use TransactionStatus::*;
        match (self, to) {
            (Pending, Frozen) | (Pending, Cancelled) | (Frozen, Processed) | (Frozen, Cancelled) => {
                Ok(to)
            }
            _ => Err(InvalidTransition { from: self, to }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Frozen => "frozen",
            TransactionStatus::Processed => "processed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "frozen" => Ok(TransactionStatus::Frozen),
            "processed" => Ok(TransactionStatus::Processed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// One player move within a move group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub move_group: MoveGroupId,
    pub season: u32,
    /// The window this move contends in.
    pub week: u32,
    pub player_id: PlayerId,
    pub from_team: TeamId,
    pub to_team: TeamId,
    pub status: TransactionStatus,
    /// Awaiting window-close resolution.
    pub frozen: bool,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// In contention: frozen and not yet resolved.
    pub fn is_awaiting_resolution(&self) -> bool {
        self.status == TransactionStatus::Frozen && self.frozen
    }

    /// Won its window and waits for the next window-open to be applied.
    /// The `Processed` status is only written once the roster mutation has
    /// succeeded.
    pub fn is_awarded(&self) -> bool {
        self.status == TransactionStatus::Frozen && !self.frozen
    }
}

/// A single move as submitted by a team, before the store assigns ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedMove {
    pub player_id: PlayerId,
    pub from_team: TeamId,
    pub to_team: TeamId,
}
