// Resource store contract.
//
// Entities (players, teams, transactions, draft picks) live in an external
// data service. The coordination core only talks to it through this trait;
// `db::SqliteStore` is the bundled implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::draft::pick::DraftPick;
use crate::league::{Player, PlayerId, Team, TeamId};
use crate::transactions::model::{
    ProposedMove, Transaction, TransactionId, TransactionStatus, UnknownStatus,
};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or was busy; the call may succeed if
    /// retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The store refused the request (constraint violation, stale state).
    #[error("store rejected request: {0}")]
    Rejected(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to encode or decode stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(#[from] UnknownStatus),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ResourceStore: Send + Sync {
    // --- transactions ---

    /// Transactions of `week` that are frozen and still awaiting resolution.
    async fn get_frozen_transactions(
        &self,
        season: u32,
        week: u32,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Every transaction of `week`, in id order, regardless of status.
    async fn list_transactions(&self, season: u32, week: u32)
        -> Result<Vec<Transaction>, StoreError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError>;

    /// Record a move set under a freshly allocated move group id. Moves
    /// created with `Frozen` start out awaiting resolution.
    async fn create_move_group(
        &self,
        season: u32,
        week: u32,
        status: TransactionStatus,
        moves: &[ProposedMove],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn set_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), StoreError>;

    /// Clear the awaiting-resolution flag on a contention winner.
    async fn mark_awarded(&self, id: TransactionId) -> Result<(), StoreError>;

    // --- players and teams ---

    async fn get_player(&self, id: PlayerId) -> Result<Player, StoreError>;

    async fn get_team(&self, id: TeamId) -> Result<Team, StoreError>;

    async fn get_roster(&self, team: TeamId) -> Result<Vec<Player>, StoreError>;

    /// Reassign a player to `new_team`.
    async fn apply_roster_mutation(
        &self,
        player: PlayerId,
        new_team: TeamId,
    ) -> Result<(), StoreError>;

    /// Win fraction per team for the season.
    async fn get_standings(&self, season: u32) -> Result<HashMap<TeamId, f64>, StoreError>;

    // --- draft ---

    async fn get_draft_pick(
        &self,
        season: u32,
        overall: u32,
    ) -> Result<Option<DraftPick>, StoreError>;

    /// All picks of the season in `overall` order.
    async fn get_draft_picks(&self, season: u32) -> Result<Vec<DraftPick>, StoreError>;

    /// Fill a pick. Fails with `Rejected` if the pick already has a player.
    async fn set_draft_pick(
        &self,
        season: u32,
        overall: u32,
        player: PlayerId,
        picked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_pick_deadline(
        &self,
        season: u32,
        overall: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// The team's auto-draft list, best candidate first.
    async fn get_want_list(&self, team: TeamId) -> Result<Vec<PlayerId>, StoreError>;

    // --- key-value state ---

    async fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
}

/// Load a typed state record stored under `key`.
pub async fn load_record<T: DeserializeOwned>(
    store: &dyn ResourceStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.load_state(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Persist a typed state record under `key`.
pub async fn save_record<T: Serialize>(
    store: &dyn ResourceStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(record)?;
    store.save_state(key, &value).await
}

/// Player name for announcements, falling back to the id.
pub async fn player_label(store: &dyn ResourceStore, id: PlayerId) -> String {
    match store.get_player(id).await {
        Ok(player) => player.name,
        Err(_) => id.to_string(),
    }
}

/// Team abbreviation for announcements, falling back to the id.
pub async fn team_label(store: &dyn ResourceStore, id: TeamId) -> String {
    match store.get_team(id).await {
        Ok(team) => team.abbrev,
        Err(_) => id.to_string(),
    }
}
