// Shared unit-test fixtures and a fault-injecting store wrapper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::config::{ChannelsConfig, DraftConfig, ExecutorConfig, LeagueConfig};
use crate::db::SqliteStore;
use crate::draft::pick::DraftPick;
use crate::draft::room::DraftRoom;
use crate::league::{Player, PlayerId, Team, TeamId};
use crate::notify::testing::RecordingNotifier;
use crate::notify::Notifier;
use crate::store::{ResourceStore, StoreError};
use crate::transactions::model::{ProposedMove, Transaction, TransactionId, TransactionStatus};

/// Delegates to an inner store, except for roster mutations of chosen
/// players, which fail with `Unavailable` a set number of times.
pub struct FlakyStore {
    inner: Arc<dyn ResourceStore>,
    remaining_failures: Mutex<HashMap<PlayerId, u32>>,
    calls: Mutex<HashMap<PlayerId, u32>>,
    frozen_queries: Mutex<u32>,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn ResourceStore>) -> Self {
        Self {
            inner,
            remaining_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            frozen_queries: Mutex::new(0),
        }
    }

    pub fn fail_mutations_transiently(&self, player: PlayerId, times: u32) {
        self.remaining_failures.lock().unwrap().insert(player, times);
    }

    pub fn mutation_calls(&self, player: PlayerId) -> u32 {
        self.calls.lock().unwrap().get(&player).copied().unwrap_or(0)
    }

    pub fn frozen_queries(&self) -> u32 {
        *self.frozen_queries.lock().unwrap()
    }
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn get_frozen_transactions(
        &self,
        season: u32,
        week: u32,
    ) -> Result<Vec<Transaction>, StoreError> {
        *self.frozen_queries.lock().unwrap() += 1;
        self.inner.get_frozen_transactions(season, week).await
    }

    async fn list_transactions(
        &self,
        season: u32,
        week: u32,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner.list_transactions(season, week).await
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.inner.get_transaction(id).await
    }

    async fn create_move_group(
        &self,
        season: u32,
        week: u32,
        status: TransactionStatus,
        moves: &[ProposedMove],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.inner
            .create_move_group(season, week, status, moves, created_at)
            .await
    }

    async fn set_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), StoreError> {
        self.inner.set_transaction_status(id, status).await
    }

    async fn mark_awarded(&self, id: TransactionId) -> Result<(), StoreError> {
        self.inner.mark_awarded(id).await
    }

    async fn get_player(&self, id: PlayerId) -> Result<Player, StoreError> {
        self.inner.get_player(id).await
    }

    async fn get_team(&self, id: TeamId) -> Result<Team, StoreError> {
        self.inner.get_team(id).await
    }

    async fn get_roster(&self, team: TeamId) -> Result<Vec<Player>, StoreError> {
        self.inner.get_roster(team).await
    }

    async fn apply_roster_mutation(
        &self,
        player: PlayerId,
        new_team: TeamId,
    ) -> Result<(), StoreError> {
        *self.calls.lock().unwrap().entry(player).or_insert(0) += 1;
        {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if let Some(left) = remaining.get_mut(&player) {
                if *left > 0 {
                    *left -= 1;
                    return Err(StoreError::Unavailable("injected timeout".into()));
                }
            }
        }
        self.inner.apply_roster_mutation(player, new_team).await
    }

    async fn get_standings(&self, season: u32) -> Result<HashMap<TeamId, f64>, StoreError> {
        self.inner.get_standings(season).await
    }

    async fn get_draft_pick(
        &self,
        season: u32,
        overall: u32,
    ) -> Result<Option<DraftPick>, StoreError> {
        self.inner.get_draft_pick(season, overall).await
    }

    async fn get_draft_picks(&self, season: u32) -> Result<Vec<DraftPick>, StoreError> {
        self.inner.get_draft_picks(season).await
    }

    async fn set_draft_pick(
        &self,
        season: u32,
        overall: u32,
        player: PlayerId,
        picked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .set_draft_pick(season, overall, player, picked_at)
            .await
    }

    async fn set_pick_deadline(
        &self,
        season: u32,
        overall: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.inner.set_pick_deadline(season, overall, deadline).await
    }

    async fn get_want_list(&self, team: TeamId) -> Result<Vec<PlayerId>, StoreError> {
        self.inner.get_want_list(team).await
    }

    async fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.load_state(key).await
    }

    async fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.inner.save_state(key, value).await
    }
}

// ---------------------------------------------------------------------------
// Draft fixtures
// ---------------------------------------------------------------------------

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 20, 0, 0).unwrap()
}

pub fn draft_config() -> DraftConfig {
    DraftConfig {
        pick_minutes: 8,
        stale_lock_secs: 30,
        first_warning_secs: 60,
        final_warning_secs: 30,
        poll_slow_secs: 30,
        poll_medium_secs: 15,
        poll_fast_secs: 5,
        swar_cap: 32.0,
        cap_top_n: 26,
        cap_tolerance: 0.00001,
    }
}

/// Helper: a four-pick snake draft between VOR (owner u1) and MUD (owner u2).
///
/// Picks: 1 VOR, 2 MUD, 3 MUD, 4 VOR. Free agents 101-104; player 201 is
/// already on MUD. VOR wants [101, 102]; MUD wants only the rostered 201.
pub fn draft_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open(":memory:").unwrap();
    for (id, abbrev, owner) in [
        (1, "VOR", Some("u1")),
        (2, "MUD", Some("u2")),
        (99, "FA", None),
    ] {
        store
            .upsert_team(&Team {
                id: TeamId(id),
                abbrev: abbrev.into(),
                name: format!("{abbrev} club"),
                owner_user_id: owner.map(String::from),
            })
            .unwrap();
    }
    for (id, team, swar) in [
        (101, 99, 1.0),
        (102, 99, 1.5),
        (103, 99, 0.8),
        (104, 99, 2.0),
        (201, 2, 1.0),
    ] {
        store
            .upsert_player(&Player {
                id: PlayerId(id),
                name: format!("Prospect {id}"),
                team_id: TeamId(team),
                swar,
            })
            .unwrap();
    }
    let picks: Vec<DraftPick> = [(1, 1, 1, 1), (2, 1, 2, 2), (3, 2, 1, 2), (4, 2, 2, 1)]
        .into_iter()
        .map(|(overall, round, position, owner)| DraftPick {
            season: 12,
            overall,
            round,
            position_in_round: position,
            owner_team_id: TeamId(owner),
            player_id: None,
            deadline: None,
            picked_at: None,
        })
        .collect();
    store.insert_draft_picks(&picks).unwrap();
    store
        .set_want_list(TeamId(1), &[PlayerId(101), PlayerId(102)])
        .unwrap();
    store.set_want_list(TeamId(2), &[PlayerId(201)]).unwrap();
    Arc::new(store)
}

/// Short backoff so retried roster updates stay quick in tests.
pub fn retry_config() -> ExecutorConfig {
    ExecutorConfig {
        rate_limit_ms: 0,
        max_attempts: 3,
        backoff_base_ms: 10,
    }
}

pub fn draft_room_on(store: Arc<dyn ResourceStore>, notifier: Arc<dyn Notifier>) -> Arc<DraftRoom> {
    let league = LeagueConfig {
        name: "Test League".into(),
        season: 12,
        off_season: false,
        free_agent_team: TeamId(99),
    };
    let channels = ChannelsConfig {
        announcements: "txlog".into(),
        draft: "draft".into(),
        operator: "ops".into(),
    };
    Arc::new(DraftRoom::new(
        store,
        notifier,
        &league,
        draft_config(),
        retry_config(),
        channels,
    ))
}

pub fn draft_room_with(notifier: Arc<dyn Notifier>) -> (Arc<SqliteStore>, Arc<DraftRoom>) {
    let store = draft_store();
    let room = draft_room_on(store.clone(), notifier);
    (store, room)
}

pub fn draft_room() -> (Arc<SqliteStore>, Arc<DraftRoom>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, room) = draft_room_with(notifier.clone());
    (store, room, notifier)
}
