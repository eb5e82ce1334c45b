// SQLite-backed resource store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::draft::pick::DraftPick;
use crate::league::{Player, PlayerId, Team, TeamId, TeamRecord};
use crate::store::{ResourceStore, StoreError};
use crate::transactions::model::{
    MoveGroupId, ProposedMove, Transaction, TransactionId, TransactionStatus,
};

/// SQLite persistence for teams, players, standings, transactions, draft
/// picks, want-lists and key-value league state.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at `path` and ensure all tables exist.
    /// Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS teams (
                id            INTEGER PRIMARY KEY,
                abbrev        TEXT NOT NULL UNIQUE,
                name          TEXT NOT NULL,
                owner_user_id TEXT
            );

            CREATE TABLE IF NOT EXISTS players (
                id      INTEGER PRIMARY KEY,
                name    TEXT NOT NULL,
                team_id INTEGER NOT NULL REFERENCES teams(id),
                swar    REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS standings (
                season  INTEGER NOT NULL,
                team_id INTEGER NOT NULL REFERENCES teams(id),
                wins    INTEGER NOT NULL DEFAULT 0,
                losses  INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (season, team_id)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                season     INTEGER NOT NULL,
                week       INTEGER NOT NULL,
                group_seq  INTEGER NOT NULL,
                player_id  INTEGER NOT NULL REFERENCES players(id),
                from_team  INTEGER NOT NULL REFERENCES teams(id),
                to_team    INTEGER NOT NULL REFERENCES teams(id),
                status     TEXT NOT NULL,
                frozen     INTEGER NOT NULL DEFAULT 0,
                cancelled  INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS draft_picks (
                season            INTEGER NOT NULL,
                overall           INTEGER NOT NULL,
                round             INTEGER NOT NULL,
                position_in_round INTEGER NOT NULL,
                owner_team_id     INTEGER NOT NULL REFERENCES teams(id),
                player_id         INTEGER REFERENCES players(id),
                deadline          TEXT,
                picked_at         TEXT,
                PRIMARY KEY (season, overall)
            );

            CREATE TABLE IF NOT EXISTS want_lists (
                team_id   INTEGER NOT NULL REFERENCES teams(id),
                rank      INTEGER NOT NULL,
                player_id INTEGER NOT NULL REFERENCES players(id),
                PRIMARY KEY (team_id, rank)
            );

            CREATE TABLE IF NOT EXISTS league_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_window
                ON transactions(season, week);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Seeding (league import, admin tooling, tests)
    // ------------------------------------------------------------------

    pub fn upsert_team(&self, team: &Team) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO teams (id, abbrev, name, owner_user_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                abbrev        = excluded.abbrev,
                name          = excluded.name,
                owner_user_id = excluded.owner_user_id",
            params![team.id.0, team.abbrev, team.name, team.owner_user_id],
        )?;
        Ok(())
    }

    pub fn upsert_player(&self, player: &Player) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO players (id, name, team_id, swar)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name    = excluded.name,
                team_id = excluded.team_id,
                swar    = excluded.swar",
            params![player.id.0, player.name, player.team_id.0, player.swar],
        )?;
        Ok(())
    }

    pub fn set_team_record(
        &self,
        season: u32,
        team: TeamId,
        record: TeamRecord,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO standings (season, team_id, wins, losses)
             VALUES (?1, ?2, ?3, ?4)",
            params![season, team.0, record.wins, record.losses],
        )?;
        Ok(())
    }

    /// Insert the full pick order for a season in one transaction.
    pub fn insert_draft_picks(&self, picks: &[DraftPick]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for pick in picks {
            tx.execute(
                "INSERT INTO draft_picks
                    (season, overall, round, position_in_round, owner_team_id, player_id, deadline, picked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    pick.season,
                    pick.overall,
                    pick.round,
                    pick.position_in_round,
                    pick.owner_team_id.0,
                    pick.player_id.map(|p| p.0),
                    pick.deadline.map(|d| d.to_rfc3339()),
                    pick.picked_at.map(|d| d.to_rfc3339()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace a team's want-list with `players`, ranked in slice order.
    pub fn set_want_list(&self, team: TeamId, players: &[PlayerId]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM want_lists WHERE team_id = ?1", params![team.0])?;
        for (rank, player) in players.iter().enumerate() {
            tx.execute(
                "INSERT INTO want_lists (team_id, rank, player_id) VALUES (?1, ?2, ?3)",
                params![team.0, rank as i64 + 1, player.0],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Synchronous query helpers
    // ------------------------------------------------------------------

    fn query_transactions(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Transaction>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, transaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_picks(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<DraftPick>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, pick_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

const TRANSACTION_COLUMNS: &str =
    "id, season, week, group_seq, player_id, from_team, to_team, status, frozen, cancelled, created_at";

const PICK_COLUMNS: &str =
    "season, overall, round, position_in_round, owner_team_id, player_id, deadline, picked_at";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let season: u32 = row.get(1)?;
    let week: u32 = row.get(2)?;
    let status_text: String = row.get(7)?;
    let status = status_text
        .parse::<TransactionStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    Ok(Transaction {
        id: TransactionId(row.get(0)?),
        move_group: MoveGroupId {
            season,
            week,
            seq: row.get(3)?,
        },
        season,
        week,
        player_id: PlayerId(row.get(4)?),
        from_team: TeamId(row.get(5)?),
        to_team: TeamId(row.get(6)?),
        status,
        frozen: row.get(8)?,
        cancelled: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
    })
}

fn pick_from_row(row: &Row<'_>) -> rusqlite::Result<DraftPick> {
    let player: Option<i64> = row.get(5)?;
    Ok(DraftPick {
        season: row.get(0)?,
        overall: row.get(1)?,
        round: row.get(2)?,
        position_in_round: row.get(3)?,
        owner_team_id: TeamId(row.get(4)?),
        player_id: player.map(PlayerId),
        deadline: optional_timestamp_column(row, 6)?,
        picked_at: optional_timestamp_column(row, 7)?,
    })
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: PlayerId(row.get(0)?),
        name: row.get(1)?,
        team_id: TeamId(row.get(2)?),
        swar: row.get(3)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text, idx)
}

fn optional_timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_timestamp(&t, idx)).transpose()
}

fn parse_timestamp(text: &str, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[async_trait]
impl ResourceStore for SqliteStore {
    async fn get_frozen_transactions(
        &self,
        season: u32,
        week: u32,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.query_transactions(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE season = ?1 AND week = ?2 AND status = 'frozen' AND frozen = 1
                 ORDER BY id"
            ),
            params![season, week],
        )
    }

    async fn list_transactions(
        &self,
        season: u32,
        week: u32,
    ) -> Result<Vec<Transaction>, StoreError> {
        self.query_transactions(
            &format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE season = ?1 AND week = ?2 ORDER BY id"
            ),
            params![season, week],
        )
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.query_transactions(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
            params![id.0],
        )?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::not_found("transaction", id))
    }

    async fn create_move_group(
        &self,
        season: u32,
        week: u32,
        status: TransactionStatus,
        moves: &[ProposedMove],
        created_at: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        if status.is_terminal() {
            return Err(StoreError::Rejected(format!(
                "cannot create transactions in terminal status {status}"
            )));
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let seq: u32 = tx.query_row(
            "SELECT COALESCE(MAX(group_seq), 0) + 1 FROM transactions WHERE season = ?1 AND week = ?2",
            params![season, week],
            |row| row.get(0),
        )?;
        let move_group = MoveGroupId { season, week, seq };
        let frozen = status == TransactionStatus::Frozen;

        let mut created = Vec::with_capacity(moves.len());
        for mv in moves {
            tx.execute(
                "INSERT INTO transactions
                    (season, week, group_seq, player_id, from_team, to_team, status, frozen, cancelled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
                params![
                    season,
                    week,
                    seq,
                    mv.player_id.0,
                    mv.from_team.0,
                    mv.to_team.0,
                    status.as_str(),
                    frozen,
                    created_at.to_rfc3339(),
                ],
            )?;
            created.push(Transaction {
                id: TransactionId(tx.last_insert_rowid()),
                move_group,
                season,
                week,
                player_id: mv.player_id,
                from_team: mv.from_team,
                to_team: mv.to_team,
                status,
                frozen,
                cancelled: false,
                created_at,
            });
        }
        tx.commit()?;
        Ok(created)
    }

    async fn set_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM transactions WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        let current: TransactionStatus = current
            .ok_or_else(|| StoreError::not_found("transaction", id))?
            .parse()?;
        current
            .transition(status)
            .map_err(|e| StoreError::Rejected(format!("{id}: {e}")))?;

        tx.execute(
            "UPDATE transactions SET status = ?2, frozen = ?3, cancelled = ?4 WHERE id = ?1",
            params![
                id.0,
                status.as_str(),
                status == TransactionStatus::Frozen,
                status == TransactionStatus::Cancelled,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn mark_awarded(&self, id: TransactionId) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE transactions SET frozen = 0 WHERE id = ?1 AND status = 'frozen'",
            params![id.0],
        )?;
        if updated == 0 {
            return Err(StoreError::Rejected(format!("{id} is not frozen")));
        }
        Ok(())
    }

    async fn get_player(&self, id: PlayerId) -> Result<Player, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, name, team_id, swar FROM players WHERE id = ?1",
                params![id.0],
                player_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("player", id))
    }

    async fn get_team(&self, id: TeamId) -> Result<Team, StoreError> {
        self.conn()
            .query_row(
                "SELECT id, abbrev, name, owner_user_id FROM teams WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Team {
                        id: TeamId(row.get(0)?),
                        abbrev: row.get(1)?,
                        name: row.get(2)?,
                        owner_user_id: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("team", id))
    }

    async fn get_roster(&self, team: TeamId) -> Result<Vec<Player>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, team_id, swar FROM players WHERE team_id = ?1 ORDER BY id",
        )?;
        let players = stmt
            .query_map(params![team.0], player_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    async fn apply_roster_mutation(
        &self,
        player: PlayerId,
        new_team: TeamId,
    ) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE players SET team_id = ?2 WHERE id = ?1",
            params![player.0, new_team.0],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("player", player));
        }
        Ok(())
    }

    async fn get_standings(&self, season: u32) -> Result<HashMap<TeamId, f64>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT team_id, wins, losses FROM standings WHERE season = ?1")?;
        let standings = stmt
            .query_map(params![season], |row| {
                let record = TeamRecord {
                    wins: row.get(1)?,
                    losses: row.get(2)?,
                };
                Ok((TeamId(row.get(0)?), record.win_fraction()))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(standings)
    }

    async fn get_draft_pick(
        &self,
        season: u32,
        overall: u32,
    ) -> Result<Option<DraftPick>, StoreError> {
        Ok(self
            .query_picks(
                &format!("SELECT {PICK_COLUMNS} FROM draft_picks WHERE season = ?1 AND overall = ?2"),
                params![season, overall],
            )?
            .into_iter()
            .next())
    }

    async fn get_draft_picks(&self, season: u32) -> Result<Vec<DraftPick>, StoreError> {
        self.query_picks(
            &format!("SELECT {PICK_COLUMNS} FROM draft_picks WHERE season = ?1 ORDER BY overall"),
            params![season],
        )
    }

    async fn set_draft_pick(
        &self,
        season: u32,
        overall: u32,
        player: PlayerId,
        picked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE draft_picks SET player_id = ?3, picked_at = ?4
             WHERE season = ?1 AND overall = ?2 AND player_id IS NULL",
            params![season, overall, player.0, picked_at.to_rfc3339()],
        )?;
        if updated == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM draft_picks WHERE season = ?1 AND overall = ?2)",
                params![season, overall],
                |row| row.get(0),
            )?;
            return Err(if exists {
                StoreError::Rejected(format!("pick {overall} is already filled"))
            } else {
                StoreError::not_found("draft pick", overall)
            });
        }
        Ok(())
    }

    async fn set_pick_deadline(
        &self,
        season: u32,
        overall: u32,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE draft_picks SET deadline = ?3 WHERE season = ?1 AND overall = ?2",
            params![season, overall, deadline.map(|d| d.to_rfc3339())],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("draft pick", overall));
        }
        Ok(())
    }

    async fn get_want_list(&self, team: TeamId) -> Result<Vec<PlayerId>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT player_id FROM want_lists WHERE team_id = ?1 ORDER BY rank")?;
        let players = stmt
            .query_map(params![team.0], |row| Ok(PlayerId(row.get(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    async fn load_state(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let text: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM league_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        match text {
            Some(json_str) => Ok(Some(serde_json::from_str(&json_str)?)),
            None => Ok(None),
        }
    }

    async fn save_state(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let json_str = serde_json::to_string(value)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO league_state (key, value) VALUES (?1, ?2)",
            params![key, json_str],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    const FA: TeamId = TeamId(99);

    /// Helper: create a fresh in-memory store with two teams and a free-agent pool.
    fn test_store() -> SqliteStore {
        let store = SqliteStore::open(":memory:").expect("in-memory database should open");
        for (id, abbrev) in [(1, "VOR"), (2, "MUD"), (99, "FA")] {
            store
                .upsert_team(&Team {
                    id: TeamId(id),
                    abbrev: abbrev.into(),
                    name: format!("{abbrev} club"),
                    owner_user_id: None,
                })
                .unwrap();
        }
        for (id, team, swar) in [(10, FA, 1.5), (11, TeamId(1), 2.0), (12, TeamId(2), 0.5)] {
            store
                .upsert_player(&Player {
                    id: PlayerId(id),
                    name: format!("Player {id}"),
                    team_id: team,
                    swar,
                })
                .unwrap();
        }
        store
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, hour, 0, 0).unwrap()
    }

    fn claim(player: i64, to: i64) -> ProposedMove {
        ProposedMove {
            player_id: PlayerId(player),
            from_team: FA,
            to_team: TeamId(to),
        }
    }

    #[tokio::test]
    async fn move_groups_get_sequential_ids_per_week() {
        let store = test_store();
        let first = store
            .create_move_group(12, 5, TransactionStatus::Frozen, &[claim(10, 1)], at(1))
            .await
            .unwrap();
        let second = store
            .create_move_group(12, 5, TransactionStatus::Frozen, &[claim(10, 2)], at(2))
            .await
            .unwrap();
        let other_week = store
            .create_move_group(12, 6, TransactionStatus::Pending, &[claim(10, 2)], at(3))
            .await
            .unwrap();

        assert_eq!(first[0].move_group.seq, 1);
        assert_eq!(second[0].move_group.seq, 2);
        assert_eq!(other_week[0].move_group.seq, 1);
        assert!(first[0].frozen);
        assert!(!other_week[0].frozen);
    }

    #[tokio::test]
    async fn frozen_query_excludes_awarded_and_other_weeks() {
        let store = test_store();
        let a = store
            .create_move_group(12, 5, TransactionStatus::Frozen, &[claim(10, 1)], at(1))
            .await
            .unwrap();
        store
            .create_move_group(12, 5, TransactionStatus::Frozen, &[claim(10, 2)], at(1))
            .await
            .unwrap();
        store
            .create_move_group(12, 6, TransactionStatus::Frozen, &[claim(10, 2)], at(1))
            .await
            .unwrap();

        store.mark_awarded(a[0].id).await.unwrap();

        let frozen = store.get_frozen_transactions(12, 5).await.unwrap();
        assert_eq!(frozen.len(), 1);
        assert_eq!(frozen[0].to_team, TeamId(2));

        let awarded = store.get_transaction(a[0].id).await.unwrap();
        assert!(awarded.is_awarded());
    }

    #[tokio::test]
    async fn status_updates_follow_the_lifecycle() {
        let store = test_store();
        let txns = store
            .create_move_group(12, 5, TransactionStatus::Pending, &[claim(10, 1)], at(1))
            .await
            .unwrap();
        let id = txns[0].id;

        store
            .set_transaction_status(id, TransactionStatus::Frozen)
            .await
            .unwrap();
        store
            .set_transaction_status(id, TransactionStatus::Cancelled)
            .await
            .unwrap();

        let txn = store.get_transaction(id).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Cancelled);
        assert!(txn.cancelled);
        assert!(!txn.frozen);

        let err = store
            .set_transaction_status(id, TransactionStatus::Processed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn roster_mutation_moves_player() {
        let store = test_store();
        store
            .apply_roster_mutation(PlayerId(10), TeamId(1))
            .await
            .unwrap();
        let roster = store.get_roster(TeamId(1)).await.unwrap();
        let ids: Vec<PlayerId> = roster.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![PlayerId(10), PlayerId(11)]);

        let err = store
            .apply_roster_mutation(PlayerId(404), TeamId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn draft_pick_is_filled_once() {
        let store = test_store();
        store
            .insert_draft_picks(&[DraftPick {
                season: 12,
                overall: 1,
                round: 1,
                position_in_round: 1,
                owner_team_id: TeamId(1),
                player_id: None,
                deadline: None,
                picked_at: None,
            }])
            .unwrap();

        store
            .set_draft_pick(12, 1, PlayerId(10), at(4))
            .await
            .unwrap();
        let pick = store.get_draft_pick(12, 1).await.unwrap().unwrap();
        assert_eq!(pick.player_id, Some(PlayerId(10)));
        assert_eq!(pick.picked_at, Some(at(4)));

        let again = store.set_draft_pick(12, 1, PlayerId(12), at(5)).await;
        assert!(matches!(again, Err(StoreError::Rejected(_))));

        let missing = store.set_draft_pick(12, 2, PlayerId(12), at(5)).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn want_list_keeps_rank_order() {
        let store = test_store();
        store
            .set_want_list(TeamId(1), &[PlayerId(12), PlayerId(10)])
            .unwrap();
        assert_eq!(
            store.get_want_list(TeamId(1)).await.unwrap(),
            vec![PlayerId(12), PlayerId(10)]
        );

        store.set_want_list(TeamId(1), &[PlayerId(10)]).unwrap();
        assert_eq!(
            store.get_want_list(TeamId(1)).await.unwrap(),
            vec![PlayerId(10)]
        );
    }

    #[tokio::test]
    async fn standings_report_win_fraction() {
        let store = test_store();
        store
            .set_team_record(12, TeamId(1), TeamRecord { wins: 3, losses: 7 })
            .unwrap();
        store
            .set_team_record(12, TeamId(2), TeamRecord { wins: 0, losses: 0 })
            .unwrap();

        let standings = store.get_standings(12).await.unwrap();
        assert!((standings[&TeamId(1)] - 0.3).abs() < f64::EPSILON);
        assert_eq!(standings[&TeamId(2)], 0.0);
    }

    #[tokio::test]
    async fn state_round_trip_and_overwrite() {
        let store = test_store();
        assert!(store.load_state("scheduler").await.unwrap().is_none());

        store
            .save_state("scheduler", &json!({"week": 4}))
            .await
            .unwrap();
        store
            .save_state("scheduler", &json!({"week": 5}))
            .await
            .unwrap();

        assert_eq!(
            store.load_state("scheduler").await.unwrap(),
            Some(json!({"week": 5}))
        );
    }
}
