// Weekly transaction window scheduler.
//
// A low-frequency poll compares the clock against the two weekly boundaries.
// Each occurrence fires at most once: the occurrence last handled for each
// kind is persisted together with the current week, and every occurrence newer
// than the recorded one fires, oldest first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{ChannelsConfig, LeagueConfig, ScheduleConfig};
use crate::league::{PlayerId, TeamId};
use crate::notify::{self, Notifier};
use crate::schedule::window::BoundaryKind;
use crate::store::{self, ResourceStore, StoreError};
use crate::transactions::executor::{ExecutionReport, MutationExecutor};
use crate::transactions::model::{Transaction, TransactionStatus};
use crate::transactions::resolver::{self, Cancellation, Resolution};
use crate::transactions::submit::SubmissionWindow;

pub const SCHEDULER_STATE_KEY: &str = "scheduler_state";

/// Persisted scheduler position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub season: u32,
    pub week: u32,
    pub last_open: Option<DateTime<Utc>>,
    pub last_close: Option<DateTime<Utc>>,
}

impl SchedulerState {
    /// The window is open when the most recent boundary handled was an open.
    pub fn window_is_open(&self) -> bool {
        match (self.last_open, self.last_close) {
            (Some(open), Some(close)) => open > close,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    OffSeason,
    /// First run: boundaries recorded, nothing fired.
    Seeded(SchedulerState),
    Fired(Vec<BoundaryKind>),
}

/// Summary of one window-open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenSummary {
    pub week: u32,
    pub execution: ExecutionReport,
    pub frozen: usize,
}

pub struct WindowScheduler {
    store: Arc<dyn ResourceStore>,
    notifier: Arc<dyn Notifier>,
    executor: MutationExecutor,
    league: LeagueConfig,
    schedule: ScheduleConfig,
    channels: ChannelsConfig,
    rng: Mutex<StdRng>,
}

impl WindowScheduler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        notifier: Arc<dyn Notifier>,
        executor: MutationExecutor,
        league: LeagueConfig,
        schedule: ScheduleConfig,
        channels: ChannelsConfig,
    ) -> Self {
        Self::with_rng(
            store,
            notifier,
            executor,
            league,
            schedule,
            channels,
            StdRng::from_entropy(),
        )
    }

    /// Same as `new` with a caller-provided generator for the tiebreak draws.
    pub fn with_rng(
        store: Arc<dyn ResourceStore>,
        notifier: Arc<dyn Notifier>,
        executor: MutationExecutor,
        league: LeagueConfig,
        schedule: ScheduleConfig,
        channels: ChannelsConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            store,
            notifier,
            executor,
            league,
            schedule,
            channels,
            rng: Mutex::new(rng),
        }
    }

    pub async fn state(&self) -> Result<Option<SchedulerState>, StoreError> {
        store::load_record(self.store.as_ref(), SCHEDULER_STATE_KEY).await
    }

    /// Where a move set submitted right now would land.
    pub async fn submission_window(&self) -> Result<SubmissionWindow, StoreError> {
        let state = self.state().await?;
        Ok(SubmissionWindow {
            season: self.league.season,
            current_week: state.as_ref().map_or(0, |s| s.week),
            window_open: state.as_ref().is_some_and(SchedulerState::window_is_open),
            off_season: self.league.off_season,
        })
    }

    /// Poll forever at the configured interval until `shutdown` flips to
    /// `true`. A failed tick is logged and retried on the next one.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.schedule.poll_interval,
            "transaction window scheduler started"
        );
        let mut ticker = tokio::time::interval(self.schedule.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_at(Utc::now()).await {
                        error!("scheduler tick failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("transaction window scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Evaluate both boundaries against `now` and fire whichever are due.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<TickOutcome, StoreError> {
        if self.league.off_season {
            debug!("off-season, scheduler tick skipped");
            return Ok(TickOutcome::OffSeason);
        }

        let offset = self.schedule.utc_offset;
        let open_at = self.schedule.window_open.latest_at_or_before(now, offset);
        let close_at = self.schedule.window_close.latest_at_or_before(now, offset);

        let Some(mut state) = self.state().await? else {
            let state = SchedulerState {
                season: self.league.season,
                week: if open_at > close_at { 1 } else { 0 },
                last_open: Some(open_at),
                last_close: Some(close_at),
            };
            store::save_record(self.store.as_ref(), SCHEDULER_STATE_KEY, &state).await?;
            info!(
                season = state.season,
                week = state.week,
                window_open = state.window_is_open(),
                "scheduler state initialized"
            );
            return Ok(TickOutcome::Seeded(state));
        };

        if state.season != self.league.season {
            info!(
                from = state.season,
                to = self.league.season,
                "new season, week counter reset"
            );
            state.season = self.league.season;
            state.week = 0;
            store::save_record(self.store.as_ref(), SCHEDULER_STATE_KEY, &state).await?;
        }

        // After an outage every missed boundary is replayed in order so the
        // week counter stays in step with the calendar.
        let mut due: Vec<(DateTime<Utc>, BoundaryKind)> = self
            .schedule
            .window_open
            .occurrences_since(state.last_open, now, offset)
            .into_iter()
            .map(|at| (at, BoundaryKind::Open))
            .chain(
                self.schedule
                    .window_close
                    .occurrences_since(state.last_close, now, offset)
                    .into_iter()
                    .map(|at| (at, BoundaryKind::Close)),
            )
            .collect();
        due.sort_by_key(|(at, _)| *at);
        let missed_opens = due.iter().filter(|(_, k)| *k == BoundaryKind::Open).count();
        if missed_opens > 1 {
            warn!(
                week = state.week,
                missed_opens,
                "scheduler fell behind by several weeks, replaying missed boundaries"
            );
        }

        let mut fired = Vec::with_capacity(due.len());
        for (at, kind) in due {
            match kind {
                BoundaryKind::Open => {
                    self.open_window(&mut state).await?;
                    state.last_open = Some(at);
                }
                BoundaryKind::Close => {
                    self.close_window(&state).await?;
                    state.last_close = Some(at);
                }
            }
            store::save_record(self.store.as_ref(), SCHEDULER_STATE_KEY, &state).await?;
            fired.push(kind);
        }
        Ok(TickOutcome::Fired(fired))
    }

    // ------------------------------------------------------------------
    // Window-open
    // ------------------------------------------------------------------

    /// Advance the week, apply last window's awards and freeze the moves
    /// queued for the new window.
    pub async fn open_window(&self, state: &mut SchedulerState) -> Result<OpenSummary, StoreError> {
        let closed_week = state.week;
        state.week += 1;
        info!(season = state.season, week = state.week, "transaction window opening");

        let awarded: Vec<Transaction> = self
            .store
            .list_transactions(state.season, closed_week)
            .await?
            .into_iter()
            .filter(Transaction::is_awarded)
            .collect();
        let execution = self.executor.execute(&awarded).await;

        let mut frozen = 0;
        for txn in self.store.list_transactions(state.season, state.week).await? {
            if txn.status == TransactionStatus::Pending {
                self.store
                    .set_transaction_status(txn.id, TransactionStatus::Frozen)
                    .await?;
                frozen += 1;
            }
        }

        let (ok, failed, total) = execution.counts();
        let mut message = format!(
            "Week {} transaction window is open. {frozen} queued move(s) entered this window.",
            state.week
        );
        if total > 0 {
            message.push_str(&format!(
                " Week {closed_week} moves applied: {ok}/{total}."
            ));
            if failed > 0 {
                message.push_str(&format!(" {failed} pending league review."));
            }
        }
        notify::announce(self.notifier.as_ref(), &self.channels.announcements, &message).await;

        Ok(OpenSummary {
            week: state.week,
            execution,
            frozen,
        })
    }

    // ------------------------------------------------------------------
    // Window-close
    // ------------------------------------------------------------------

    /// Resolve the week's frozen claims. Winners are awarded for execution at
    /// the next open; losers are cancelled. Rosters are not touched.
    pub async fn close_window(&self, state: &SchedulerState) -> Result<Resolution, StoreError> {
        info!(season = state.season, week = state.week, "transaction window closing");
        let frozen = self
            .store
            .get_frozen_transactions(state.season, state.week)
            .await?;

        // Players already awarded in this window (a previous close attempt
        // that failed part way) keep their winner.
        let already_awarded: HashMap<PlayerId, TeamId> = self
            .store
            .list_transactions(state.season, state.week)
            .await?
            .into_iter()
            .filter(Transaction::is_awarded)
            .map(|t| (t.player_id, t.to_team))
            .collect();

        let mut resolution = Resolution::default();
        let mut open_claims = Vec::new();
        for txn in frozen {
            match already_awarded.get(&txn.player_id) {
                Some(&winner) => resolution.cancelled.push(Cancellation {
                    transaction: txn,
                    winner,
                }),
                None => open_claims.push(txn),
            }
        }

        let standings = self.store.get_standings(state.season).await?;
        let fresh = {
            let mut rng = self.rng.lock().expect("scheduler rng mutex poisoned");
            resolver::resolve(&open_claims, &standings, &mut *rng)
        };
        resolution.processed.extend(fresh.processed);
        resolution.cancelled.extend(fresh.cancelled);
        resolution.contests.extend(fresh.contests);

        for txn in &resolution.processed {
            self.store.mark_awarded(txn.id).await?;
        }
        for cancellation in &resolution.cancelled {
            self.store
                .set_transaction_status(cancellation.transaction.id, TransactionStatus::Cancelled)
                .await?;
        }

        info!(
            week = state.week,
            awarded = resolution.processed.len(),
            cancelled = resolution.cancelled.len(),
            contested = resolution.contests.len(),
            "transaction window closed"
        );

        self.announce_resolution(state.week, &resolution).await;
        Ok(resolution)
    }

    async fn announce_resolution(&self, week: u32, resolution: &Resolution) {
        let mut message = format!(
            "Week {week} transaction window is closed. {} move(s) approved, {} cancelled.",
            resolution.processed.len(),
            resolution.cancelled.len()
        );
        for contest in &resolution.contests {
            message.push_str(&format!(
                "\n- {} awarded to {} over {} other claim(s)",
                store::player_label(self.store.as_ref(), contest.player_id).await,
                store::team_label(self.store.as_ref(), contest.winner).await,
                contest.ranking.len() - 1
            ));
        }
        notify::announce(self.notifier.as_ref(), &self.channels.announcements, &message).await;

        for cancellation in &resolution.cancelled {
            let txn = &cancellation.transaction;
            let owner = match self.store.get_team(txn.to_team).await {
                Ok(team) => team.owner_user_id,
                Err(e) => {
                    warn!(team = %txn.to_team, "could not look up team owner: {e}");
                    None
                }
            };
            let Some(owner) = owner else { continue };
            let dm = format!(
                "Your claim on {} ({}) was not approved: {} had priority.",
                store::player_label(self.store.as_ref(), txn.player_id).await,
                txn.move_group,
                store::team_label(self.store.as_ref(), cancellation.winner).await
            );
            notify::direct_message(self.notifier.as_ref(), &owner, &dm).await;
        }
    }
}
