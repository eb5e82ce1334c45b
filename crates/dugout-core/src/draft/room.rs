// Draft room: every pick mutation goes through here.
//
// Manual picks, makeup picks, timer controls and the clock's auto-draft all
// run while holding the draft lock. The clock state record is only written
// under that lock. Announcements made under the lock are queued in an
// `Outbox` and delivered after the guard is dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::config::{ChannelsConfig, DraftConfig, ExecutorConfig, LeagueConfig};
use crate::draft::autodraft::{self, CapRule, Ineligible};
use crate::draft::clock::{DraftClockState, Warning, WarningsSent, DRAFT_CLOCK_KEY};
use crate::draft::lock::{DraftLock, LockBusy, LockHolder};
use crate::draft::pick::DraftPick;
use crate::league::{Actor, Player, PlayerId, TeamId};
use crate::notify::{Notifier, Outbox};
use crate::store::{self, ResourceStore, StoreError};
use crate::transactions::executor::retry_transient;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error(transparent)]
    Busy(#[from] LockBusy),

    #[error(transparent)]
    Ineligible(#[from] Ineligible),

    #[error("{team} is not on the clock (pick #{current}) and has no skipped pick to make up")]
    NotOnTheClock { team: TeamId, current: u32 },

    #[error("pick #{0} does not exist")]
    NoSuchPick(u32),

    #[error("pick #{0} is already filled")]
    PickFilled(u32),

    #[error("the draft is complete")]
    DraftComplete,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a manual pick.
#[derive(Debug, Clone, PartialEq)]
pub struct PickOutcome {
    pub overall: u32,
    pub player_id: PlayerId,
    /// Filled a skipped pick; the clock did not move.
    pub makeup: bool,
    /// Pick on the clock afterwards.
    pub current_overall: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoDraftOutcome {
    Drafted(PlayerId),
    /// No want-list candidate passed; the pick stays open as a skipped pick.
    Skipped,
    /// The pick was filled before the lock was taken.
    AlreadyFilled,
}

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockStatus {
    pub clock: DraftClockState,
    pub current_pick: Option<DraftPick>,
    pub remaining_secs: Option<i64>,
    pub skipped: Vec<DraftPick>,
    pub lock_holder: Option<LockHolder>,
}

pub struct DraftRoom {
    store: Arc<dyn ResourceStore>,
    notifier: Arc<dyn Notifier>,
    lock: DraftLock,
    config: DraftConfig,
    retry: ExecutorConfig,
    cap: CapRule,
    season: u32,
    free_agent_team: TeamId,
    channels: ChannelsConfig,
    wake: Arc<Notify>,
}

impl DraftRoom {
    /// `retry` governs roster updates made by a pick, the same policy the
    /// transaction executor uses.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        notifier: Arc<dyn Notifier>,
        league: &LeagueConfig,
        config: DraftConfig,
        retry: ExecutorConfig,
        channels: ChannelsConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            lock: DraftLock::new(config.stale_lock_timeout()),
            cap: CapRule::from_config(&config),
            config,
            retry,
            season: league.season,
            free_agent_team: league.free_agent_team,
            channels,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &DraftConfig {
        &self.config
    }

    pub fn lock(&self) -> &DraftLock {
        &self.lock
    }

    /// Signals the clock loop to re-evaluate immediately.
    pub fn wake_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub async fn load_clock(&self) -> Result<DraftClockState, StoreError> {
        let stored: Option<DraftClockState> =
            store::load_record(self.store.as_ref(), DRAFT_CLOCK_KEY).await?;
        Ok(match stored {
            Some(state) if state.season == self.season => state,
            _ => DraftClockState::new(self.season),
        })
    }

    pub async fn save_clock(&self, state: &DraftClockState) -> Result<(), StoreError> {
        store::save_record(self.store.as_ref(), DRAFT_CLOCK_KEY, state).await
    }

    /// Send everything queued while the lock was held. Call only after the
    /// guard is gone.
    pub(crate) async fn deliver(&self, outbox: Outbox) {
        outbox.deliver(self.notifier.as_ref()).await;
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Make a pick for `team`. Fills the current pick if the team is on the
    /// clock, otherwise the team's earliest skipped pick as a makeup.
    pub async fn submit_pick(
        &self,
        actor: Actor,
        team: TeamId,
        player_id: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<PickOutcome, DraftError> {
        let mut outbox = Outbox::default();
        let result = self
            .submit_pick_locked(actor, team, player_id, now, &mut outbox)
            .await;
        self.deliver(outbox).await;
        result
    }

    async fn submit_pick_locked(
        &self,
        actor: Actor,
        team: TeamId,
        player_id: PlayerId,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<PickOutcome, DraftError> {
        let _guard = self.lock.try_acquire(actor.clone(), now)?;
        let mut state = self.load_clock().await?;

        let player = self.store.get_player(player_id).await?;
        autodraft::check_eligibility(
            self.store.as_ref(),
            team,
            &player,
            self.free_agent_team,
            &self.cap,
        )
        .await??;

        let current = self
            .store
            .get_draft_pick(self.season, state.current_overall)
            .await?;
        if let Some(pick) = current.filter(|p| p.owner_team_id == team && !p.is_filled()) {
            self.fill_pick(&pick, &player, &actor, false, now, outbox)
                .await?;
            self.advance(&mut state, now, outbox).await?;
            self.save_clock(&state).await?;
            self.wake.notify_one();
            return Ok(PickOutcome {
                overall: pick.overall,
                player_id,
                makeup: false,
                current_overall: state.current_overall,
            });
        }

        let makeup = self
            .store
            .get_draft_picks(self.season)
            .await?
            .into_iter()
            .find(|p| p.owner_team_id == team && p.is_skipped(state.current_overall));
        match makeup {
            Some(pick) => {
                self.fill_pick(&pick, &player, &actor, true, now, outbox)
                    .await?;
                Ok(PickOutcome {
                    overall: pick.overall,
                    player_id,
                    makeup: true,
                    current_overall: state.current_overall,
                })
            }
            None => Err(DraftError::NotOnTheClock {
                team,
                current: state.current_overall,
            }),
        }
    }

    /// Turn the pick timer on and start the clock on the current pick.
    pub async fn enable_timer(
        &self,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<DraftClockState, DraftError> {
        let mut outbox = Outbox::default();
        let result = self.enable_timer_locked(actor, now, &mut outbox).await;
        self.deliver(outbox).await;
        result
    }

    async fn enable_timer_locked(
        &self,
        actor: Actor,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<DraftClockState, DraftError> {
        let _guard = self.lock.try_acquire(actor.clone(), now)?;
        let mut state = self.load_clock().await?;
        let pick = self
            .store
            .get_draft_pick(self.season, state.current_overall)
            .await?
            .ok_or(DraftError::DraftComplete)?;

        state.timer_enabled = true;
        if pick.is_filled() {
            self.advance(&mut state, now, outbox).await?;
        } else {
            self.start_current_pick(&mut state, now, outbox).await?;
        }
        self.save_clock(&state).await?;
        info!(%actor, overall = state.current_overall, "draft timer enabled");
        self.wake.notify_one();
        Ok(state)
    }

    /// Turn the pick timer off; the clock loop parks.
    pub async fn disable_timer(
        &self,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<DraftClockState, DraftError> {
        let state = {
            let _guard = self.lock.try_acquire(actor.clone(), now)?;
            let mut state = self.load_clock().await?;
            state.timer_enabled = false;
            state.deadline = None;
            if self
                .store
                .get_draft_pick(self.season, state.current_overall)
                .await?
                .is_some()
            {
                self.store
                    .set_pick_deadline(self.season, state.current_overall, None)
                    .await?;
            }
            self.save_clock(&state).await?;
            state
        };
        info!(%actor, "draft timer disabled");
        let mut outbox = Outbox::default();
        outbox.post(&self.channels.draft, "The draft timer is paused.");
        self.deliver(outbox).await;
        self.wake.notify_one();
        Ok(state)
    }

    /// Move the clock to `overall`. Picks passed over stay open as skipped.
    pub async fn set_current_pick(
        &self,
        actor: Actor,
        overall: u32,
        now: DateTime<Utc>,
    ) -> Result<DraftClockState, DraftError> {
        let mut outbox = Outbox::default();
        let result = self
            .set_current_pick_locked(actor, overall, now, &mut outbox)
            .await;
        self.deliver(outbox).await;
        result
    }

    async fn set_current_pick_locked(
        &self,
        actor: Actor,
        overall: u32,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<DraftClockState, DraftError> {
        let _guard = self.lock.try_acquire(actor.clone(), now)?;
        let pick = self
            .store
            .get_draft_pick(self.season, overall)
            .await?
            .ok_or(DraftError::NoSuchPick(overall))?;
        if pick.is_filled() {
            return Err(DraftError::PickFilled(overall));
        }

        let mut state = self.load_clock().await?;
        if state.current_overall != overall && state.deadline.take().is_some() {
            self.store
                .set_pick_deadline(self.season, state.current_overall, None)
                .await?;
        }
        state.current_overall = overall;
        state.warnings = WarningsSent::default();
        if state.timer_enabled {
            self.start_current_pick(&mut state, now, outbox).await?;
        } else {
            state.deadline = None;
            self.announce_on_clock(&pick, None, outbox).await;
        }
        self.save_clock(&state).await?;
        info!(%actor, overall, "current pick set");
        self.wake.notify_one();
        Ok(state)
    }

    pub async fn status(&self, now: DateTime<Utc>) -> Result<ClockStatus, DraftError> {
        let clock = self.load_clock().await?;
        let picks = self.store.get_draft_picks(self.season).await?;
        let current_pick = picks
            .iter()
            .find(|p| p.overall == clock.current_overall)
            .cloned();
        let skipped = picks
            .into_iter()
            .filter(|p| p.is_skipped(clock.current_overall))
            .collect();
        Ok(ClockStatus {
            remaining_secs: clock.remaining(now).map(|d| d.num_seconds()),
            clock,
            current_pick,
            skipped,
            lock_holder: self.lock.holder(),
        })
    }

    // ------------------------------------------------------------------
    // Clock hooks (caller holds the lock)
    // ------------------------------------------------------------------

    /// Start the countdown on the current pick.
    pub(crate) async fn start_current_pick(
        &self,
        state: &mut DraftClockState,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<(), DraftError> {
        let pick = self
            .store
            .get_draft_pick(self.season, state.current_overall)
            .await?
            .ok_or(DraftError::NoSuchPick(state.current_overall))?;
        let deadline = now + self.config.pick_duration();
        state.deadline = Some(deadline);
        state.warnings = WarningsSent::default();
        self.store
            .set_pick_deadline(self.season, pick.overall, Some(deadline))
            .await?;
        self.announce_on_clock(&pick, Some(deadline), outbox).await;
        Ok(())
    }

    /// Fill the expired current pick from the owner's want-list, then
    /// advance whether or not anyone was drafted.
    pub(crate) async fn auto_draft(
        &self,
        state: &mut DraftClockState,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<AutoDraftOutcome, DraftError> {
        let pick = self
            .store
            .get_draft_pick(self.season, state.current_overall)
            .await?
            .ok_or(DraftError::NoSuchPick(state.current_overall))?;

        if pick.is_filled() {
            info!(overall = pick.overall, "pick was filled before auto-draft ran");
            self.advance(state, now, outbox).await?;
            return Ok(AutoDraftOutcome::AlreadyFilled);
        }

        let candidate = autodraft::select_candidate(
            self.store.as_ref(),
            pick.owner_team_id,
            self.free_agent_team,
            &self.cap,
        )
        .await?;

        let outcome = match candidate {
            Some(player) => {
                self.fill_pick(&pick, &player, &Actor::System, false, now, outbox)
                    .await?;
                AutoDraftOutcome::Drafted(player.id)
            }
            None => {
                warn!(
                    overall = pick.overall,
                    team = %pick.owner_team_id,
                    "no eligible want-list candidate, pick skipped"
                );
                let team = store::team_label(self.store.as_ref(), pick.owner_team_id).await;
                outbox.post(
                    &self.channels.draft,
                    format!(
                        "Pick #{} ({team}) expired with no eligible auto-draft candidate and is skipped. It can be made up later.",
                        pick.overall
                    ),
                );
                AutoDraftOutcome::Skipped
            }
        };
        self.advance(state, now, outbox).await?;
        Ok(outcome)
    }

    pub(crate) async fn post_warning(
        &self,
        state: &DraftClockState,
        warning: Warning,
        remaining: chrono::Duration,
        outbox: &mut Outbox,
    ) {
        let owner = match self
            .store
            .get_draft_pick(self.season, state.current_overall)
            .await
        {
            Ok(Some(pick)) => store::team_label(self.store.as_ref(), pick.owner_team_id).await,
            _ => "the team on the clock".to_string(),
        };
        let label = match warning {
            Warning::First => "",
            Warning::Final => "Final warning: ",
        };
        outbox.post(
            &self.channels.draft,
            format!(
                "{label}{}s left on pick #{} for {owner}.",
                remaining.num_seconds().max(0),
                state.current_overall
            ),
        );
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Move the player onto the drafting team, then record the pick. A player
    /// still in the free-agent pool never sits on a filled pick.
    async fn fill_pick(
        &self,
        pick: &DraftPick,
        player: &Player,
        actor: &Actor,
        makeup: bool,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<(), DraftError> {
        let team = store::team_label(self.store.as_ref(), pick.owner_team_id).await;

        let (moved, attempts) = retry_transient(&self.retry, || {
            self.store
                .apply_roster_mutation(player.id, pick.owner_team_id)
        })
        .await;
        if let Err(e) = moved {
            error!(
                overall = pick.overall,
                player = %player.id,
                attempts,
                "roster update failed, pick not recorded: {e}"
            );
            outbox.post(
                &self.channels.operator,
                format!(
                    "Pick #{} of {} for {team} was not recorded: the roster update failed after {attempts} attempt(s): {e}",
                    pick.overall, player.name
                ),
            );
            return Err(e.into());
        }

        if let Err(e) = self
            .store
            .set_draft_pick(self.season, pick.overall, player.id, now)
            .await
        {
            error!(
                overall = pick.overall,
                player = %player.id,
                "player moved but pick not recorded: {e}"
            );
            outbox.post(
                &self.channels.operator,
                format!(
                    "{} was moved to {team} but pick #{} could not be recorded: {e}",
                    player.name, pick.overall
                ),
            );
            return Err(e.into());
        }

        info!(
            overall = pick.overall,
            team = %pick.owner_team_id,
            player = %player.id,
            %actor,
            makeup,
            "pick made"
        );
        let suffix = match (actor, makeup) {
            (_, true) => " (makeup pick)",
            (Actor::System, false) => " (auto-draft)",
            _ => "",
        };
        outbox.post(
            &self.channels.draft,
            format!(
                "Round {}, pick {} (#{}): {team} selects {} ({:.2} sWAR){suffix}",
                pick.round, pick.position_in_round, pick.overall, player.name, player.swar
            ),
        );
        Ok(())
    }

    /// Move to the next unfilled pick after the current one. Past the last
    /// pick the draft is complete and the timer switches itself off.
    async fn advance(
        &self,
        state: &mut DraftClockState,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<(), DraftError> {
        let picks = self.store.get_draft_picks(self.season).await?;
        state.warnings = WarningsSent::default();
        state.deadline = None;

        let next = picks
            .iter()
            .find(|p| p.overall > state.current_overall && !p.is_filled())
            .cloned();
        match next {
            Some(pick) => {
                state.current_overall = pick.overall;
                if state.timer_enabled {
                    self.start_current_pick(state, now, outbox).await?;
                } else {
                    self.announce_on_clock(&pick, None, outbox).await;
                }
            }
            None => {
                state.current_overall = picks
                    .last()
                    .map_or(state.current_overall + 1, |p| p.overall + 1)
                    .max(state.current_overall + 1);
                state.timer_enabled = false;
                info!(season = self.season, "draft complete");
                outbox.post(&self.channels.draft, "The draft is complete.");
            }
        }
        Ok(())
    }

    async fn announce_on_clock(
        &self,
        pick: &DraftPick,
        deadline: Option<DateTime<Utc>>,
        outbox: &mut Outbox,
    ) {
        let team = match self.store.get_team(pick.owner_team_id).await {
            Ok(team) => team,
            Err(e) => {
                warn!(team = %pick.owner_team_id, "could not look up team on the clock: {e}");
                return;
            }
        };
        let when = deadline
            .map(|d| format!(" Deadline: {} UTC.", d.format("%a %H:%M:%S")))
            .unwrap_or_default();
        outbox.post(
            &self.channels.draft,
            format!(
                "{} is on the clock with pick #{} (round {}, pick {}).{when}",
                team.abbrev, pick.overall, pick.round, pick.position_in_round
            ),
        );
        if let Some(owner) = &team.owner_user_id {
            outbox.direct(
                owner,
                format!("You're on the clock with pick #{}.{when}", pick.overall),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock, Weak};

    use async_trait::async_trait;

    use crate::draft::clock::{ClockEvent, DraftClock};
    use crate::notify::testing::{RecordingNotifier, Sent};
    use crate::test_support::{draft_room, draft_room_on, draft_store, t0, FlakyStore};

    fn commish() -> Actor {
        Actor::user("commish")
    }

    #[tokio::test]
    async fn manual_pick_fills_and_advances() {
        let (store, room, notifier) = draft_room();
        room.enable_timer(commish(), t0()).await.unwrap();

        let outcome = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(102), t0())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PickOutcome {
                overall: 1,
                player_id: PlayerId(102),
                makeup: false,
                current_overall: 2,
            }
        );
        assert_eq!(store.get_player(PlayerId(102)).await.unwrap().team_id, TeamId(1));
        assert!(room.lock().holder().is_none());

        let state = room.load_clock().await.unwrap();
        assert_eq!(state.deadline, Some(t0() + chrono::Duration::minutes(8)));

        // Next owner hears about it.
        assert!(notifier
            .messages()
            .iter()
            .any(|s| matches!(s, Sent::Direct { user_id, message } if user_id == "u2" && message.contains("#2"))));
    }

    #[tokio::test]
    async fn out_of_turn_pick_is_rejected() {
        let (store, room, _notifier) = draft_room();
        let err = room
            .submit_pick(Actor::user("u2"), TeamId(2), PlayerId(104), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::NotOnTheClock { team: TeamId(2), current: 1 }));
        assert!(store.get_draft_pick(12, 1).await.unwrap().unwrap().player_id.is_none());
        assert!(room.lock().holder().is_none());
    }

    #[tokio::test]
    async fn ineligible_player_is_rejected() {
        let (_store, room, _notifier) = draft_room();
        let err = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(201), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::Ineligible(Ineligible::NotFreeAgent { .. })));
    }

    #[tokio::test]
    async fn held_lock_rejects_with_retry_hint() {
        let (_store, room, _notifier) = draft_room();
        let _held = room.lock().try_acquire(Actor::System, t0()).unwrap();
        let err = room
            .submit_pick(
                Actor::user("u1"),
                TeamId(1),
                PlayerId(101),
                t0() + chrono::Duration::seconds(12),
            )
            .await
            .unwrap_err();
        match err {
            DraftError::Busy(busy) => {
                assert_eq!(busy.held_by, Actor::System);
                assert_eq!(busy.retry_in_secs, 18);
            }
            other => panic!("expected Busy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn makeup_pick_leaves_the_clock_alone() {
        let (store, room, _notifier) = draft_room();
        room.set_current_pick(commish(), 3, t0()).await.unwrap();

        let outcome = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        assert!(outcome.makeup);
        assert_eq!(outcome.overall, 1);
        assert_eq!(outcome.current_overall, 3);
        assert_eq!(room.load_clock().await.unwrap().current_overall, 3);
        assert_eq!(
            store.get_draft_pick(12, 1).await.unwrap().unwrap().player_id,
            Some(PlayerId(101))
        );
    }

    #[tokio::test]
    async fn advance_skips_filled_picks() {
        let (_store, room, _notifier) = draft_room();
        room.set_current_pick(commish(), 4, t0()).await.unwrap();
        // Team 2 makes up pick 2, then the commissioner rewinds to pick 1.
        let makeup = room
            .submit_pick(Actor::user("u2"), TeamId(2), PlayerId(104), t0())
            .await
            .unwrap();
        assert_eq!(makeup.overall, 2);
        room.set_current_pick(commish(), 1, t0()).await.unwrap();

        let outcome = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        assert_eq!(outcome.current_overall, 3);
    }

    #[tokio::test]
    async fn set_current_pick_rejects_filled_and_unknown() {
        let (_store, room, _notifier) = draft_room();
        room.submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        assert!(matches!(
            room.set_current_pick(commish(), 1, t0()).await,
            Err(DraftError::PickFilled(1))
        ));
        assert!(matches!(
            room.set_current_pick(commish(), 99, t0()).await,
            Err(DraftError::NoSuchPick(99))
        ));
    }

    #[tokio::test]
    async fn auto_draft_skips_when_no_candidate_passes() {
        let (store, room, notifier) = draft_room();
        room.set_current_pick(commish(), 2, t0()).await.unwrap();
        let mut state = room.load_clock().await.unwrap();

        // Team 2's only want-list entry is already rostered.
        let mut outbox = Outbox::default();
        let outcome = room.auto_draft(&mut state, t0(), &mut outbox).await.unwrap();
        room.deliver(outbox).await;
        assert_eq!(outcome, AutoDraftOutcome::Skipped);
        assert_eq!(state.current_overall, 3);
        let pick = store.get_draft_pick(12, 2).await.unwrap().unwrap();
        assert!(pick.is_skipped(state.current_overall));
        assert!(notifier
            .channel_messages("draft")
            .iter()
            .any(|m| m.contains("is skipped")));
    }

    #[tokio::test]
    async fn last_pick_completes_the_draft_and_stops_the_timer() {
        let (_store, room, notifier) = draft_room();
        room.set_current_pick(commish(), 4, t0()).await.unwrap();
        room.enable_timer(commish(), t0()).await.unwrap();

        room.submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        let state = room.load_clock().await.unwrap();
        assert!(!state.timer_enabled);
        assert_eq!(state.deadline, None);
        assert_eq!(state.current_overall, 5);
        assert!(notifier
            .channel_messages("draft")
            .contains(&"The draft is complete.".to_string()));

        assert!(matches!(
            room.enable_timer(commish(), t0()).await,
            Err(DraftError::DraftComplete)
        ));
    }

    #[tokio::test]
    async fn disable_timer_clears_deadline_and_status_reflects_it() {
        let (store, room, _notifier) = draft_room();
        room.enable_timer(commish(), t0()).await.unwrap();
        let status = room.status(t0() + chrono::Duration::minutes(3)).await.unwrap();
        assert_eq!(status.remaining_secs, Some(300));
        assert_eq!(status.current_pick.map(|p| p.overall), Some(1));

        room.disable_timer(commish(), t0()).await.unwrap();
        let status = room.status(t0()).await.unwrap();
        assert!(!status.clock.timer_enabled);
        assert_eq!(status.remaining_secs, None);
        assert!(store.get_draft_pick(12, 1).await.unwrap().unwrap().deadline.is_none());
    }

    #[tokio::test]
    async fn notifier_failures_do_not_block_picks() {
        let (store, room) =
            crate::test_support::draft_room_with(Arc::new(RecordingNotifier::failing()));
        room.enable_timer(commish(), t0()).await.unwrap();
        room.submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        assert!(store.get_draft_pick(12, 1).await.unwrap().unwrap().is_filled());
    }

    #[tokio::test]
    async fn roster_update_is_retried_before_the_pick_lands() {
        let flaky = Arc::new(FlakyStore::new(draft_store()));
        flaky.fail_mutations_transiently(PlayerId(101), 1);
        let notifier = Arc::new(RecordingNotifier::default());
        let room = draft_room_on(flaky.clone(), notifier.clone());

        let outcome = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        assert_eq!(outcome.overall, 1);
        assert_eq!(flaky.mutation_calls(PlayerId(101)), 2);
        assert_eq!(flaky.get_player(PlayerId(101)).await.unwrap().team_id, TeamId(1));

        // MUD is on the clock now, but 101 has left the pool.
        let err = room
            .submit_pick(Actor::user("u2"), TeamId(2), PlayerId(101), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::Ineligible(Ineligible::NotFreeAgent { .. })));
        assert!(flaky.get_draft_pick(12, 2).await.unwrap().unwrap().player_id.is_none());
        assert!(notifier.channel_messages("ops").is_empty());
    }

    #[tokio::test]
    async fn failed_roster_update_leaves_pick_open_and_player_in_pool() {
        let flaky = Arc::new(FlakyStore::new(draft_store()));
        flaky.fail_mutations_transiently(PlayerId(101), 3);
        let notifier = Arc::new(RecordingNotifier::default());
        let room = draft_room_on(flaky.clone(), notifier.clone());

        let err = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, DraftError::Store(StoreError::Unavailable(_))));
        assert_eq!(flaky.mutation_calls(PlayerId(101)), 3);
        assert!(flaky.get_draft_pick(12, 1).await.unwrap().unwrap().player_id.is_none());
        assert_eq!(flaky.get_player(PlayerId(101)).await.unwrap().team_id, TeamId(99));
        assert_eq!(room.load_clock().await.unwrap().current_overall, 1);
        assert!(room.lock().holder().is_none());

        let ops = notifier.channel_messages("ops");
        assert_eq!(ops.len(), 1);
        assert!(ops[0].contains("was not recorded"));

        // Still VOR's turn: the same player goes through once the store recovers.
        let outcome = room
            .submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();
        assert_eq!(outcome.overall, 1);
        assert_eq!(
            flaky.get_draft_pick(12, 1).await.unwrap().unwrap().player_id,
            Some(PlayerId(101))
        );
    }

    /// Notes whether the draft lock was held at each delivery.
    #[derive(Default)]
    struct LockWatch {
        room: OnceLock<Weak<DraftRoom>>,
        held: Mutex<Vec<bool>>,
    }

    impl LockWatch {
        fn observe(&self) {
            let held = self
                .room
                .get()
                .and_then(Weak::upgrade)
                .is_some_and(|room| room.lock().holder().is_some());
            self.held.lock().unwrap().push(held);
        }
    }

    #[async_trait]
    impl Notifier for LockWatch {
        async fn post_to_channel(&self, _channel: &str, _message: &str) -> anyhow::Result<()> {
            self.observe();
            Ok(())
        }

        async fn send_direct_message(&self, _user_id: &str, _message: &str) -> anyhow::Result<()> {
            self.observe();
            Ok(())
        }
    }

    #[tokio::test]
    async fn notifications_go_out_after_the_lock_is_released() {
        let watch = Arc::new(LockWatch::default());
        let (_store, room) = crate::test_support::draft_room_with(watch.clone());
        watch.room.set(Arc::downgrade(&room)).unwrap();

        room.enable_timer(commish(), t0()).await.unwrap();
        room.submit_pick(Actor::user("u1"), TeamId(1), PlayerId(101), t0())
            .await
            .unwrap();

        // Pick 2 runs out and the clock auto-drafts it.
        let clock = DraftClock::new(room.clone());
        let expired = t0() + chrono::Duration::minutes(9);
        let tick = clock.tick_at(expired).await.unwrap();
        assert!(matches!(tick.event, ClockEvent::AutoDrafted(_)));

        room.disable_timer(commish(), expired).await.unwrap();

        let held = watch.held.lock().unwrap().clone();
        assert!(held.len() >= 6, "expected several deliveries, got {}", held.len());
        assert!(held.iter().all(|h| !h), "delivered while the lock was held: {held:?}");
    }
}
