// Draft pick clock.
//
// Tracks the deadline of the pick on the clock, posts the two countdown
// warnings, and hands an expired pick to the auto-draft under the draft lock.
// The poll rate tightens as the deadline approaches. While the timer is off
// the loop parks until the room wakes it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::DraftConfig;
use crate::draft::room::{AutoDraftOutcome, DraftError, DraftRoom};
use crate::league::Actor;
use crate::notify::Outbox;

pub const DRAFT_CLOCK_KEY: &str = "draft_clock";

/// Which countdown warnings went out for the pick on the clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningsSent {
    pub first: bool,
    pub last: bool,
}

/// Persisted clock position for one season's draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftClockState {
    pub season: u32,
    pub timer_enabled: bool,
    pub current_overall: u32,
    pub deadline: Option<DateTime<Utc>>,
    pub warnings: WarningsSent,
}

impl DraftClockState {
    pub fn new(season: u32) -> Self {
        Self {
            season,
            timer_enabled: false,
            current_overall: 1,
            deadline: None,
            warnings: WarningsSent::default(),
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.deadline.map(|d| d - now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    First,
    Final,
}

/// Poll interval for the time left on the clock: slow above the first
/// warning threshold, medium down to the final one, fast below it.
pub fn poll_interval(remaining: chrono::Duration, config: &DraftConfig) -> Duration {
    let secs = remaining.num_seconds();
    if secs > config.first_warning_secs as i64 {
        Duration::from_secs(config.poll_slow_secs)
    } else if secs >= config.final_warning_secs as i64 {
        Duration::from_secs(config.poll_medium_secs)
    } else {
        Duration::from_secs(config.poll_fast_secs)
    }
}

/// The warning to post now, if any. When a slow tick jumps past both
/// thresholds only the final warning goes out and both count as sent.
pub fn due_warning(
    sent: &mut WarningsSent,
    remaining: chrono::Duration,
    config: &DraftConfig,
) -> Option<Warning> {
    let secs = remaining.num_seconds();
    if secs <= config.final_warning_secs as i64 && !sent.last {
        sent.last = true;
        sent.first = true;
        return Some(Warning::Final);
    }
    if secs <= config.first_warning_secs as i64 && !sent.first {
        sent.first = true;
        return Some(Warning::First);
    }
    None
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockEvent {
    Idle,
    Waiting,
    Warned(Warning),
    AutoDrafted(AutoDraftOutcome),
    /// Someone else held the lock; try again next tick.
    LockBusy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClockTick {
    pub event: ClockEvent,
    /// `None` when the timer is off and the loop should park.
    pub next_poll: Option<Duration>,
}

pub struct DraftClock {
    room: Arc<DraftRoom>,
}

impl DraftClock {
    pub fn new(room: Arc<DraftRoom>) -> Self {
        Self { room }
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<ClockTick, DraftError> {
        let config = self.room.config();
        let state = self.room.load_clock().await?;
        if !state.timer_enabled {
            return Ok(ClockTick {
                event: ClockEvent::Idle,
                next_poll: None,
            });
        }

        // Nothing to mutate: skip the lock.
        if let Some(remaining) = state.remaining(now) {
            let mut peek = state.warnings;
            if remaining > chrono::Duration::zero()
                && due_warning(&mut peek, remaining, config).is_none()
            {
                return Ok(ClockTick {
                    event: ClockEvent::Waiting,
                    next_poll: Some(poll_interval(remaining, config)),
                });
            }
        }

        let mut outbox = Outbox::default();
        let tick = self.tick_locked(now, &mut outbox).await;
        self.room.deliver(outbox).await;
        tick
    }

    async fn tick_locked(
        &self,
        now: DateTime<Utc>,
        outbox: &mut Outbox,
    ) -> Result<ClockTick, DraftError> {
        let config = self.room.config();
        let _guard = match self.room.lock().try_acquire(Actor::System, now) {
            Ok(guard) => guard,
            Err(busy) => {
                debug!("draft clock tick deferred: {busy}");
                return Ok(ClockTick {
                    event: ClockEvent::LockBusy,
                    next_poll: Some(Duration::from_secs(config.poll_fast_secs)),
                });
            }
        };

        // Re-read under the lock; a pick may have landed meanwhile.
        let mut state = self.room.load_clock().await?;
        if !state.timer_enabled {
            return Ok(ClockTick {
                event: ClockEvent::Idle,
                next_poll: None,
            });
        }

        let event = match state.remaining(now) {
            None => {
                self.room.start_current_pick(&mut state, now, outbox).await?;
                ClockEvent::Waiting
            }
            Some(remaining) if remaining <= chrono::Duration::zero() => {
                info!(overall = state.current_overall, "pick deadline expired, auto-drafting");
                let outcome = self.room.auto_draft(&mut state, now, outbox).await?;
                ClockEvent::AutoDrafted(outcome)
            }
            Some(remaining) => match due_warning(&mut state.warnings, remaining, config) {
                Some(warning) => {
                    self.room
                        .post_warning(&state, warning, remaining, outbox)
                        .await;
                    ClockEvent::Warned(warning)
                }
                None => ClockEvent::Waiting,
            },
        };
        self.room.save_clock(&state).await?;

        let next_poll = if state.timer_enabled {
            let remaining = state.remaining(now).unwrap_or_else(chrono::Duration::zero);
            Some(poll_interval(remaining, config))
        } else {
            None
        };
        Ok(ClockTick { event, next_poll })
    }

    /// Drive the clock until `shutdown` flips to `true`. A failed tick is
    /// logged and retried at the slow poll rate.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let wake = self.room.wake_handle();
        let retry = Duration::from_secs(self.room.config().poll_slow_secs);
        info!("draft clock started");

        loop {
            let next_poll = match self.tick_at(Utc::now()).await {
                Ok(tick) => tick.next_poll,
                Err(e) => {
                    error!("draft clock tick failed: {e}");
                    Some(retry)
                }
            };

            match next_poll {
                Some(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = wake.notified() => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
                None => {
                    debug!("draft timer off, clock parked");
                    tokio::select! {
                        _ = wake.notified() => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!("draft clock stopped");
    }
}
