// Process-wide draft lock.
//
// Serializes every pick mutation: manual picks, makeup picks, timer controls
// and the clock's auto-draft. A hold older than the stale timeout is treated
// as abandoned and force-released on the next acquisition attempt.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::league::Actor;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("pick in progress by {held_by}, retry in {retry_in_secs}s")]
pub struct LockBusy {
    pub held_by: Actor,
    pub retry_in_secs: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LockHolder {
    pub actor: Actor,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct LockSlot {
    holder: Option<(u64, LockHolder)>,
    next_token: u64,
}

#[derive(Debug, Clone)]
pub struct DraftLock {
    slot: Arc<Mutex<LockSlot>>,
    stale_after: Duration,
}

impl DraftLock {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(LockSlot::default())),
            stale_after,
        }
    }

    fn slot(&self) -> MutexGuard<'_, LockSlot> {
        self.slot.lock().expect("draft lock mutex poisoned")
    }

    /// Take the lock for `actor`, or report who holds it and for how long
    /// they still may.
    pub fn try_acquire(&self, actor: Actor, now: DateTime<Utc>) -> Result<LockGuard, LockBusy> {
        let mut slot = self.slot();

        if let Some((_, holder)) = &slot.holder {
            let held_for = now - holder.acquired_at;
            if held_for <= self.stale_after {
                let remaining = self.stale_after - held_for;
                // Round up so a caller never retries a moment too early.
                let retry_in_secs = (remaining.num_milliseconds() + 999) / 1000;
                return Err(LockBusy {
                    held_by: holder.actor.clone(),
                    retry_in_secs: retry_in_secs.max(1),
                });
            }
            warn!(
                held_by = %holder.actor,
                held_secs = held_for.num_seconds(),
                new_holder = %actor,
                "force-releasing stale draft lock"
            );
        }

        slot.next_token += 1;
        let token = slot.next_token;
        slot.holder = Some((
            token,
            LockHolder {
                actor: actor.clone(),
                acquired_at: now,
            },
        ));
        debug!(%actor, "draft lock acquired");

        Ok(LockGuard {
            slot: Arc::clone(&self.slot),
            token,
            actor,
        })
    }

    pub fn holder(&self) -> Option<LockHolder> {
        self.slot().holder.as_ref().map(|(_, h)| h.clone())
    }
}

/// Releases the lock when dropped, unless it was force-released and taken
/// over by someone else in the meantime.
#[derive(Debug)]
pub struct LockGuard {
    slot: Arc<Mutex<LockSlot>>,
    token: u64,
    actor: Actor,
}

impl LockGuard {
    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &slot.holder {
            Some((token, _)) if *token == self.token => {
                slot.holder = None;
                debug!(actor = %self.actor, "draft lock released");
            }
            _ => debug!(actor = %self.actor, "draft lock already taken over"),
        }
    }
}
