// Roster mutation executor.
//
// Applies awarded transactions to the store one at a time. A failing item is
// logged and recorded, and the batch moves on; there is no rollback of the
// items that already landed. Failures are posted to the operator channel for
// manual remediation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::ExecutorConfig;
use crate::notify::{self, Notifier};
use crate::store::{ResourceStore, StoreError};
use crate::transactions::model::{Transaction, TransactionId, TransactionStatus};

/// Why a transaction could not be completed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The roster mutation itself failed; the player did not move.
    Mutation(String),
    /// The player moved but the `Processed` status could not be written.
    StatusWrite(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedMutation {
    pub transaction: Transaction,
    pub attempts: u32,
    pub reason: FailureReason,
}

/// Outcome of one executor run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub succeeded: Vec<TransactionId>,
    pub failed: Vec<FailedMutation>,
    pub total: usize,
}

impl ExecutionReport {
    /// `(succeeded, failed, total)`
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.succeeded.len(), self.failed.len(), self.total)
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct MutationExecutor {
    store: Arc<dyn ResourceStore>,
    notifier: Arc<dyn Notifier>,
    config: ExecutorConfig,
    operator_channel: String,
}

impl MutationExecutor {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        notifier: Arc<dyn Notifier>,
        config: ExecutorConfig,
        operator_channel: String,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            operator_channel,
        }
    }

    /// Apply every transaction in order and report the outcome. Each success
    /// moves the player and then marks the transaction `Processed`.
    pub async fn execute(&self, transactions: &[Transaction]) -> ExecutionReport {
        let mut report = ExecutionReport {
            total: transactions.len(),
            ..ExecutionReport::default()
        };

        for (idx, txn) in transactions.iter().enumerate() {
            if idx > 0 {
                tokio::time::sleep(self.config.rate_limit()).await;
            }

            let (result, attempts) = self
                .with_retry(|| self.store.apply_roster_mutation(txn.player_id, txn.to_team))
                .await;
            if let Err(e) = result {
                warn!(txn = %txn.id, attempts, "roster mutation failed: {e}");
                report.failed.push(FailedMutation {
                    transaction: txn.clone(),
                    attempts,
                    reason: FailureReason::Mutation(e.to_string()),
                });
                continue;
            }

            let (result, status_attempts) = self
                .with_retry(|| {
                    self.store
                        .set_transaction_status(txn.id, TransactionStatus::Processed)
                })
                .await;
            match result {
                Ok(()) => {
                    info!(
                        txn = %txn.id,
                        player = %txn.player_id,
                        to = %txn.to_team,
                        "transaction processed"
                    );
                    report.succeeded.push(txn.id);
                }
                Err(e) => {
                    warn!(txn = %txn.id, "player moved but status write failed: {e}");
                    report.failed.push(FailedMutation {
                        transaction: txn.clone(),
                        attempts: attempts + status_attempts,
                        reason: FailureReason::StatusWrite(e.to_string()),
                    });
                }
            }
        }

        let (ok, failed, total) = report.counts();
        info!(ok, failed, total, "roster mutation batch finished");
        if !report.is_clean() {
            self.report_failures(&report).await;
        }
        report
    }

    async fn with_retry<F, Fut>(&self, op: F) -> (Result<(), StoreError>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        retry_transient(&self.config, op).await
    }

    async fn report_failures(&self, report: &ExecutionReport) {
        let (ok, failed, total) = report.counts();
        let mut message = format!(
            "Roster update finished with failures: {ok}/{total} applied, {failed} need manual attention."
        );
        for failure in &report.failed {
            let txn = &failure.transaction;
            let detail = match &failure.reason {
                FailureReason::Mutation(e) => format!("player not moved ({e})"),
                FailureReason::StatusWrite(e) => {
                    format!("player moved, status not recorded ({e})")
                }
            };
            message.push_str(&format!(
                "\n- {} [{}] {} {} -> {}: {}",
                txn.id, txn.move_group, txn.player_id, txn.from_team, txn.to_team, detail
            ));
        }
        notify::announce(self.notifier.as_ref(), &self.operator_channel, &message).await;
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
/// Returns the final result and how many attempts were made.
pub async fn retry_transient<F, Fut>(
    config: &ExecutorConfig,
    mut op: F,
) -> (Result<(), StoreError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(()) => return (Ok(()), attempt),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(config.backoff_base(), attempt);
                warn!(attempt, ?delay, "transient store failure, retrying: {e}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}

/// Delay before retry number `attempt` (1-based): base, 2x base, 4x base...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.saturating_sub(1).min(16))
}
