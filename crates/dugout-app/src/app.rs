// Service wiring and loop supervision.
//
// The window scheduler and the draft clock run as two independent tasks. A
// failing tick in either is logged inside its own loop; a panic ends only the
// task it happened in.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use dugout_core::config::Config;
use dugout_core::db::SqliteStore;
use dugout_core::draft::clock::DraftClock;
use dugout_core::draft::room::DraftRoom;
use dugout_core::notify::{LogNotifier, Notifier, WebhookNotifier};
use dugout_core::schedule::scheduler::WindowScheduler;
use dugout_core::store::ResourceStore;
use dugout_core::transactions::executor::MutationExecutor;

/// Everything the binary runs, built from one config.
pub struct Services {
    pub store: Arc<dyn ResourceStore>,
    pub scheduler: Arc<WindowScheduler>,
    pub room: Arc<DraftRoom>,
    pub clock: Arc<DraftClock>,
}

/// Webhook delivery when a URL is configured, log-only otherwise.
pub fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match config.credentials.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => match WebhookNotifier::new(url.to_string()) {
            Ok(webhook) => {
                info!("Notifications go to the configured webhook");
                Arc::new(webhook)
            }
            Err(e) => {
                error!("Webhook notifier unavailable, notifications are logged only: {e:#}");
                Arc::new(LogNotifier)
            }
        },
        _ => {
            info!("No webhook configured, notifications are logged only");
            Arc::new(LogNotifier)
        }
    }
}

pub fn build_services(
    config: &Config,
    store: Arc<SqliteStore>,
    notifier: Arc<dyn Notifier>,
) -> Services {
    let store: Arc<dyn ResourceStore> = store;

    let executor = MutationExecutor::new(
        store.clone(),
        notifier.clone(),
        config.executor.clone(),
        config.channels.operator.clone(),
    );
    let scheduler = Arc::new(WindowScheduler::new(
        store.clone(),
        notifier.clone(),
        executor,
        config.league.clone(),
        config.schedule.clone(),
        config.channels.clone(),
    ));
    let room = Arc::new(DraftRoom::new(
        store.clone(),
        notifier,
        &config.league,
        config.draft.clone(),
        config.executor.clone(),
        config.channels.clone(),
    ));
    let clock = Arc::new(DraftClock::new(room.clone()));

    Services {
        store,
        scheduler,
        room,
        clock,
    }
}

/// Handles to the two polling loops.
pub struct RunningLoops {
    shutdown: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
    clock: JoinHandle<()>,
}

pub fn spawn_loops(services: &Services) -> RunningLoops {
    let (shutdown, rx) = watch::channel(false);

    let scheduler = services.scheduler.clone();
    let scheduler_rx = rx.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_rx).await;
    });

    let clock = services.clock.clone();
    let clock_handle = tokio::spawn(async move {
        clock.run(rx).await;
    });

    RunningLoops {
        shutdown,
        scheduler: scheduler_handle,
        clock: clock_handle,
    }
}

impl RunningLoops {
    /// Signal both loops and wait up to `grace` for each; stragglers are
    /// aborted.
    pub async fn shutdown(self, grace: Duration) {
        if self.shutdown.send(true).is_err() {
            warn!("Both loops already exited before shutdown");
        }
        for (name, handle) in [("scheduler", self.scheduler), ("draft clock", self.clock)] {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => info!("{name} loop stopped"),
                Ok(Err(e)) if e.is_panic() => error!("{name} loop panicked: {e}"),
                Ok(Err(e)) => warn!("{name} loop ended abnormally: {e}"),
                Err(_) => {
                    warn!("{name} loop did not stop within {grace:?}, aborting");
                    abort.abort();
                }
            }
        }
    }
}

/// Log where the scheduler and the draft clock stand at startup.
pub async fn log_startup_status(services: &Services) {
    match services.scheduler.state().await {
        Ok(Some(state)) => info!(
            "Scheduler resumes at season {} week {} (window {})",
            state.season,
            state.week,
            if state.window_is_open() { "open" } else { "closed" }
        ),
        Ok(None) => info!("No scheduler state yet; the first tick will initialize it"),
        Err(e) => warn!("Could not read scheduler state: {e}"),
    }
    match services.room.status(chrono::Utc::now()).await {
        Ok(status) => info!(
            "Draft clock: timer {}, pick #{} on the clock, {} skipped pick(s)",
            if status.clock.timer_enabled { "on" } else { "off" },
            status.clock.current_overall,
            status.skipped.len()
        ),
        Err(e) => warn!("Could not read draft clock status: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dugout_core::config::{
        ChannelsConfig, CredentialsConfig, DraftConfig, ExecutorConfig, LeagueConfig,
        ScheduleConfig,
    };
    use dugout_core::league::TeamId;
    use dugout_core::schedule::window::WeeklyBoundary;

    /// Helper: a complete config with an in-memory database and no webhook.
    fn test_config() -> Config {
        let midnight = chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        Config {
            league: LeagueConfig {
                name: "App League".into(),
                season: 12,
                off_season: false,
                free_agent_team: TeamId(99),
            },
            schedule: ScheduleConfig {
                poll_interval: Duration::from_secs(60),
                utc_offset: chrono::FixedOffset::east_opt(0).unwrap(),
                window_open: WeeklyBoundary::new(chrono::Weekday::Mon, midnight),
                window_close: WeeklyBoundary::new(chrono::Weekday::Sat, midnight),
            },
            executor: ExecutorConfig {
                rate_limit_ms: 100,
                max_attempts: 3,
                backoff_base_ms: 500,
            },
            draft: DraftConfig {
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
            },
            channels: ChannelsConfig {
                announcements: "transaction-log".into(),
                draft: "draft-room".into(),
                operator: "league-ops".into(),
            },
            credentials: CredentialsConfig::default(),
            db_path: ":memory:".into(),
        }
    }

    #[tokio::test]
    async fn loops_start_and_stop_cleanly() {
        let config = test_config();
        let store = Arc::new(SqliteStore::open(&config.db_path).unwrap());
        let services = build_services(&config, store, build_notifier(&config));
        log_startup_status(&services).await;

        let loops = spawn_loops(&services);

        // The scheduler's first tick fires immediately and records its state.
        let mut seeded = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if services.scheduler.state().await.unwrap().is_some() {
                seeded = true;
                break;
            }
        }
        assert!(seeded, "scheduler should initialize state on its first tick");

        tokio::time::timeout(Duration::from_secs(5), loops.shutdown(Duration::from_secs(2)))
            .await
            .expect("shutdown should finish");
    }

    #[tokio::test]
    async fn draft_clock_keeps_running_when_scheduler_is_off_season() {
        let mut config = test_config();
        config.league.off_season = true;
        let store = Arc::new(SqliteStore::open(&config.db_path).unwrap());
        let services = build_services(&config, store, build_notifier(&config));
        let loops = spawn_loops(&services);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(services.scheduler.state().await.unwrap().is_none());
        let status = services.room.status(chrono::Utc::now()).await.unwrap();
        assert!(!status.clock.timer_enabled);

        loops.shutdown(Duration::from_secs(2)).await;
    }
}
