use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::core::{ConfirmationCoordinator, Matcher};

/// `tokio::time::interval` panics on a zero period
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Run a matching pass every `every`, logging failures
pub fn spawn_matching_loop(matcher: Arc<Matcher>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = matcher.run_matching_pass().await {
                tracing::error!("Matching pass failed: {}", e);
            }
        }
    })
}

/// Expire overdue matches and repair stranded entries every `every`
pub fn spawn_sweep_loop(coordinator: Arc<ConfirmationCoordinator>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = coordinator.sweep_expired().await {
                tracing::error!("Expiry sweep failed: {}", e);
            }
        }
    })
}
