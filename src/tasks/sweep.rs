// src/tasks/sweep.rs

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

use crate::{services::lifecycle, state::AppState};

/// Periodically expires overdue assignments until `shutdown` flips to true.
pub async fn run(state: AppState, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = every.as_secs(), "Expiry sweep started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = lifecycle::sweep(state.store.as_ref(), Utc::now()).await {
                    tracing::error!(error = %err, "Expiry sweep failed");
                }
            }
        }
    }

    tracing::info!("Expiry sweep stopped");
}
