//! Background maintenance: expiry sweep and session collection.

use crate::state::AppState;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub sessions_collected: usize,
}

/// Persists due expirations and drops dead sessions.
pub fn run_once(state: &AppState) -> MaintenanceReport {
    let expired = match state.store.expire_due() {
        Ok(expired) => expired.len(),
        Err(e) => {
            warn!("expiry sweep failed: {e}");
            0
        }
    };
    let sessions_collected = state.guard.collect_garbage();
    MaintenanceReport {
        expired,
        sessions_collected,
    }
}

/// Runs [`run_once`] every `interval` until the task is aborted.
pub fn spawn(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let sweep_state = state.clone();
            match tokio::task::spawn_blocking(move || run_once(&sweep_state)).await {
                Ok(report) => debug!(
                    expired = report.expired,
                    sessions_collected = report.sessions_collected,
                    "maintenance pass"
                ),
                Err(e) => warn!("maintenance pass panicked: {e}"),
            }
        }
    })
}
