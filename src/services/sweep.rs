use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::state::SharedState;

/// Periodically evict sessions that stayed idle past the idle window.
pub async fn run(state: SharedState) {
    let period = state.config().sweep_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

/// Run a single eviction pass, returning the number of evicted sessions.
pub async fn sweep_once(state: &SharedState) -> usize {
    let evicted = state.registry().evict_idle().await;
    if evicted > 0 {
        info!(evicted, remaining = state.registry().len(), "idle sessions evicted");
    } else {
        debug!(remaining = state.registry().len(), "sweep found no idle session");
    }
    evicted
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{config::AppConfig, services::write_behind::PersistQueue, state::AppState};

    #[tokio::test(start_paused = true)]
    async fn background_sweep_evicts_idle_sessions() {
        let (queue, _receiver) = PersistQueue::channel();
        let state = AppState::new(AppConfig::default(), queue);
        state
            .registry()
            .create_session(Some("ABC123".into()), "Friday", "Alice")
            .unwrap();
        let sweeper = tokio::spawn(run(state.clone()));

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(state.registry().len(), 1);

        tokio::time::sleep(Duration::from_secs(3 * 60)).await;
        assert!(state.registry().is_empty());
        sweeper.abort();
    }
}
