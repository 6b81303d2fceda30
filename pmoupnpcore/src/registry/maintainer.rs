use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::registry::Registry;

/// Lance la tâche de maintenance périodique du registre.
///
/// Le travail différé retourné par chaque passage est lancé dans des
/// tâches séparées. La tâche s'arrête avec `abort()`.
pub fn spawn_maintenance(registry: Arc<Registry>, interval: Duration) -> JoinHandle<()> {
    info!(interval_ms = interval.as_millis() as u64, "⚙️ Registry maintenance started");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let tasks = registry.maintain(Instant::now());
            if !tasks.is_empty() {
                debug!(count = tasks.len(), "Running deferred maintenance work");
            }
            for task in tasks {
                tokio::spawn(task);
            }
        }
    })
}
