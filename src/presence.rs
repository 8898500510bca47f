//! Presence tracker: a process-local device-id -> last-offline-timestamp
//! map, swept every `presence_sweep_interval` for entries older than
//! `presence_grace_period`. Same "spawn a loop, sleep, sweep" shape as
//! this crate's other periodic background tasks.

use crate::config::Config;
use crate::models::DeviceId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;

/// Invoked by the sweeper for every device whose grace period expired.
/// Implemented by the call engine to drop or degrade the affected call.
#[async_trait::async_trait]
pub trait PresenceSink: Send + Sync {
    async fn on_device_stale(&self, device: DeviceId);
}

#[derive(Default)]
struct PresenceState {
    offline_since: HashMap<DeviceId, DateTime<Utc>>,
}

pub struct PresenceTracker {
    state: Mutex<PresenceState>,
    config: Config,
}

impl PresenceTracker {
    pub fn new(config: Config) -> Self {
        Self {
            state: Mutex::new(PresenceState::default()),
            config,
        }
    }

    /// A device went offline: record the timestamp if not already tracked.
    pub fn mark_offline(&self, device: DeviceId) {
        let mut state = self.state.lock().unwrap();
        state.offline_since.entry(device).or_insert_with(Utc::now);
    }

    /// A device came back online: forget it, canceling any pending sweep.
    pub fn mark_online(&self, device: DeviceId) {
        self.state.lock().unwrap().offline_since.remove(&device);
    }

    fn take_stale(&self) -> Vec<DeviceId> {
        let mut state = self.state.lock().unwrap();
        let grace = self.config.presence_grace_period;
        let now = Utc::now();
        let stale: Vec<DeviceId> = state
            .offline_since
            .iter()
            .filter(|(_, since)| {
                now.signed_duration_since(**since).to_std().unwrap_or_default() >= grace
            })
            .map(|(&device, _)| device)
            .collect();
        for device in &stale {
            state.offline_since.remove(device);
        }
        stale
    }

    /// Spawns the 10-second sweep loop. Runs for the lifetime of the
    /// returned `JoinHandle`'s task; callers typically never await it.
    pub fn spawn_sweeper(self: &Arc<Self>, sink: Arc<dyn PresenceSink>) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tracker.config.presence_sweep_interval).await;
                for device in tracker.take_stale() {
                    sink.on_device_stale(device).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_online_cancels_pending_sweep() {
        let tracker = PresenceTracker::new(Config::default());
        tracker.mark_offline(101);
        tracker.mark_online(101);
        assert!(tracker.take_stale().is_empty());
    }

    #[test]
    fn stale_entries_are_removed_once_grace_period_elapses() {
        let mut config = Config::default();
        config.presence_grace_period = std::time::Duration::from_secs(0);
        let tracker = PresenceTracker::new(config);
        tracker.mark_offline(101);
        let stale = tracker.take_stale();
        assert_eq!(stale, vec![101]);
        assert!(tracker.take_stale().is_empty());
    }
}
