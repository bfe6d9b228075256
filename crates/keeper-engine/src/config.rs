//! Engine configuration.

use std::time::Duration;

/// Tuning knobs of one trigger keeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperConfig {
    /// Keeper name, used in logs, alerts and metric labels.
    pub name: String,
    /// Scan cycle interval.
    pub interval: Duration,
    /// How long a perpetual order is skipped after a trigger attempt started.
    pub trigger_cooldown: Duration,
    /// Minimum slots between two account index resyncs.
    pub resync_cooldown_slots: u64,
    /// Log resync deferrals only when the remaining slots are a multiple of this.
    pub resync_log_every_slots: u64,
    /// Snapshot lock timeout, in scan intervals.
    pub snapshot_lock_timeout_intervals: u32,
    /// Health check window, in scan intervals.
    pub liveness_intervals: u32,
    /// Capacity of the dispatch outcome channel.
    pub outcome_channel_capacity: usize,
    /// Log would-be triggers instead of submitting them.
    pub dry_run: bool,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            name: "trigger".to_string(),
            interval: Duration::from_secs(1),
            trigger_cooldown: Duration::from_secs(10),
            resync_cooldown_slots: 50,
            resync_log_every_slots: 10,
            snapshot_lock_timeout_intervals: 10,
            liveness_intervals: 2,
            outcome_channel_capacity: 1024,
            dry_run: false,
        }
    }
}

impl KeeperConfig {
    /// Bound on snapshot lock acquisition plus snapshot build.
    #[must_use]
    pub fn snapshot_lock_timeout(&self) -> Duration {
        self.interval * self.snapshot_lock_timeout_intervals
    }
}
