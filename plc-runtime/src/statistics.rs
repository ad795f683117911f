//! Connection statistics collection

/// Per-connection scheduler statistics
///
/// Counts how the scheduler serviced one connection.
///
/// # Reading the Counters
/// - **Stuck Tasks**: `tasks_in_flight` staying above zero while
///   `ticks_served` keeps growing means some Task never leaves `Pending`
/// - **Device Trouble**: a rising `tasks_failed` points at transport
///   errors or replies the driver cannot decode
/// - **Load**: `tasks_spawned` per tick shows how busy the connection is
///
/// # Usage
/// The connection updates the counters on every tick and every Task
/// spawn or removal. Callers read them through `Connection::statistics`
/// and may `clear` them between measurement windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStatistics {
    /// Scheduler ticks that serviced this connection
    pub ticks_served: u64,
    pub tasks_spawned: u64,
    pub tasks_completed: u64,
    /// Tasks abandoned after a failed step
    pub tasks_failed: u64,
}

impl ConnectionStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Increment ticks served counter
    pub fn increment_ticks_served(&mut self) {
        self.ticks_served += 1;
    }

    pub fn increment_tasks_spawned(&mut self) {
        self.tasks_spawned += 1;
    }

    pub fn increment_tasks_completed(&mut self) {
        self.tasks_completed += 1;
    }

    pub fn increment_tasks_failed(&mut self) {
        self.tasks_failed += 1;
    }

    /// Tasks spawned but neither completed nor failed
    pub fn tasks_in_flight(&self) -> u64 {
        self.tasks_spawned
            .saturating_sub(self.tasks_completed + self.tasks_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut stats = ConnectionStatistics::new();
        stats.increment_tasks_spawned();
        stats.increment_tasks_spawned();
        stats.increment_tasks_completed();
        stats.increment_ticks_served();
        assert_eq!(stats.tasks_in_flight(), 1);
        assert_eq!(stats.ticks_served, 1);

        stats.clear();
        assert_eq!(stats, ConnectionStatistics::default());
    }
}
