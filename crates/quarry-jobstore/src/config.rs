//! Job store configuration.

use std::time::Duration;

use quarry_store::TableNames;

/// Default check-in interval for scheduler instances.
pub const DEFAULT_CHECKIN_INTERVAL: Duration = Duration::from_millis(7_500);

/// Default number of compare-and-swap attempts before reporting contention.
pub const DEFAULT_MAX_UPDATE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    /// Names of the six tables.
    pub tables: TableNames,
    /// Identity of this scheduler process. Stamped on the triggers it acquires.
    pub instance_id: String,
    pub checkin_interval: Duration,
    /// Read-modify-write attempts per state change under contention.
    pub max_update_attempts: usize,
}

impl JobStoreConfig {
    pub fn new(tables: TableNames) -> Self {
        Self {
            tables,
            instance_id: uuid::Uuid::new_v4().to_string(),
            checkin_interval: DEFAULT_CHECKIN_INTERVAL,
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self::new(TableNames::default())
    }
}
