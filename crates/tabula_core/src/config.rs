//! Database configuration and per-call write options.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Record count at which the active segment is sealed.
    pub max_segment_records: u64,

    /// Byte size at which the active segment is sealed.
    pub max_segment_bytes: u64,

    /// Default page size for traversals (`None` = unlimited).
    pub max_traverse_count: Option<usize>,

    /// Whether sealing syncs the segment file before installing its successor.
    pub sync_on_seal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            max_segment_records: 65_536,
            max_segment_bytes: 64 * 1024 * 1024, // 64 MB
            max_traverse_count: None,
            sync_on_seal: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets the record count that triggers a seal.
    #[must_use]
    pub const fn max_segment_records(mut self, records: u64) -> Self {
        self.max_segment_records = records;
        self
    }

    /// Sets the segment size that triggers a seal.
    #[must_use]
    pub const fn max_segment_bytes(mut self, bytes: u64) -> Self {
        self.max_segment_bytes = bytes;
        self
    }

    /// Sets the default traversal page size.
    #[must_use]
    pub const fn max_traverse_count(mut self, count: Option<usize>) -> Self {
        self.max_traverse_count = count;
        self
    }

    /// Sets whether sealing syncs the segment file.
    #[must_use]
    pub const fn sync_on_seal(mut self, value: bool) -> Self {
        self.sync_on_seal = value;
        self
    }
}

/// Durability level of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// The segment file is synced before the write returns.
    #[default]
    Strong,
    /// The write returns once appended; syncing is left to seal, checkpoint
    /// or close.
    Relaxed,
}

/// Options applied to a single put, update or delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Durability level.
    pub consistency: Consistency,
    /// Upper bound on the wait for the table's writer (`None` = wait).
    pub timeout: Option<Duration>,
}

impl WriteOptions {
    /// Strong consistency, no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Relaxed consistency, no timeout.
    #[must_use]
    pub const fn relaxed() -> Self {
        Self {
            consistency: Consistency::Relaxed,
            timeout: None,
        }
    }

    /// Sets the consistency level.
    #[must_use]
    pub const fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the writer wait timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(config.sync_on_seal);
        assert_eq!(config.max_segment_records, 65_536);
        assert_eq!(config.max_traverse_count, None);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_seal(false)
            .max_segment_records(8)
            .max_traverse_count(Some(100));

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_seal);
        assert_eq!(config.max_segment_records, 8);
        assert_eq!(config.max_traverse_count, Some(100));
    }

    #[test]
    fn write_options_default_is_strong_without_timeout() {
        let opts = WriteOptions::default();
        assert_eq!(opts.consistency, Consistency::Strong);
        assert_eq!(opts.timeout, None);

        let opts = WriteOptions::relaxed().timeout(Duration::from_millis(5));
        assert_eq!(opts.consistency, Consistency::Relaxed);
        assert_eq!(opts.timeout, Some(Duration::from_millis(5)));
    }
}
