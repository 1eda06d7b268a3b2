//! Update batcher tuning.

use std::collections::BTreeSet;
use std::time::Duration;

const DEFAULT_MAX_BATCH: usize = 100;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TABLES: [&str; 4] = ["titles", "contents", "keywords", "images"];

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Pending count that triggers an inline flush from `add`.
    pub max_batch: usize,
    /// Period of the background flush.
    pub flush_interval: Duration,
    /// Tables the batcher may write to; anything else is skipped.
    pub tables: BTreeSet<String>,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch: DEFAULT_MAX_BATCH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            tables: DEFAULT_TABLES.iter().map(|table| table.to_string()).collect(),
        }
    }
}

impl BatcherConfig {
    pub fn allows(&self, table: &str) -> bool {
        self.tables.contains(table)
    }
}

impl From<&crate::config::BatcherSettings> for BatcherConfig {
    fn from(settings: &crate::config::BatcherSettings) -> Self {
        Self {
            max_batch: settings.max_batch.get(),
            flush_interval: settings.flush_interval,
            tables: settings.tables.clone(),
        }
    }
}
