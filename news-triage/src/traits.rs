use crate::types::{RawRecord, Result};
use async_trait::async_trait;

/// A provider that hands over raw records for one pipeline pass.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Stable key used in per-source counts
    fn name(&self) -> String;

    /// Fetch the current batch. A connector without credentials returns an empty batch.
    async fn pull(&self) -> Result<Vec<RawRecord>>;
}

/// Fixed batch of records, for replaying exports and for tests.
pub struct StaticSource {
    name: String,
    records: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new(name: &str, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.to_string(),
            records,
        }
    }
}

#[async_trait]
impl SourceConnector for StaticSource {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn pull(&self) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}
