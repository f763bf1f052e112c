//! In-memory sink for tests and local experiments.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SinkError;

use super::{AnalyticsSink, SentimentRow, TableSchema};

/// Collects appended rows in memory.
#[derive(Default)]
pub struct MemorySink {
    schema: Mutex<Option<TableSchema>>,
    rows: Mutex<Vec<SentimentRow>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows appended so far.
    pub async fn rows(&self) -> Vec<SentimentRow> {
        self.rows.lock().await.clone()
    }

    /// Whether `ensure_table` has been called.
    pub async fn table_created(&self) -> bool {
        self.schema.lock().await.is_some()
    }
}

#[async_trait]
impl AnalyticsSink for MemorySink {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<(), SinkError> {
        let mut current = self.schema.lock().await;
        if current.is_none() {
            *current = Some(schema.clone());
        }
        Ok(())
    }

    async fn append_rows(&self, rows: &[SentimentRow]) -> Result<(), SinkError> {
        self.rows.lock().await.extend_from_slice(rows);
        Ok(())
    }
}
