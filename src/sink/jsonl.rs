//! Local JSONL table sink.
//!
//! A table is a directory holding `schema.json` and an append-only
//! `rows.ndjson`. `ensure_table` creates both if missing and leaves an
//! existing table untouched; `append_rows` only ever opens the row file
//! in append mode.

use async_trait::async_trait;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppendSnafu, CreateTableSnafu, RowSerializeSnafu, SchemaSerializeSnafu, SinkError};

use super::{AnalyticsSink, SentimentRow, TableSchema};

const SCHEMA_FILE: &str = "schema.json";
const ROWS_FILE: &str = "rows.ndjson";

/// Append-only JSONL table rooted at a local directory.
pub struct JsonlSink {
    table_dir: PathBuf,
    /// Serializes appends so concurrent batches cannot interleave lines.
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(table_dir: impl AsRef<Path>) -> Self {
        Self {
            table_dir: table_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn rows_path(&self) -> PathBuf {
        self.table_dir.join(ROWS_FILE)
    }
}

#[async_trait]
impl AnalyticsSink for JsonlSink {
    async fn ensure_table(&self, schema: &TableSchema) -> Result<(), SinkError> {
        let path = self.table_dir.display().to_string();
        tokio::fs::create_dir_all(&self.table_dir)
            .await
            .context(CreateTableSnafu { path: path.clone() })?;

        let schema_path = self.table_dir.join(SCHEMA_FILE);
        if tokio::fs::try_exists(&schema_path)
            .await
            .context(CreateTableSnafu { path: path.clone() })?
        {
            debug!(table = %path, "Table already exists");
            return Ok(());
        }

        let serialized =
            serde_json::to_string_pretty(schema).context(SchemaSerializeSnafu)?;
        tokio::fs::write(&schema_path, serialized)
            .await
            .context(CreateTableSnafu { path: path.clone() })?;
        info!(table = %path, "Created table");
        Ok(())
    }

    async fn append_rows(&self, rows: &[SentimentRow]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut ndjson = String::new();
        for row in rows {
            let line = serde_json::to_string(row).context(RowSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        let path = self.rows_path();
        let path_str = path.display().to_string();

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(AppendSnafu {
                path: path_str.clone(),
            })?;
        file.write_all(ndjson.as_bytes())
            .await
            .context(AppendSnafu {
                path: path_str.clone(),
            })?;
        file.flush().await.context(AppendSnafu { path: path_str })?;

        debug!(count = rows.len(), "Appended rows");
        Ok(())
    }
}
