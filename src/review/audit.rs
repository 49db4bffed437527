//! Append-only audit log, written the way the lineage this engine is
//! descended from writes its own operation log: one JSON object per line,
//! flushed on every append.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub environment: Option<String>,
    pub domain: Option<String>,
    pub details: serde_json::Value,
    pub commit_sha: Option<String>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> CoreResult<()>;
}

/// Appends each entry as one line of JSON to `<metadata_path>/audit_log.jsonl`.
pub struct FileAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(metadata_path: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(metadata_path)?;
        Ok(Self {
            path: metadata_path.join("audit_log.jsonl"),
            lock: Mutex::new(()),
        })
    }

    pub fn read_all(&self) -> CoreResult<Vec<AuditEntry>> {
        let _guard = self.lock.lock().unwrap();
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, entry: AuditEntry) -> CoreResult<()> {
        let line = serde_json::to_string(&entry)?;
        let _guard = self.lock.lock().unwrap();
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// In-memory sink for tests and embedders that don't want a file on disk.
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> CoreResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(action: &str) -> AuditEntry {
        AuditEntry {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            actor: "alice".to_string(),
            action: action.to_string(),
            entity_type: "change_request".to_string(),
            entity_id: "abc12345".to_string(),
            environment: Some("dev".to_string()),
            domain: Some("pricing".to_string()),
            details: serde_json::json!({}),
            commit_sha: None,
        }
    }

    #[tokio::test]
    async fn file_sink_appends_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAuditSink::new(dir.path()).unwrap();

        sink.record(entry("change_request.created")).await.unwrap();
        sink.record(entry("change_request.submitted")).await.unwrap();

        let entries = sink.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "change_request.created");
    }

    #[tokio::test]
    async fn in_memory_sink_collects_entries() {
        let sink = InMemoryAuditSink::new();
        sink.record(entry("promotion.created")).await.unwrap();
        assert_eq!(sink.entries().len(), 1);
    }
}
