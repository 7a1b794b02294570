//! Run history
//!
//! In-memory log of completed analysis runs, exposed over the API.
//! Failed runs are never recorded — nothing is salvaged from them.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub task: String,
    pub competitors: Vec<String>,
    pub max_revisions: u32,
    /// Digest of the task + uploaded document, for spotting re-runs of
    /// identical inputs.
    pub input_digest: String,
    pub report: String,
    pub step_trace: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub task: String,
    pub created_at: DateTime<Utc>,
}

/// Completed-run storage
pub struct RunHistory {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a completed run
    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let run_id = record.run_id;
        let mut records = self.records.write().await;
        records.insert(run_id, record);
        Ok(run_id)
    }

    pub async fn get(&self, run_id: Uuid) -> Option<RunRecord> {
        let records = self.records.read().await;
        records.get(&run_id).cloned()
    }

    /// All runs, newest first
    pub async fn list(&self) -> Vec<RunSummary> {
        let records = self.records.read().await;

        let mut items: Vec<RunSummary> = records
            .values()
            .map(|r| RunSummary {
                run_id: r.run_id,
                task: r.task.clone(),
                created_at: r.created_at,
            })
            .collect();

        items.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        items
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA256 digest of a run's immutable inputs
pub fn input_digest(task: &str, source_document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.as_bytes());
    hasher.update([0u8]);
    hasher.update(source_document.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_list() {
        let history = RunHistory::new();
        let record = RunRecord {
            run_id: Uuid::new_v4(),
            task: "compare vs competitors".to_string(),
            competitors: vec!["Acme".to_string()],
            max_revisions: 2,
            input_digest: input_digest("compare vs competitors", "a,b\n1,2"),
            report: "report body".to_string(),
            step_trace: vec!["gather_financials".to_string()],
            created_at: Utc::now(),
            execution_time_ms: 12,
        };

        let id = history.record(record).await.unwrap();
        assert!(history.get(id).await.is_some());
        assert_eq!(history.list().await.len(), 1);
    }

    #[test]
    fn digest_is_stable_and_input_sensitive() {
        let a = input_digest("task", "doc");
        assert_eq!(a, input_digest("task", "doc"));
        assert_ne!(a, input_digest("task", "doc2"));
    }
}
