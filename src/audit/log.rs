use std::{collections::HashMap, io, path::PathBuf};

use serde::Deserialize;

use crate::{
    jsonl::JsonlLog,
    models::{DocumentStatus, IntegrityRecord},
};

pub const DEFAULT_REPORT_LIMIT: usize = 100;

fn default_limit() -> usize {
    DEFAULT_REPORT_LIMIT
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReportQuery {
    #[serde(default)]
    pub matter_id: Option<String>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub only_failed: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            matter_id: None,
            status: None,
            doc_id: None,
            only_failed: false,
            limit: DEFAULT_REPORT_LIMIT,
        }
    }
}

impl ReportQuery {
    fn accepts(&self, record: &IntegrityRecord) -> bool {
        self.matter_id.as_deref().map_or(true, |m| record.matter_id == m)
            && self.status.map_or(true, |s| record.status_at_audit == s)
            && self.doc_id.as_deref().map_or(true, |d| record.doc_id == d)
            && (!self.only_failed || record.is_failure())
    }
}

#[derive(Debug)]
pub struct IntegrityLog {
    file: JsonlLog,
}

impl IntegrityLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonlLog::new(path),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }

    pub async fn append(&self, record: &IntegrityRecord) -> io::Result<()> {
        self.file.append(record).await
    }

    pub async fn list(&self, query: &ReportQuery) -> io::Result<Vec<IntegrityRecord>> {
        let records = self.file.read_all().await?;
        Ok(latest_per_document(records, query))
    }
}

pub fn latest_per_document(
    records: Vec<IntegrityRecord>,
    query: &ReportQuery,
) -> Vec<IntegrityRecord> {
    let mut latest: HashMap<String, IntegrityRecord> = HashMap::new();
    for record in records {
        match latest.get(&record.doc_id) {
            Some(current) if current.ts > record.ts => {}
            _ => {
                latest.insert(record.doc_id.clone(), record);
            }
        }
    }

    let mut rows: Vec<IntegrityRecord> = latest
        .into_values()
        .filter(|record| query.accepts(record))
        .collect();
    rows.sort_by(|a, b| b.ts.cmp(&a.ts).then_with(|| a.doc_id.cmp(&b.doc_id)));
    rows.truncate(query.limit);
    rows
}
