use crate::api::model::{PageNumber, PageResult, Record};
use crate::error::{AppError, AppResult};
use crate::io;
use crate::logging::{log, LogLevel};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every record collected so far, in storage order, plus the page numbers they cover.
///
/// The done-set is always derived from the records and never persisted on its own.
#[derive(Debug, Default, Clone)]
pub struct ProgressSet {
    // Handed to the save task by reference count, not copied.
    records: Arc<Vec<Record>>,
    done: BTreeSet<PageNumber>,
}

impl ProgressSet {
    pub fn from_records(records: Vec<Record>) -> Result<Self, String> {
        let mut done = BTreeSet::new();
        for (idx, record) in records.iter().enumerate() {
            match record.page() {
                Some(page) => {
                    done.insert(page);
                }
                None => return Err(format!("record #{} has no integer 'page' field", idx)),
            }
        }
        Ok(ProgressSet {
            records: Arc::new(records),
            done,
        })
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn done_pages(&self) -> &BTreeSet<PageNumber> {
        &self.done
    }

    pub fn is_done(&self, page: PageNumber) -> bool {
        self.done.contains(&page)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Places page results by page number, whatever order they arrived in. Pages refetched
    /// after an earlier failure land among their neighbours rather than at the end.
    pub fn merge(&mut self, mut results: Vec<PageResult>) {
        results.sort_by_key(|r| r.page);
        let records = Arc::make_mut(&mut self.records);
        for result in results {
            if result.records.is_empty() {
                continue;
            }
            self.done.insert(result.page);
            let at = records.partition_point(|r| r.page() <= Some(result.page));
            records.splice(at..at, result.records);
        }
    }
}

pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProgressStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is a fresh start. Anything unreadable is fatal: treating it as empty would
    /// overwrite it on the first save.
    pub async fn load(&self) -> AppResult<ProgressSet> {
        let Some(bytes) = io::read_if_exists(&self.path).await? else {
            log(
                LogLevel::Info,
                &format!(
                    "No existing progress at {}. Starting fresh.",
                    self.path.display()
                ),
            );
            return Ok(ProgressSet::default());
        };

        let records: Vec<Record> = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::corrupt_state(&self.path, e.to_string()))?;
        let set = ProgressSet::from_records(records)
            .map_err(|msg| AppError::corrupt_state(&self.path, msg))?;

        log(
            LogLevel::Info,
            &format!(
                "Loaded {} record(s) covering {} page(s) from {}",
                set.len(),
                set.done_pages().len(),
                self.path.display()
            ),
        );
        Ok(set)
    }

    /// Rewrites the whole collection.
    pub async fn save(&self, set: &ProgressSet) -> AppResult<()> {
        let log_ctx = format!("progress ({} records)", set.len());
        io::save_json(&self.path, Arc::clone(&set.records), &log_ctx).await
    }
}
