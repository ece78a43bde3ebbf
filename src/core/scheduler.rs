use crate::api::client::PageSource;
use crate::api::model::{PageNumber, PageOutcome, PageResult};
use crate::core::store::{ProgressSet, ProgressStore};
use crate::error::AppResult;
use crate::logging::{log, LogLevel};
use crate::utils;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What happened to each page of one window.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WindowReport {
    pub with_records: Vec<PageNumber>,
    pub empty: Vec<PageNumber>,
    pub failed: Vec<PageNumber>,
    pub records_added: usize,
}

impl WindowReport {
    fn record(&mut self, result: &PageResult) {
        match result.outcome {
            PageOutcome::Failed => self.failed.push(result.page),
            PageOutcome::Fetched if result.records.is_empty() => self.empty.push(result.page),
            PageOutcome::Fetched => self.with_records.push(result.page),
        }
        self.records_added += result.records.len();
    }

    fn sort(&mut self) {
        self.with_records.sort_unstable();
        self.empty.sort_unstable();
        self.failed.sort_unstable();
    }
}

/// Fans a window's pages out to a [`PageSource`] behind one admission gate that lives for the
/// whole run.
pub struct BatchScheduler<S: PageSource + 'static> {
    source: Arc<S>,
    gate: Arc<Semaphore>,
    store: Arc<ProgressStore>,
}

impl<S: PageSource + 'static> BatchScheduler<S> {
    pub fn new(source: Arc<S>, concurrency: usize, store: Arc<ProgressStore>) -> Self {
        BatchScheduler {
            source,
            gate: Arc::new(Semaphore::new(concurrency.max(1))),
            store,
        }
    }

    /// Fetches `pages` concurrently, merges them into `accumulated` by ascending page, and
    /// persists the result before returning. Only the save can fail.
    pub async fn process_window(
        &self,
        pages: &[PageNumber],
        accumulated: &mut ProgressSet,
    ) -> AppResult<WindowReport> {
        let mut tasks = JoinSet::new();
        for &page in pages {
            let source = self.source.clone();
            let gate = self.gate.clone();
            tasks.spawn(async move {
                let permit = match utils::acquire_semaphore(&gate, "Page Fetch").await {
                    Ok(permit) => permit,
                    Err(e) => {
                        log(LogLevel::Error, &format!("Page {}: {}", page, e));
                        return PageResult::failed(page);
                    }
                };
                let result = source.fetch(page).await;
                drop(permit);
                result
            });
        }

        let mut results = Vec::with_capacity(pages.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => log(
                    LogLevel::Error,
                    &format!("Page fetch task panicked: {}", e),
                ),
            }
        }

        // A panicked task leaves no result behind; count its page as failed.
        let returned: BTreeSet<PageNumber> = results.iter().map(|r| r.page).collect();
        for &page in pages {
            if !returned.contains(&page) {
                results.push(PageResult::failed(page));
            }
        }

        let mut report = WindowReport::default();
        for result in &results {
            report.record(result);
        }
        report.sort();

        accumulated.merge(results);
        self.store.save(accumulated).await?;
        log(
            LogLevel::Success,
            &format!(
                "Saved batch: +{} record(s), {} total -> {}",
                report.records_added,
                accumulated.len(),
                self.store.path().display()
            ),
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records peak concurrency; pages in `fail` come back failed, later pages finish first.
    #[derive(Default)]
    struct ProbeSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        fail: HashSet<PageNumber>,
    }

    #[async_trait]
    impl PageSource for ProbeSource {
        async fn fetch(&self, page: PageNumber) -> PageResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = 40u64.saturating_sub(u64::from(page % 8) * 5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail.contains(&page) {
                PageResult::failed(page)
            } else {
                PageResult::fetched(page, vec![json!({ "title": format!("item {}", page) })])
            }
        }
    }

    fn scheduler(
        source: Arc<ProbeSource>,
        concurrency: usize,
        dir: &tempfile::TempDir,
    ) -> BatchScheduler<ProbeSource> {
        let store = Arc::new(ProgressStore::new(dir.path().join("out.json")));
        BatchScheduler::new(source, concurrency, store)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_never_exceeds_cap() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ProbeSource::default());
        let sched = scheduler(source.clone(), 3, &dir);
        let mut set = ProgressSet::default();

        let pages: Vec<PageNumber> = (1..=17).collect();
        sched.process_window(&pages, &mut set).await.unwrap();

        assert!(source.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(source.calls.load(Ordering::SeqCst), 17);
        assert_eq!(set.len(), 17);
    }

    #[tokio::test]
    async fn merge_is_page_ordered_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ProbeSource::default());
        let sched = scheduler(source, 10, &dir);
        let mut set = ProgressSet::default();

        sched.process_window(&[1, 2, 3, 4, 5], &mut set).await.unwrap();
        sched.process_window(&[6, 7, 8], &mut set).await.unwrap();

        let pages: Vec<_> = set.records().iter().filter_map(|r| r.page()).collect();
        assert_eq!(pages, vec![1, 2, 3, 4, 5, 6, 7, 8]);

        let reloaded = ProgressStore::new(dir.path().join("out.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 8);
    }

    #[tokio::test]
    async fn failed_page_does_not_block_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ProbeSource {
            fail: [2].into_iter().collect(),
            ..Default::default()
        });
        let sched = scheduler(source, 2, &dir);
        let mut set = ProgressSet::default();

        let report = sched.process_window(&[1, 2, 3], &mut set).await.unwrap();

        assert_eq!(report.failed, vec![2]);
        assert_eq!(report.with_records, vec![1, 3]);
        assert_eq!(report.records_added, 2);
        assert!(!set.is_done(2));
    }

    #[tokio::test]
    async fn save_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ProgressStore::new(dir.path()));
        let sched = BatchScheduler::new(Arc::new(ProbeSource::default()), 2, store);
        let mut set = ProgressSet::default();
        assert!(sched.process_window(&[1], &mut set).await.is_err());
    }
}
