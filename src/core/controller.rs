use crate::api::client::{FetchClient, PageSource};
use crate::api::credentials::CredentialSource;
use crate::api::model::PageNumber;
use crate::config::HarvestConfig;
use crate::core::scheduler::BatchScheduler;
use crate::core::stats::{self, RunStats};
use crate::core::store::ProgressStore;
use crate::core::window;
use crate::error::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Loading,
    Running { window: usize },
    Done,
    Fatal,
}

#[derive(Debug, Clone, Copy)]
pub struct RunPlan {
    pub total_pages: PageNumber,
    pub batch_size: u32,
    pub window_delay: Duration,
}

impl From<&HarvestConfig> for RunPlan {
    fn from(cfg: &HarvestConfig) -> Self {
        RunPlan {
            total_pages: cfg.total_pages,
            batch_size: cfg.batch_size,
            window_delay: cfg.window_delay(),
        }
    }
}

pub struct RunController<S: PageSource + 'static> {
    plan: RunPlan,
    store: Arc<ProgressStore>,
    scheduler: BatchScheduler<S>,
    state: RunState,
}

impl<S: PageSource + 'static> RunController<S> {
    pub fn new(plan: RunPlan, source: Arc<S>, concurrency: usize, store: Arc<ProgressStore>) -> Self {
        RunController {
            plan,
            scheduler: BatchScheduler::new(source, concurrency, store.clone()),
            store,
            state: RunState::Init,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn fatal(&mut self, e: AppError) -> AppError {
        self.state = RunState::Fatal;
        log(LogLevel::Error, &format!("Run aborted: {}", e));
        e
    }

    /// Loads progress and walks every window in order. Windows whose pages are all present are
    /// skipped without fetching or saving.
    pub async fn run(&mut self) -> AppResult<RunStats> {
        self.state = RunState::Loading;
        let mut progress = match self.store.load().await {
            Ok(p) => p,
            Err(e) => return Err(self.fatal(e)),
        };

        let windows = window::partition(self.plan.total_pages, self.plan.batch_size);
        let total_windows = windows.len();
        let mut run_stats = RunStats::new(total_windows);

        for (idx, win) in windows.iter().enumerate() {
            self.state = RunState::Running { window: idx + 1 };

            let pending = win.pending_pages(progress.done_pages());
            if pending.is_empty() {
                log(
                    LogLevel::Info,
                    &format!(
                        "Window {}/{} (pages {}-{}) already harvested. Skipping.",
                        idx + 1,
                        total_windows,
                        win.start_page,
                        win.end_page
                    ),
                );
                run_stats.add_skip();
                continue;
            }

            log(
                LogLevel::Step,
                &format!(
                    "--- Window {}/{}: pages {}-{} ({} to fetch) ---",
                    idx + 1,
                    total_windows,
                    win.start_page,
                    win.end_page,
                    pending.len()
                ),
            );

            match self.scheduler.process_window(&pending, &mut progress).await {
                Ok(report) => run_stats.add_window(&report),
                Err(e) => return Err(self.fatal(e)),
            }

            if idx + 1 < total_windows && !self.plan.window_delay.is_zero() {
                sleep(self.plan.window_delay).await;
            }
        }

        run_stats.total_records = progress.len();
        self.state = RunState::Done;
        Ok(run_stats)
    }
}

pub async fn run(cfg: HarvestConfig, credentials: Arc<dyn CredentialSource>) -> AppResult<RunStats> {
    let start_time = Instant::now();
    let start_ts_str = Utc::now().format("%Y-%m-%d %H:%M:%S %Z").to_string();

    log(
        LogLevel::Step,
        &format!(
            "Starting harvest of {} page(s) in windows of {} at {}",
            cfg.total_pages, cfg.batch_size, start_ts_str
        ),
    );
    log(
        LogLevel::Info,
        &format!(
            "Endpoint: {} | Output: {} | Concurrency: {}",
            cfg.request.endpoint,
            cfg.output.display(),
            cfg.concurrency
        ),
    );

    // Fail before any network traffic if the session material is unusable.
    credentials.credentials()?;

    let client = Arc::new(FetchClient::new(&cfg, credentials)?);
    let policy = client.policy();
    log(
        LogLevel::Info,
        &format!(
            "Per-attempt timeout {:?}, up to {} retries with delays {:?}",
            policy.attempt_timeout,
            policy.max_retries,
            policy.schedule()
        ),
    );

    let store = Arc::new(ProgressStore::new(cfg.output.clone()));
    let mut controller = RunController::new(RunPlan::from(&cfg), client, cfg.concurrency, store);
    let run_stats = controller.run().await?;

    stats::print_summary(&run_stats, start_time.elapsed());
    Ok(run_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::model::{PageResult, Record};
    use crate::core::store::ProgressSet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedSource {
        calls: Mutex<Vec<PageNumber>>,
        failing: HashSet<PageNumber>,
    }

    impl ScriptedSource {
        fn calls(&self) -> Vec<PageNumber> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort_unstable();
            calls
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch(&self, page: PageNumber) -> PageResult {
            self.calls.lock().unwrap().push(page);
            if self.failing.contains(&page) {
                return PageResult::failed(page);
            }
            PageResult::fetched(page, vec![json!({ "ref": format!("R-{}", page) })])
        }
    }

    fn plan(total_pages: PageNumber, batch_size: u32) -> RunPlan {
        RunPlan {
            total_pages,
            batch_size,
            window_delay: Duration::from_millis(1),
        }
    }

    fn controller(
        path: &Path,
        total: PageNumber,
        batch: u32,
        source: Arc<ScriptedSource>,
    ) -> RunController<ScriptedSource> {
        RunController::new(
            plan(total, batch),
            source,
            4,
            Arc::new(ProgressStore::new(path)),
        )
    }

    async fn seed(path: &Path, pages: impl IntoIterator<Item = PageNumber>) {
        let mut set = ProgressSet::default();
        set.merge(
            pages
                .into_iter()
                .map(|p| PageResult::fetched(p, vec![json!({ "ref": format!("R-{}", p) })]))
                .collect(),
        );
        ProgressStore::new(path).save(&set).await.unwrap();
    }

    #[tokio::test]
    async fn full_run_covers_every_page_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let source = Arc::new(ScriptedSource::default());
        let mut ctl = controller(&path, 25, 10, source.clone());

        let stats = ctl.run().await.unwrap();

        assert_eq!(ctl.state(), RunState::Done);
        assert_eq!(stats.total_windows, 3);
        assert_eq!(stats.windows_processed, 3);
        assert_eq!(stats.total_records, 25);
        assert_eq!(source.calls(), (1..=25).collect::<Vec<_>>());

        let stored = ProgressStore::new(&path).load().await.unwrap();
        assert_eq!(
            stored.done_pages().iter().copied().collect::<Vec<_>>(),
            (1..=25).collect::<Vec<_>>()
        );
        let pages: Vec<_> = stored.records().iter().filter_map(Record::page).collect();
        assert!(pages.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn rerun_of_completed_output_fetches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        seed(&path, 1..=10).await;

        let source = Arc::new(ScriptedSource::default());
        let mut ctl = controller(&path, 10, 3, source.clone());
        let stats = ctl.run().await.unwrap();

        assert_eq!(ctl.state(), RunState::Done);
        assert!(source.calls().is_empty());
        assert_eq!(stats.windows_skipped, 4);
        assert_eq!(stats.saves, 0);
        assert_eq!(stats.total_records, 10);
    }

    #[tokio::test]
    async fn resume_fetches_only_missing_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        // Window one saved, window two partially present.
        seed(&path, (1..=10).chain([11, 12])).await;

        let source = Arc::new(ScriptedSource::default());
        let mut ctl = controller(&path, 25, 10, source.clone());
        let stats = ctl.run().await.unwrap();

        assert_eq!(source.calls(), (13..=25).collect::<Vec<_>>());
        assert_eq!(stats.windows_skipped, 1);
        assert_eq!(stats.total_records, 25);
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let first = Arc::new(ScriptedSource::default());
        let stats1 = controller(&path, 12, 5, first).run().await.unwrap();

        let second = Arc::new(ScriptedSource::default());
        let stats2 = controller(&path, 12, 5, second.clone()).run().await.unwrap();

        assert!(second.calls().is_empty());
        assert_eq!(stats1.total_records, stats2.total_records);
    }

    #[tokio::test]
    async fn failed_pages_are_reported_and_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");

        let flaky = Arc::new(ScriptedSource {
            failing: [4, 7].into_iter().collect(),
            ..Default::default()
        });
        let stats = controller(&path, 8, 4, flaky).run().await.unwrap();
        assert_eq!(stats.failed_pages, vec![4, 7]);
        assert_eq!(stats.total_records, 6);

        let healthy = Arc::new(ScriptedSource::default());
        let stats = controller(&path, 8, 4, healthy.clone()).run().await.unwrap();
        assert_eq!(healthy.calls(), vec![4, 7]);
        assert_eq!(stats.total_records, 8);

        let stored = ProgressStore::new(&path).load().await.unwrap();
        let pages: Vec<_> = stored.records().iter().filter_map(Record::page).collect();
        assert_eq!(pages, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn corrupt_progress_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, "not json at all").unwrap();

        let source = Arc::new(ScriptedSource::default());
        let mut ctl = controller(&path, 5, 5, source.clone());
        let err = ctl.run().await.unwrap_err();

        assert!(matches!(err, AppError::CorruptState { .. }));
        assert_eq!(ctl.state(), RunState::Fatal);
        assert!(source.calls().is_empty());
        // The corrupt file must not be overwritten.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json at all");
    }

    #[tokio::test]
    async fn unusable_storage_path_moves_to_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ScriptedSource::default());
        let mut ctl = controller(dir.path(), 3, 3, source);
        assert!(ctl.run().await.is_err());
        assert_eq!(ctl.state(), RunState::Fatal);
    }
}
