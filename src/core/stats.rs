use crate::api::model::PageNumber;
use crate::core::scheduler::WindowReport;
use crate::logging::{log, LogLevel};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total_windows: usize,
    pub windows_processed: usize,
    pub windows_skipped: usize,
    pub pages_with_records: usize,
    pub pages_empty: usize,
    pub failed_pages: Vec<PageNumber>,
    pub records_added: usize,
    pub saves: usize,
    pub total_records: usize,
}

impl RunStats {
    pub fn new(total_windows: usize) -> Self {
        RunStats {
            total_windows,
            ..Default::default()
        }
    }

    pub fn add_skip(&mut self) {
        self.windows_skipped += 1;
    }

    pub fn add_window(&mut self, report: &WindowReport) {
        self.windows_processed += 1;
        self.saves += 1;
        self.pages_with_records += report.with_records.len();
        self.pages_empty += report.empty.len();
        self.failed_pages.extend_from_slice(&report.failed);
        self.records_added += report.records_added;
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_with_records + self.pages_empty + self.failed_pages.len()
    }
}

pub fn print_summary(stats: &RunStats, duration: Duration) {
    let sep = "=".repeat(60);
    println!("\n{}\n{:^60}\n{}", sep, "Harvest Summary", sep);
    println!("Total Run Time:    {:.3?}", duration);
    println!("{}", "-".repeat(60));

    println!("{:<24} {:<8}", "Category", "Count");
    println!("{}", "-".repeat(60));
    let rows = [
        ("Windows (total)", stats.total_windows),
        ("Windows processed", stats.windows_processed),
        ("Windows skipped", stats.windows_skipped),
        ("Pages with records", stats.pages_with_records),
        ("Pages empty", stats.pages_empty),
        ("Pages failed", stats.failed_pages.len()),
        ("Records added", stats.records_added),
        ("Saves", stats.saves),
        ("Records total", stats.total_records),
    ];
    for (name, count) in rows {
        println!("{:<24} {:<8}", name, count);
    }
    println!("{}", sep);

    log_overall_status(stats);

    let end_ts_str = chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string();
    log(
        LogLevel::Step,
        &format!("--- Run Finished at {} ---", end_ts_str),
    );
}

fn log_overall_status(stats: &RunStats) {
    if stats.failed_pages.is_empty() {
        log(
            LogLevel::Success,
            &format!("Run completed. {} record(s) total.", stats.total_records),
        );
    } else {
        let listed: Vec<String> = stats.failed_pages.iter().map(ToString::to_string).collect();
        log(
            LogLevel::Warning,
            &format!(
                "Run completed with {} record(s); {} page(s) failed every retry and will be refetched next run: {}",
                stats.total_records,
                stats.failed_pages.len(),
                listed.join(", ")
            ),
        );
    }
}
