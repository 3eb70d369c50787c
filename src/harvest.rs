//! Extraction session: drives the navigator page by page and owns the run state

use crate::browser::PageDriver;
use crate::config::HarvestConfig;
use crate::error::Result;
use crate::model::SessionState;
use crate::navigator::Navigator;
use crate::output::RecordSink;
use crate::poll::pause;
use chrono::Utc;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Page never showed data rows; nothing from it was collected
    NotReady(u32),
    /// No control leads past this page
    LastPage(u32),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NotReady(page) => write!(f, "page {} never loaded", page),
            StopReason::LastPage(page) => write!(f, "page {} is the last page", page),
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestReport {
    /// Last page whose data was processed
    pub last_page: u32,
    pub main_records: usize,
    pub child_records: usize,
    pub parent_records: usize,
    pub failures: usize,
    pub processed: u64,
    pub success_ratio: Option<f64>,
    pub stop: StopReason,
    pub elapsed: Duration,
}

impl HarvestReport {
    fn new(state: &SessionState, stop: StopReason, elapsed: Duration) -> Self {
        Self {
            last_page: state.current_page,
            main_records: state.main_count(),
            child_records: state.child_count(),
            parent_records: state.parent_count(),
            failures: state.failures.len(),
            processed: state.processed,
            success_ratio: state.success_ratio(),
            stop,
            elapsed,
        }
    }

    pub fn total_records(&self) -> usize {
        self.main_records + self.child_records
    }
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} record(s) ({} main, {} child, {} with children), {} failure(s) in {:.1}s; stopped because {}",
            self.total_records(),
            self.main_records,
            self.child_records,
            self.parent_records,
            self.failures,
            self.elapsed.as_secs_f64(),
            self.stop
        )?;
        if let Some(ratio) = self.success_ratio {
            write!(f, "; success rate {:.1}%", ratio * 100.0)?;
        }
        Ok(())
    }
}

/// Save a viewport snapshot into `dir`; does nothing without a directory
pub fn capture_diagnostic<D: PageDriver + ?Sized>(driver: &D, dir: Option<&Path>, label: &str) -> Option<PathBuf> {
    let dir = dir?;
    let saved = driver.capture_screenshot().and_then(|png| {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_{}.png", label, Utc::now().format("%Y%m%d_%H%M%S")));
        fs::write(&path, png)?;
        Ok(path)
    });

    match saved {
        Ok(path) => {
            log::warn!("Diagnostic snapshot saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            log::warn!("Could not capture diagnostic snapshot: {}", e);
            None
        }
    }
}

/// Runs a whole extraction against one page driver
pub struct Harvester<'a, D: PageDriver + ?Sized, S: RecordSink> {
    driver: &'a D,
    config: HarvestConfig,
    sink: S,
}

impl<'a, D: PageDriver + ?Sized, S: RecordSink> Harvester<'a, D, S> {
    pub fn new(driver: &'a D, config: HarvestConfig, sink: S) -> Self {
        Self { driver, config, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn not_ready(&self, page: u32) -> StopReason {
        let label = format!("page_{}_not_ready", page);
        capture_diagnostic(self.driver, self.config.output.diagnostics_dir.as_deref(), &label);
        StopReason::NotReady(page)
    }

    /// Extract every reachable page.
    ///
    /// Only failing to open the start URL is an error; anything later ends the run with
    /// whatever was collected so far. The run stops when no control leads to a next page
    /// or when a page never shows data.
    pub fn run(&mut self) -> Result<(HarvestReport, SessionState)> {
        let started = Instant::now();
        let mut state = SessionState::new();
        let navigator = Navigator::new(self.driver, &self.config);

        log::info!("Opening {}", self.config.start_url);
        self.driver.navigate(&self.config.start_url)?;

        let stop = if navigator.wait_for_data(state.current_page) {
            loop {
                let page = state.current_page;
                let outcome = navigator.process_page(page);
                let has_records = !outcome.records.is_empty();
                let first_new = state.records.len();
                state.absorb(outcome);

                if has_records {
                    if let Err(e) = self.sink.page_completed(page, &state.records[first_new..], &state.records) {
                        log::error!("Could not save page {}: {}", page, e);
                    }
                } else {
                    log::info!("Page {} yielded no records", page);
                }
                if !navigator.advance(page) {
                    break StopReason::LastPage(page);
                }

                pause(self.config.timing.page_delay());
                if !navigator.wait_for_data(page + 1) {
                    break self.not_ready(page + 1);
                }
                state.current_page += 1;
            }
        } else {
            self.not_ready(state.current_page)
        };

        if let Err(e) = self.sink.finished(&state) {
            log::error!("Could not save results: {}", e);
        }

        let report = HarvestReport::new(&state, stop, started.elapsed());
        log::info!("Harvest finished: {}", report);
        Ok((report, state))
    }
}
