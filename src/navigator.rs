//! Page-level traversal
//!
//! The navigator knows when a page's table is ready, walks its main rows (expanding and
//! collapsing them on the way), and moves to the next page.

use crate::browser::{ClickMethod, ElementRef, PageDriver};
use crate::config::HarvestConfig;
use crate::error::Result;
use crate::extract::row::{is_main_class, is_main_row};
use crate::extract::{DetailExtractor, Expander, RecordBuilder, toggle};
use crate::locate::locate_all;
use crate::model::{FailureEntry, Level, PageOutcome};
use crate::poll::{pause, poll_until};

/// What child identification needs to know about a row following a parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSummary {
    pub class: Option<String>,
    /// Trimmed text of the whole row
    pub text: String,
    /// Trimmed text of the code cell, `None` when the row is too short
    pub code: Option<String>,
}

impl RowSummary {
    pub fn new(class: Option<&str>, text: &str, code: Option<&str>) -> Self {
        Self { class: class.map(str::to_string), text: text.to_string(), code: code.map(str::to_string) }
    }
}

/// Verdict on one row after an expanded parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Following {
    /// Next main row or a blank separator: the child block is over
    Stop,
    Child,
    /// Decorative or malformed row inside the block
    Skip,
}

pub fn classify_following(row: &RowSummary, min_code_len: usize) -> Following {
    if is_main_class(row.class.as_deref()) || row.text.trim().is_empty() {
        return Following::Stop;
    }
    match &row.code {
        Some(code) if code.trim().chars().count() > min_code_len => Following::Child,
        _ => Following::Skip,
    }
}

/// Offsets of the children among the verdicts for the rows after a parent.
///
/// Verdicts are pulled lazily and nothing past the first `Stop` is read.
pub fn scan_children(verdicts: impl IntoIterator<Item = Following>) -> Vec<usize> {
    let mut children = Vec::new();
    for (offset, verdict) in verdicts.into_iter().enumerate() {
        match verdict {
            Following::Stop => break,
            Following::Child => children.push(offset),
            Following::Skip => continue,
        }
    }
    children
}

/// Positions of the child rows belonging to the parent at `parent_pos`
pub fn child_span(rows: &[RowSummary], parent_pos: usize, min_code_len: usize) -> Vec<usize> {
    let start = parent_pos + 1;
    let verdicts = rows.iter().skip(start).map(|row| classify_following(row, min_code_len));
    scan_children(verdicts).into_iter().map(|offset| start + offset).collect()
}

/// Rows found under an expanded parent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildRows {
    pub children: Vec<ElementRef>,
    /// Rows inside the block that could not be read, with the reason
    pub unreadable: Vec<(ElementRef, String)>,
}

pub struct Navigator<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    config: &'a HarvestConfig,
}

impl<'a, D: PageDriver + ?Sized> Navigator<'a, D> {
    pub fn new(driver: &'a D, config: &'a HarvestConfig) -> Self {
        Self { driver, config }
    }

    fn rows(&self) -> Result<Vec<ElementRef>> {
        locate_all(self.driver, &self.config.table.row_queries, None).map(|located| located.elements)
    }

    /// First row present, non-blank and free of loading markers
    fn data_ready(&self) -> Result<bool> {
        let rows = self.rows()?;
        let Some(&first) = rows.first() else { return Ok(false) };
        let text = self.driver.text_content(first)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        Ok(!self.config.table.loading_markers.iter().any(|marker| text.contains(marker.as_str())))
    }

    /// Wait until page `page` shows real data rows
    pub fn wait_for_data(&self, page: u32) -> bool {
        let timing = &self.config.timing;
        if let Err(e) = self.driver.wait_for_network_idle(timing.network_idle_timeout()) {
            log::warn!("Network did not settle on page {}: {}", page, e);
        }

        let ready = poll_until(timing.load_budget, |attempt| match self.data_ready() {
            Ok(true) => Some(()),
            Ok(false) => {
                log::debug!("Page {} not ready yet (attempt {})", page, attempt + 1);
                None
            }
            Err(e) => {
                log::debug!("Page {} not ready yet (attempt {}): {}", page, attempt + 1, e);
                None
            }
        })
        .is_some();

        if ready {
            log::info!("Page {} loaded", page);
        } else {
            log::warn!("Page {} never showed data rows", page);
        }
        ready
    }

    /// Extract every main row of the current page along with its children
    pub fn process_page(&self, page: u32) -> PageOutcome {
        let mut outcome = PageOutcome::new(page);
        let detail = DetailExtractor::new(self.driver, &self.config.detail);
        let builder = RecordBuilder::new(self.driver, &self.config.table.layout, &detail);
        let expander = Expander::new(self.driver, &self.config.table.row_queries, &self.config.expand, &detail);

        let rows = match self.rows() {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("No rows on page {}: {}", page, e);
                return outcome;
            }
        };

        let main_rows: Vec<ElementRef> = rows.into_iter().filter(|&row| is_main_row(self.driver, row)).collect();
        log::info!("Page {}: {} main row(s)", page, main_rows.len());

        for (index, &row) in main_rows.iter().enumerate() {
            log::debug!("Main row {}/{}", index + 1, main_rows.len());
            self.process_main_row(row, &builder, &expander, &mut outcome);
            pause(self.config.timing.row_delay());
        }

        log::info!(
            "Page {} done: {} record(s), {} failure(s)",
            page,
            outcome.records.len(),
            outcome.failures.len()
        );
        outcome
    }

    fn process_main_row(
        &self,
        row: ElementRef,
        builder: &RecordBuilder<'_, D>,
        expander: &Expander<'_, D>,
        outcome: &mut PageOutcome,
    ) {
        let record = match builder.build(row, None, Level::Top, outcome) {
            Ok(Some(record)) => record,
            Ok(None) => {
                log::debug!("Skipping row {} without code or name", row);
                return;
            }
            Err(failure) => {
                log::error!("Row {} on page {} failed: {}", row, outcome.page, failure.reason);
                outcome.failures.push(failure);
                return;
            }
        };
        let code = record.code.clone();
        let parent_index = outcome.records.len();
        outcome.records.push(record);

        let Some(control) = toggle::detect(self.driver, row) else { return };
        // Read before expanding; the fallback for finding the parent again needs it
        let class = self.driver.attribute(row, "class").ok().flatten();
        if !expander.expand(&control).is_expanded() {
            return;
        }

        match self.identify_children(row, class.as_deref()) {
            Ok(ChildRows { children, unreadable }) => {
                log::info!("  {} child row(s) under {}", children.len(), code);
                for (child, reason) in unreadable {
                    let reason = format!("child of {}: row {} unreadable: {}", code, child, reason);
                    outcome.failures.push(FailureEntry::new("", outcome.page, reason));
                }
                for child in children {
                    match builder.build(child, Some(code.as_str()), Level::Child, outcome) {
                        Ok(Some(record)) => {
                            outcome.records.push(record);
                            outcome.records[parent_index].is_parent = true;
                        }
                        Ok(None) => log::debug!("Skipping child row {} without code or name", child),
                        Err(mut failure) => {
                            log::error!("Child row {} of {} failed: {}", child, code, failure.reason);
                            failure.reason = format!("child of {}: {}", code, failure.reason);
                            outcome.failures.push(failure);
                        }
                    }
                    pause(self.config.timing.child_delay());
                }
            }
            Err(e) => {
                log::error!("Could not identify children of {}: {}", code, e);
                outcome.failures.push(FailureEntry::new(code.as_str(), outcome.page, e.to_string()));
            }
        }

        expander.collapse(control.element);
    }

    fn summarise(&self, row: ElementRef) -> Result<RowSummary> {
        let cells = self.driver.query_all(Some(row), "td")?;
        let code = match cells.get(self.config.table.layout.code_cell) {
            Some(&cell) => Some(self.driver.text_content(cell)?.trim().to_string()),
            None => None,
        };
        Ok(RowSummary {
            class: self.driver.attribute(row, "class")?,
            text: self.driver.text_content(row)?.trim().to_string(),
            code,
        })
    }

    /// Rows revealed under `parent` after expansion, in document order.
    ///
    /// The parent is found again in a fresh row list by handle, then by class; rows are
    /// read one at a time until the child block ends. A row that cannot be read is
    /// reported and skipped.
    pub fn identify_children(&self, parent: ElementRef, parent_class: Option<&str>) -> Result<ChildRows> {
        let rows = self.rows()?;

        let parent_pos = match rows.iter().position(|&row| row == parent) {
            Some(position) => Some(position),
            None => self.position_by_class(&rows, parent_class)?,
        };
        let Some(parent_pos) = parent_pos else {
            log::warn!("Lost track of parent row {} after expansion", parent);
            return Ok(ChildRows::default());
        };

        let min_code_len = self.config.table.min_child_code_len;
        let following = &rows[parent_pos + 1..];
        let mut unreadable = Vec::new();
        let verdicts = following.iter().map(|&row| match self.summarise(row) {
            Ok(summary) => {
                let verdict = classify_following(&summary, min_code_len);
                if verdict == Following::Skip {
                    log::debug!("Skipping non-data row {} inside child block", row);
                }
                verdict
            }
            Err(e) => {
                log::warn!("Could not read row {} after parent {}: {}", row, parent, e);
                unreadable.push((row, e.to_string()));
                Following::Skip
            }
        });

        let children = scan_children(verdicts).into_iter().map(|offset| following[offset]).collect();
        Ok(ChildRows { children, unreadable })
    }

    fn position_by_class(&self, rows: &[ElementRef], class: Option<&str>) -> Result<Option<usize>> {
        let Some(class) = class else { return Ok(None) };
        for (position, &row) in rows.iter().enumerate() {
            if self.driver.attribute(row, "class")?.as_deref() == Some(class) {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Click the control leading to page `current + 1`; `false` when there is none
    pub fn advance(&self, current: u32) -> bool {
        let next = current + 1;
        for query in self.config.pagination.candidates(next) {
            let Ok(found) = query.run(self.driver, None) else { continue };
            let Some(&control) = found.first() else { continue };

            match self.driver.click(control, ClickMethod::Native) {
                Ok(()) => {
                    log::info!("Moving to page {} via {}", next, query);
                    return true;
                }
                Err(e) => log::debug!("Pagination control {} did not accept a click: {}", query, e),
            }
        }

        log::info!("No control leads past page {}", current);
        false
    }
}
