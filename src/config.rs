//! Harvest configuration
//!
//! Every field has a default matching the procedure-code table the tool was written
//! for, so an empty JSON object is a valid configuration file.

use crate::error::{HarvestError, Result};
use crate::locate::Query;
use crate::poll::PollBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_START_URL: &str = "https://www.koicd.kr/ins/act.do";

/// Complete a URL typed without a scheme; URLs with one pass through trimmed
pub fn normalize_start_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.contains("://") || trimmed.starts_with("data:") || trimmed.starts_with("about:") {
        return trimmed.to_string();
    }
    if trimmed.starts_with("localhost") || trimmed.starts_with("127.0.0.1") {
        return format!("http://{}", trimmed);
    }
    format!("https://{}", trimmed)
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub start_url: String,
    pub table: TableConfig,
    pub detail: DetailConfig,
    pub expand: ExpandConfig,
    pub pagination: PaginationConfig,
    pub timing: TimingConfig,
    pub output: OutputConfig,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            table: TableConfig::default(),
            detail: DetailConfig::default(),
            expand: ExpandConfig::default(),
            pagination: PaginationConfig::default(),
            timing: TimingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl HarvestConfig {
    /// Load from a JSON file; missing fields fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| HarvestError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_url.trim().is_empty() {
            return Err(HarvestError::Config("start_url must not be empty".to_string()));
        }
        if self.table.row_queries.is_empty() {
            return Err(HarvestError::Config("table.row_queries must list at least one query".to_string()));
        }
        let layout = &self.table.layout;
        if layout.code_cell >= layout.min_cells || layout.name_cell >= layout.min_cells {
            return Err(HarvestError::Config(format!(
                "code_cell ({}) and name_cell ({}) must lie below min_cells ({})",
                layout.code_cell, layout.name_cell, layout.min_cells
            )));
        }
        Ok(())
    }

    /// Builder method: set the first page URL, adding `https://` to bare hosts
    pub fn with_start_url(mut self, url: impl AsRef<str>) -> Self {
        self.start_url = normalize_start_url(url.as_ref());
        self
    }

    /// Drop every fixed delay and polling interval, keeping attempt counts
    pub fn without_delays(mut self) -> Self {
        self.detail.open_settle_ms = 0;
        self.detail.dismiss_settle_ms = 0;
        self.detail.panel_budget = self.detail.panel_budget.without_delay();
        self.expand.confirm_budget = self.expand.confirm_budget.without_delay();
        self.expand.function_budget = self.expand.function_budget.without_delay();
        self.expand.collapse_settle_ms = 0;
        self.timing.network_idle_timeout_ms = 0;
        self.timing.load_budget = self.timing.load_budget.without_delay();
        self.timing.row_delay_ms = 0;
        self.timing.child_delay_ms = 0;
        self.timing.page_delay_ms = 0;
        self
    }
}

/// Where the rows live and how cells map onto fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Candidate queries for the data rows, most specific first
    pub row_queries: Vec<Query>,

    pub layout: RowLayout,

    /// First-row text fragments that mean the table is still being filled
    pub loading_markers: Vec<String>,

    /// A child row needs a code cell longer than this many characters
    pub min_child_code_len: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            row_queries: vec![
                Query::css("table.act_table tbody tr"),
                Query::css("#container table tbody tr"),
                Query::css("table tbody tr"),
            ],
            layout: RowLayout::default(),
            loading_markers: vec!["로딩".to_string(), "처리중".to_string(), "Loading".to_string()],
            min_child_code_len: 2,
        }
    }
}

/// Fixed cell positions of a data row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RowLayout {
    pub min_cells: usize,
    pub code_cell: usize,
    pub name_cell: usize,
    /// Column name the name cell is stored under
    pub name_label: String,
    /// Further cells copied verbatim into the base fields
    pub extra_cells: Vec<ExtraCell>,
}

impl Default for RowLayout {
    fn default() -> Self {
        Self { min_cells: 3, code_cell: 1, name_cell: 2, name_label: "name".to_string(), extra_cells: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCell {
    pub index: usize,
    pub label: String,
}

/// Detail panel lookup, parsing and dismissal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// How many leading cells are tried when opening the panel
    pub click_cells: usize,

    pub panel_queries: Vec<Query>,

    /// Texts of buttons that close the panel
    pub close_labels: Vec<String>,

    /// Close controls recognised by structure rather than label
    pub close_queries: Vec<Query>,

    pub open_settle_ms: u64,

    pub panel_budget: PollBudget,

    pub dismiss_settle_ms: u64,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            click_cells: 3,
            panel_queries: vec![
                Query::css(".div_table_style").visible(),
                Query::css(".popup").visible(),
                Query::css(".modal").visible(),
                Query::css("div[style*='display: block']").visible(),
                Query::css("table[class*='popup']").visible(),
            ],
            close_labels: vec!["닫기".to_string(), "Close".to_string(), "×".to_string()],
            close_queries: vec![
                Query::css(".close").visible(),
                Query::css(".popup-close").visible(),
                Query::css("button[onclick*='close']").visible(),
            ],
            open_settle_ms: 1_000,
            panel_budget: PollBudget::new(10, 500),
            dismiss_settle_ms: 500,
        }
    }
}

impl DetailConfig {
    /// Labelled close buttons first, then the structural close controls
    pub fn close_candidates(&self) -> Vec<Query> {
        self.close_labels
            .iter()
            .map(|label| Query::css("button").containing(label.as_str()).visible())
            .chain(self.close_queries.iter().cloned())
            .collect()
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn dismiss_settle(&self) -> Duration {
        Duration::from_millis(self.dismiss_settle_ms)
    }
}

/// Expand-control actuation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    /// Floating panels that may pop up instead of child rows
    pub popup_queries: Vec<Query>,

    /// Row-count confirmation after each click method
    pub confirm_budget: PollBudget,

    /// Row-count confirmation after invoking a page function
    pub function_budget: PollBudget,

    pub collapse_settle_ms: u64,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            popup_queries: vec![
                Query::css(".div_table_style").visible(),
                Query::css(".popup").visible(),
                Query::css(".modal").visible(),
            ],
            confirm_budget: PollBudget::new(20, 500),
            function_budget: PollBudget::new(3, 500),
            collapse_settle_ms: 500,
        }
    }
}

impl ExpandConfig {
    pub fn collapse_settle(&self) -> Duration {
        Duration::from_millis(self.collapse_settle_ms)
    }
}

/// Next-page control lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub next_labels: Vec<String>,
    pub next_glyph: String,
    /// Tried after every label and glyph candidate
    pub fallback_queries: Vec<Query>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            next_labels: vec!["다음".to_string(), "Next".to_string()],
            next_glyph: ">".to_string(),
            fallback_queries: vec![Query::css(".next:not(.disabled)").visible()],
        }
    }
}

impl PaginationConfig {
    /// Candidate controls leading to `next_page`, in priority order
    pub fn candidates(&self, next_page: u32) -> Vec<Query> {
        let number = next_page.to_string();
        let mut queries = vec![
            Query::css("a").with_text(number.as_str()).visible(),
            Query::css(".pagination a").with_text(number.as_str()).visible(),
            Query::css(format!("a[href*='page={}']", number)).visible(),
        ];
        queries.extend(self.next_labels.iter().map(|label| Query::css("a").containing(label.as_str()).visible()));
        queries.push(Query::css("a").with_text(self.next_glyph.as_str()).visible());
        queries.extend(self.fallback_queries.iter().cloned());
        queries
    }
}

/// Waits between page interactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub network_idle_timeout_ms: u64,
    /// Data-ready confirmation after every navigation
    pub load_budget: PollBudget,
    pub row_delay_ms: u64,
    pub child_delay_ms: u64,
    pub page_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            network_idle_timeout_ms: 10_000,
            load_budget: PollBudget::new(10, 2_000),
            row_delay_ms: 500,
            child_delay_ms: 300,
            page_delay_ms: 2_000,
        }
    }
}

impl TimingConfig {
    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    pub fn row_delay(&self) -> Duration {
        Duration::from_millis(self.row_delay_ms)
    }

    pub fn child_delay(&self) -> Duration {
        Duration::from_millis(self.child_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Output locations and column preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,

    /// Where viewport snapshots go when a page never becomes ready; disabled when `None`
    pub diagnostics_dir: Option<PathBuf>,

    /// Detail headers that lead the CSV right after the base columns
    pub classification_columns: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("harvest_results"),
            diagnostics_dir: None,
            classification_columns: [
                "분류코드",
                "분류단계",
                "행위명(한글)",
                "행위명(영문)",
                "산정명",
                "수술여부",
                "상대가치점수",
                "본인부담률",
                "급여여부",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}
