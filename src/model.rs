//! Record model shared by the extraction pipeline and the output writers

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Column names of the metadata every flattened record carries
pub mod columns {
    pub const CODE: &str = "code";
    pub const PARENT_CODE: &str = "parent_code";
    pub const LEVEL: &str = "level";
    pub const IS_PARENT: &str = "is_parent";
    pub const PAGE: &str = "page";
    pub const COLLECTED_AT: &str = "collected_at";

    pub const HIERARCHY: [&str; 3] = [PARENT_CODE, LEVEL, IS_PARENT];
}

/// Position of a record in the two-level hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Level {
    /// Main row
    Top,
    /// Row revealed by expanding a main row
    Child,
}

impl Level {
    pub fn depth(self) -> u8 {
        match self {
            Level::Top => 0,
            Level::Child => 1,
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.depth()
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(depth: u8) -> Result<Self, Self::Error> {
        match depth {
            0 => Ok(Level::Top),
            1 => Ok(Level::Child),
            other => Err(format!("hierarchy level must be 0 or 1, got {}", other)),
        }
    }
}

/// One extracted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Business key, never empty
    pub code: String,

    /// Fixed columns read straight from the row cells
    pub base_fields: IndexMap<String, String>,

    /// Header/value pairs harvested from the row's detail panel
    pub detail_fields: IndexMap<String, String>,

    /// Code of the owning main row; a main row is its own parent
    pub parent_code: String,

    pub level: Level,

    /// Set once at least one child record has been attached
    pub is_parent: bool,

    pub page_number: u32,

    pub collected_at: DateTime<Utc>,
}

impl Record {
    pub fn is_top_level(&self) -> bool {
        self.level == Level::Top
    }

    /// Flat column → value view used by tabular writers.
    ///
    /// The code and metadata columns are written after the free-form fields so a detail
    /// header that happens to share one of their names cannot shadow them.
    pub fn flatten(&self) -> IndexMap<String, String> {
        let mut flat = IndexMap::with_capacity(self.base_fields.len() + self.detail_fields.len() + 6);
        for (key, value) in self.base_fields.iter().chain(self.detail_fields.iter()) {
            flat.insert(key.clone(), value.clone());
        }
        flat.insert(columns::CODE.to_string(), self.code.clone());
        flat.insert(columns::PARENT_CODE.to_string(), self.parent_code.clone());
        flat.insert(columns::LEVEL.to_string(), self.level.depth().to_string());
        flat.insert(columns::IS_PARENT.to_string(), self.is_parent.to_string());
        flat.insert(columns::PAGE.to_string(), self.page_number.to_string());
        flat.insert(columns::COLLECTED_AT.to_string(), self.collected_at.to_rfc3339());
        flat
    }
}

/// A row that could not be turned into a [`Record`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Row code when it was known at the time of failure
    pub code: String,
    pub page: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl FailureEntry {
    pub fn new(code: impl Into<String>, page: u32, reason: impl Into<String>) -> Self {
        Self { code: code.into(), page, reason: reason.into(), timestamp: Utc::now() }
    }
}

/// Everything one page pass produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutcome {
    pub page: u32,
    pub records: Vec<Record>,
    pub failures: Vec<FailureEntry>,
    /// Rows that went through the record builder successfully
    pub processed: u64,
}

impl PageOutcome {
    pub fn new(page: u32) -> Self {
        Self { page, ..Self::default() }
    }
}

/// Run-wide aggregation, owned by the harvester and threaded through every page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionState {
    pub current_page: u32,
    pub records: Vec<Record>,
    pub failures: Vec<FailureEntry>,
    pub processed: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { current_page: 1, records: Vec::new(), failures: Vec::new(), processed: 0 }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one page's results, preserving order
    pub fn absorb(&mut self, outcome: PageOutcome) {
        self.records.extend(outcome.records);
        self.failures.extend(outcome.failures);
        self.processed += outcome.processed;
    }

    pub fn main_count(&self) -> usize {
        self.records.iter().filter(|r| r.level == Level::Top).count()
    }

    pub fn child_count(&self) -> usize {
        self.records.iter().filter(|r| r.level == Level::Child).count()
    }

    pub fn parent_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_parent).count()
    }

    /// Collected / (collected + failed); `None` when nothing was attempted
    pub fn success_ratio(&self) -> Option<f64> {
        let total = self.records.len() + self.failures.len();
        (total > 0).then(|| self.records.len() as f64 / total as f64)
    }
}
