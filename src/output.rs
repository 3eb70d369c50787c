//! Persistence of extracted records
//!
//! The harvester reports progress to a [`RecordSink`] after every page and once at the
//! end. [`FileSink`] keeps a JSON file per page, a CSV of everything collected so far and
//! a JSON list of failures.

use crate::config::HarvestConfig;
use crate::error::Result;
use crate::model::{Record, SessionState, columns};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// UTF-8 byte order mark, so spreadsheet tools pick the right encoding for Hangul headers
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Receives records as the harvest progresses
pub trait RecordSink {
    /// Called after each page that produced records
    fn page_completed(&mut self, page: u32, page_records: &[Record], all_records: &[Record]) -> Result<()>;

    /// Called once when the run is over, whatever the reason
    fn finished(&mut self, state: &SessionState) -> Result<()>;
}

/// Column ordering for tabular output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    preferred: Vec<String>,
}

impl ColumnLayout {
    /// Explicit preferred prefix; duplicates keep their first position
    pub fn new<S: Into<String>>(preferred: impl IntoIterator<Item = S>) -> Self {
        let mut seen = BTreeSet::new();
        let preferred = preferred.into_iter().map(Into::into).filter(|column| seen.insert(column.clone())).collect();
        Self { preferred }
    }

    /// `code`, the base field names, the classification columns, hierarchy metadata,
    /// `page` and `collected_at`
    pub fn from_config(config: &HarvestConfig) -> Self {
        let layout = &config.table.layout;
        let mut preferred = vec![columns::CODE.to_string(), layout.name_label.clone()];
        preferred.extend(layout.extra_cells.iter().map(|extra| extra.label.clone()));
        preferred.extend(config.output.classification_columns.iter().cloned());
        preferred.extend(columns::HIERARCHY.iter().map(|column| column.to_string()));
        preferred.push(columns::PAGE.to_string());
        preferred.push(columns::COLLECTED_AT.to_string());
        Self::new(preferred)
    }

    /// Preferred columns that occur in `records`, then every other column in lexical order
    pub fn columns(&self, records: &[Record]) -> Vec<String> {
        let present: BTreeSet<String> = records.iter().flat_map(|record| record.flatten().into_keys()).collect();
        self.order(&present)
    }

    fn order(&self, present: &BTreeSet<String>) -> Vec<String> {
        let mut ordered: Vec<String> =
            self.preferred.iter().filter(|column| present.contains(*column)).cloned().collect();
        ordered.extend(present.iter().filter(|column| !self.preferred.contains(column)).cloned());
        ordered
    }
}

/// Write `records` as CSV with a BOM; missing values become empty cells
pub fn write_csv(path: &Path, records: &[Record], layout: &ColumnLayout) -> Result<()> {
    let columns = layout.columns(records);
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(&columns)?;
    for record in records {
        let flat = record.flatten();
        writer.write_record(columns.iter().map(|column| flat.get(column).map_or("", String::as_str)))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    Ok(())
}

/// Sink writing into a directory:
///
/// - `pages/page_{n}.json` for every completed page
/// - `records.csv`, rewritten after every page and at the end
/// - `failed_items.json` when anything failed
pub struct FileSink {
    dir: PathBuf,
    layout: ColumnLayout,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, layout: ColumnLayout) -> Self {
        Self { dir: dir.into(), layout }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.output.dir.clone(), ColumnLayout::from_config(config))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_path(&self, page: u32) -> PathBuf {
        self.dir.join("pages").join(format!("page_{}.json", page))
    }

    pub fn csv_path(&self) -> PathBuf {
        self.dir.join("records.csv")
    }

    pub fn failures_path(&self) -> PathBuf {
        self.dir.join("failed_items.json")
    }
}

impl RecordSink for FileSink {
    fn page_completed(&mut self, page: u32, page_records: &[Record], all_records: &[Record]) -> Result<()> {
        fs::create_dir_all(self.dir.join("pages"))?;
        write_json(&self.page_path(page), page_records)?;
        write_csv(&self.csv_path(), all_records, &self.layout)?;
        log::info!("Saved page {} ({} records, {} total)", page, page_records.len(), all_records.len());
        Ok(())
    }

    fn finished(&mut self, state: &SessionState) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        if !state.records.is_empty() {
            write_csv(&self.csv_path(), &state.records, &self.layout)?;
        }
        if !state.failures.is_empty() {
            write_json(&self.failures_path(), &state.failures)?;
        }
        log::info!("Results written to {}", self.dir.display());
        Ok(())
    }
}
