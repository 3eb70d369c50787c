//! Record assembly for one row

use crate::browser::{ElementRef, PageDriver};
use crate::config::RowLayout;
use crate::extract::detail::DetailExtractor;
use crate::extract::row::extract_basic_fields;
use crate::model::{FailureEntry, Level, PageOutcome, Record};
use chrono::Utc;

/// Turns a row into a [`Record`]: basic fields, detail panel, hierarchy metadata
pub struct RecordBuilder<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    layout: &'a RowLayout,
    detail: &'a DetailExtractor<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> RecordBuilder<'a, D> {
    pub fn new(driver: &'a D, layout: &'a RowLayout, detail: &'a DetailExtractor<'a, D>) -> Self {
        Self { driver, layout, detail }
    }

    /// Build the record for `row`.
    ///
    /// `Ok(None)` skips the row silently (blank code or name, too few cells). A row whose
    /// cells cannot be read at all becomes a [`FailureEntry`]. A missing detail panel only
    /// leaves the detail fields empty.
    pub fn build(
        &self,
        row: ElementRef,
        parent_code: Option<&str>,
        level: Level,
        outcome: &mut PageOutcome,
    ) -> Result<Option<Record>, FailureEntry> {
        let basic = match extract_basic_fields(self.driver, row, self.layout) {
            Ok(Some(basic)) => basic,
            Ok(None) => return Ok(None),
            Err(e) => return Err(FailureEntry::new("", outcome.page, e.to_string())),
        };

        let indent = "  ".repeat(usize::from(level.depth()) + 1);
        log::info!("{}{}", indent, basic.code);

        let detail_fields = self.detail.open_and_extract(row);
        outcome.processed += 1;

        Ok(Some(Record {
            parent_code: parent_code.unwrap_or(&basic.code).to_string(),
            code: basic.code,
            base_fields: basic.base_fields,
            detail_fields,
            level,
            is_parent: false,
            page_number: outcome.page,
            collected_at: Utc::now(),
        }))
    }
}
