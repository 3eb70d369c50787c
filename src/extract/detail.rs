//! Detail panel extraction
//!
//! Clicking a row opens a transient panel holding a small header/value table. The panel
//! is located through the configured query chain, flattened into a header → value map and
//! dismissed again. Nothing in here fails the row: every problem degrades to an empty map.

use crate::browser::{ClickMethod, ElementRef, PageDriver};
use crate::config::DetailConfig;
use crate::error::Result;
use crate::locate::locate_first;
use crate::poll::{pause, poll_until};
use indexmap::IndexMap;

/// Header and value cell texts of one panel table row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelRow {
    pub headers: Vec<String>,
    pub values: Vec<String>,
}

impl PanelRow {
    pub fn new<H: Into<String>, V: Into<String>>(headers: Vec<H>, values: Vec<V>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// How a panel was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    /// A close control was clicked; index into the close candidate list
    Closed(usize),
    /// No close control was found and `Escape` was sent instead
    Escaped,
}

/// Pairs a single table row contributes, by header/value cell counts
fn row_pairs(row: &PanelRow) -> Vec<(&str, &str)> {
    let headers = &row.headers;
    let values = &row.values;
    match (headers.len(), values.len()) {
        // Merged value cell, or the three-column layout whose first value is the real one
        (1, 1) => vec![(headers[0].as_str(), values[0].as_str())],
        (1, n) if n >= 3 => vec![(headers[0].as_str(), values[0].as_str())],
        (2, n) if n >= 2 => vec![
            (headers[0].as_str(), values[0].as_str()),
            (headers[1].as_str(), values[1].as_str()),
        ],
        (h, n) if h >= 3 && n >= 3 => {
            headers.iter().zip(values.iter()).map(|(h, v)| (h.as_str(), v.as_str())).collect()
        }
        _ => Vec::new(),
    }
}

/// Collapse line breaks (and the whitespace around them) into single spaces
pub fn normalize_text(text: &str) -> String {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).collect::<Vec<_>>().join(" ")
}

/// Turn panel rows into a header → value map.
///
/// Blank headers or values and label artefacts (header equal to value) are dropped; a
/// header seen twice keeps its first position and its last value.
pub fn parse_panel_rows(rows: &[PanelRow]) -> IndexMap<String, String> {
    let mut fields = IndexMap::new();
    for (header, value) in rows.iter().flat_map(row_pairs) {
        let header = normalize_text(header);
        let value = normalize_text(value);
        if header.is_empty() || value.is_empty() || header == value {
            continue;
        }
        fields.insert(header, value);
    }
    fields
}

/// Opens, reads and dismisses detail panels on one page
pub struct DetailExtractor<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    config: &'a DetailConfig,
}

impl<'a, D: PageDriver + ?Sized> DetailExtractor<'a, D> {
    pub fn new(driver: &'a D, config: &'a DetailConfig) -> Self {
        Self { driver, config }
    }

    /// Detail fields of `row`, or an empty map if anything along the way goes wrong
    pub fn open_and_extract(&self, row: ElementRef) -> IndexMap<String, String> {
        match self.try_open_and_extract(row) {
            Ok(fields) => fields,
            Err(e) => {
                log::warn!("Detail extraction for row {} failed: {}", row, e);
                // A stuck panel would swallow every following click
                if let Err(e) = self.dismiss() {
                    log::warn!("Could not dismiss detail panel: {}", e);
                }
                IndexMap::new()
            }
        }
    }

    fn try_open_and_extract(&self, row: ElementRef) -> Result<IndexMap<String, String>> {
        if !self.open(row)? {
            log::warn!("None of the first {} cells of row {} accepted a click", self.config.click_cells, row);
            return Ok(IndexMap::new());
        }
        pause(self.config.open_settle());

        let Some(panel) = self.wait_for_panel() else {
            log::warn!("No detail panel appeared for row {}", row);
            return Ok(IndexMap::new());
        };

        let rows = self.read_panel(panel)?;
        let fields = parse_panel_rows(&rows);
        log::debug!("Extracted {} detail field(s) from panel {}", fields.len(), panel);

        if let Err(e) = self.dismiss() {
            log::warn!("Could not dismiss detail panel: {}", e);
        }
        Ok(fields)
    }

    /// Click the leading cells until one accepts
    fn open(&self, row: ElementRef) -> Result<bool> {
        let cells = self.driver.query_all(Some(row), "td")?;
        for (index, cell) in cells.into_iter().take(self.config.click_cells).enumerate() {
            match self.driver.click(cell, ClickMethod::Native) {
                Ok(()) => return Ok(true),
                Err(e) => log::debug!("Click on TD[{}] of row {} failed: {}", index, row, e),
            }
        }
        Ok(false)
    }

    /// Poll the panel query chain until a visible panel shows up
    pub fn wait_for_panel(&self) -> Option<ElementRef> {
        poll_until(self.config.panel_budget, |_| locate_first(self.driver, &self.config.panel_queries, None).ok())
    }

    /// Header/value rows of every table in the panel (the panel itself if it is a table)
    pub fn read_panel(&self, panel: ElementRef) -> Result<Vec<PanelRow>> {
        let tables = if self.driver.tag_name(panel)? == "table" {
            vec![panel]
        } else {
            self.driver.query_all(Some(panel), "table")?
        };

        let mut rows = Vec::new();
        for table in tables {
            for tr in self.driver.query_all(Some(table), "tr")? {
                rows.push(PanelRow { headers: self.texts(tr, "th")?, values: self.texts(tr, "td")? });
            }
        }
        Ok(rows)
    }

    fn texts(&self, scope: ElementRef, css: &str) -> Result<Vec<String>> {
        self.driver
            .query_all(Some(scope), css)?
            .into_iter()
            .map(|cell| self.driver.text_content(cell).map(|text| text.trim().to_string()))
            .collect()
    }

    /// Close whatever panel is open: a close control if one is visible, `Escape` otherwise
    pub fn dismiss(&self) -> Result<Dismissal> {
        for (index, query) in self.config.close_candidates().iter().enumerate() {
            let Ok(found) = query.run(self.driver, None) else { continue };
            let Some(&button) = found.first() else { continue };

            match self.driver.click(button, ClickMethod::Native) {
                Ok(()) => {
                    pause(self.config.dismiss_settle());
                    log::debug!("Closed detail panel via {}", query);
                    return Ok(Dismissal::Closed(index));
                }
                Err(e) => log::debug!("Close control {} did not accept a click: {}", query, e),
            }
        }

        self.driver.press_key("Escape")?;
        pause(self.config.dismiss_settle());
        log::debug!("Sent Escape to close detail panel");
        Ok(Dismissal::Escaped)
    }
}
