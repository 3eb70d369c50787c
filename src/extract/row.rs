//! Row classification and basic field extraction

use crate::browser::{ElementRef, PageDriver};
use crate::config::RowLayout;
use crate::error::Result;
use indexmap::IndexMap;

/// Fields every data row exposes through fixed cell positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicFields {
    pub code: String,
    pub base_fields: IndexMap<String, String>,
}

/// Main rows carry a class with at least one digit in it; child rows don't.
///
/// Deliberately loose: a false positive is caught later when code extraction fails,
/// a false negative would silently drop a record.
pub fn is_main_class(class: Option<&str>) -> bool {
    class.is_some_and(|class| class.chars().any(|c| c.is_ascii_digit()))
}

pub fn is_main_row<D: PageDriver + ?Sized>(driver: &D, row: ElementRef) -> bool {
    match driver.attribute(row, "class") {
        Ok(class) => is_main_class(class.as_deref()),
        Err(e) => {
            log::debug!("Could not read class of row {}: {}", row, e);
            false
        }
    }
}

/// Read code, name and extra cells from already-extracted cell texts.
///
/// `None` means "skip this row": too few cells, or a blank code or name.
pub fn basic_fields_from_cells(cells: &[String], layout: &RowLayout) -> Option<BasicFields> {
    if cells.len() < layout.min_cells {
        return None;
    }

    let code = cells.get(layout.code_cell)?.trim();
    let name = cells.get(layout.name_cell)?.trim();
    if code.is_empty() || name.is_empty() {
        return None;
    }

    let mut base_fields = IndexMap::new();
    base_fields.insert(layout.name_label.clone(), name.to_string());
    for extra in &layout.extra_cells {
        let value = cells.get(extra.index).map(|text| text.trim().to_string()).unwrap_or_default();
        base_fields.insert(extra.label.clone(), value);
    }

    Some(BasicFields { code: code.to_string(), base_fields })
}

/// Trimmed text of every `td` directly queried under the row
pub fn cell_texts<D: PageDriver + ?Sized>(driver: &D, row: ElementRef) -> Result<Vec<String>> {
    driver
        .query_all(Some(row), "td")?
        .into_iter()
        .map(|cell| driver.text_content(cell).map(|text| text.trim().to_string()))
        .collect()
}

pub fn extract_basic_fields<D: PageDriver + ?Sized>(
    driver: &D,
    row: ElementRef,
    layout: &RowLayout,
) -> Result<Option<BasicFields>> {
    let cells = cell_texts(driver, row)?;
    Ok(basic_fields_from_cells(&cells, layout))
}
