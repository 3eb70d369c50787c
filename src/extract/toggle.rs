//! Expand-control detection
//!
//! Rows signal that they own child rows in several inconsistent ways: a plus glyph,
//! markup mentioning expand/toggle, an inline handler, a class name, or nothing but a
//! pointer cursor. Each signal is a pure predicate over a [`CellProbe`]; the predicates
//! run from most specific to least specific and the first one with an opinion wins.

use crate::browser::{ElementRef, PageDriver};
use crate::error::Result;
use std::borrow::Borrow;
use std::fmt;

/// ASCII and full-width plus signs
const PLUS_GLYPHS: [char; 2] = ['+', '＋'];

/// Markup and text keywords that name an expand control
const MARKUP_KEYWORDS: [&str; 2] = ["expand", "toggle"];

/// Inline handler keywords
const HANDLER_KEYWORDS: [&str; 3] = ["toggle", "expand", "fold"];

/// Only the leading cells of a row are inspected
const PROBED_CELLS: usize = 3;

/// Attributes a descendant without text may carry its label in
const LABEL_ATTRIBUTES: [&str; 4] = ["alt", "title", "aria-label", "value"];

/// Observable state of one descendant of a cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantProbe {
    pub element: ElementRef,
    pub tag: String,
    pub text: String,
    /// First non-empty label attribute, for images and inputs
    pub label: Option<String>,
}

/// Observable state of one row cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellProbe {
    pub element: ElementRef,
    pub text: String,
    pub inner_html: String,
    pub class: Option<String>,
    pub onclick: Option<String>,
    pub cursor: String,
    pub descendants: Vec<DescendantProbe>,
}

impl CellProbe {
    /// A bare cell with only text, handy as a starting point
    pub fn new(element: ElementRef, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            element,
            inner_html: text.clone(),
            text,
            class: None,
            onclick: None,
            cursor: "auto".to_string(),
            descendants: Vec::new(),
        }
    }
}

/// Which heuristic fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToggleSignal {
    Glyph,
    Markup,
    Descendant,
    InlineHandler,
    ToggleClass,
    PointerCursor,
}

impl fmt::Display for ToggleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToggleSignal::Glyph => "plus glyph",
            ToggleSignal::Markup => "markup hint",
            ToggleSignal::Descendant => "descendant marker",
            ToggleSignal::InlineHandler => "inline handler",
            ToggleSignal::ToggleClass => "toggle class",
            ToggleSignal::PointerCursor => "pointer cursor",
        };
        f.write_str(name)
    }
}

/// A detected expand control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleMatch {
    /// Element to actuate; a cell or one of its descendants
    pub element: ElementRef,
    pub signal: ToggleSignal,
    pub cell_index: usize,
}

type Layer = fn(&CellProbe) -> Option<ElementRef>;

/// Cheapest and most specific first
const LAYERS: [(ToggleSignal, Layer); 6] = [
    (ToggleSignal::Glyph, glyph_in_text),
    (ToggleSignal::Markup, hint_in_markup),
    (ToggleSignal::Descendant, marked_descendant),
    (ToggleSignal::InlineHandler, toggle_handler),
    (ToggleSignal::ToggleClass, toggle_class),
    (ToggleSignal::PointerCursor, pointer_cursor),
];

fn has_plus(text: &str) -> bool {
    text.contains(PLUS_GLYPHS)
}

fn contains_keyword(text: &str, keywords: &[&str]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|keyword| lower.contains(keyword))
}

pub fn glyph_in_text(cell: &CellProbe) -> Option<ElementRef> {
    has_plus(&cell.text).then_some(cell.element)
}

pub fn hint_in_markup(cell: &CellProbe) -> Option<ElementRef> {
    (has_plus(&cell.inner_html) || contains_keyword(&cell.inner_html, &MARKUP_KEYWORDS)).then_some(cell.element)
}

pub fn marked_descendant(cell: &CellProbe) -> Option<ElementRef> {
    cell.descendants
        .iter()
        .find(|d| {
            let marked = |text: &str| has_plus(text) || contains_keyword(text, &MARKUP_KEYWORDS);
            marked(d.text.as_str()) || d.label.as_deref().is_some_and(marked)
        })
        .map(|d| d.element)
}

pub fn toggle_handler(cell: &CellProbe) -> Option<ElementRef> {
    cell.onclick
        .as_deref()
        .is_some_and(|handler| contains_keyword(handler, &HANDLER_KEYWORDS))
        .then_some(cell.element)
}

pub fn toggle_class(cell: &CellProbe) -> Option<ElementRef> {
    cell.class
        .as_deref()
        .is_some_and(|class| contains_keyword(class, &MARKUP_KEYWORDS))
        .then_some(cell.element)
}

/// Last resort: a clickable-looking cell that actually shows something
pub fn pointer_cursor(cell: &CellProbe) -> Option<ElementRef> {
    (cell.cursor.trim() == "pointer" && !cell.text.trim().is_empty()).then_some(cell.element)
}

/// Run every layer over one cell
pub fn detect_in_cell(cell: &CellProbe) -> Option<(ToggleSignal, ElementRef)> {
    LAYERS.iter().find_map(|(signal, layer)| layer(cell).map(|element| (*signal, element)))
}

/// Inspect the leading cells in order; the first cell with any signal decides
///
/// Cells are pulled one at a time, so a lazy source stops being read after the first hit.
pub fn detect_in_cells<P: Borrow<CellProbe>>(cells: impl IntoIterator<Item = P>) -> Option<ToggleMatch> {
    cells.into_iter().take(PROBED_CELLS).enumerate().find_map(|(cell_index, cell)| {
        detect_in_cell(cell.borrow()).map(|(signal, element)| ToggleMatch { element, signal, cell_index })
    })
}

/// Gather everything the layers look at for one cell
pub fn probe_cell<D: PageDriver + ?Sized>(driver: &D, cell: ElementRef) -> Result<CellProbe> {
    let mut descendants = Vec::new();
    for element in driver.query_all(Some(cell), "*")? {
        let mut label = None;
        for attribute in LABEL_ATTRIBUTES {
            if let Some(value) = driver.attribute(element, attribute)?.filter(|v| !v.trim().is_empty()) {
                label = Some(value);
                break;
            }
        }
        descendants.push(DescendantProbe {
            element,
            tag: driver.tag_name(element)?,
            text: driver.text_content(element)?.trim().to_string(),
            label,
        });
    }

    Ok(CellProbe {
        element: cell,
        text: driver.text_content(cell)?.trim().to_string(),
        inner_html: driver.inner_html(cell)?,
        class: driver.attribute(cell, "class")?,
        onclick: driver.attribute(cell, "onclick")?,
        cursor: driver.computed_style(cell, "cursor")?,
        descendants,
    })
}

/// Look for an expand control on a row.
///
/// `None` is the normal answer for rows without children; read errors are logged and
/// treated the same way.
pub fn detect<D: PageDriver + ?Sized>(driver: &D, row: ElementRef) -> Option<ToggleMatch> {
    let cells = match driver.query_all(Some(row), "td") {
        Ok(cells) => cells,
        Err(e) => {
            log::warn!("Could not list cells of row {}: {}", row, e);
            return None;
        }
    };

    let probes = cells.into_iter().enumerate().map_while(|(cell_index, cell)| match probe_cell(driver, cell) {
        Ok(probe) => {
            log::debug!("TD[{}] text: {:?}", cell_index, probe.text);
            Some(probe)
        }
        Err(e) => {
            log::warn!("Could not inspect cell {} of row {}: {}", cell_index, row, e);
            None
        }
    });

    let found = detect_in_cells(probes);
    match &found {
        Some(found) => log::debug!("Expand control in TD[{}] via {}", found.cell_index, found.signal),
        None => log::debug!("No expand control on row {}", row),
    }
    found
}
