//! Expand-control actuation
//!
//! Clicking a toggle does not always work the first time: some pages ignore synthetic
//! events, others only react to script or to a double click, and a few hide the handler
//! behind a global function. The [`Expander`] escalates through the click methods and
//! confirms every attempt by watching the row count grow.

use crate::browser::{ClickMethod, ElementRef, PageDriver};
use crate::config::ExpandConfig;
use crate::error::Result;
use crate::extract::detail::DetailExtractor;
use crate::extract::toggle::ToggleMatch;
use crate::locate::{Query, count_matches, locate_first};
use crate::poll::{PollBudget, pause, poll_until};
use serde_json::Value;
use std::fmt;

/// Lists global functions whose name mentions toggle/expand/fold, as a JSON string
pub const LIST_TOGGLE_FUNCTIONS_JS: &str = r#"(function() {
    var found = [];
    for (var name in window) {
        try {
            if (typeof window[name] === 'function' && /toggle|expand|fold/i.test(name)) {
                found.push(name);
            }
        } catch (e) {}
    }
    return JSON.stringify(found);
})()"#;

/// Script invoking the global function `name` without arguments
pub fn call_page_function_js(name: &str) -> Result<String> {
    Ok(format!("window[{}]()", serde_json::to_string(name)?))
}

/// Function names out of a [`LIST_TOGGLE_FUNCTIONS_JS`] reply
fn function_names(reply: &Value) -> Vec<String> {
    match reply {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_default(),
        Value::Array(items) => items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect(),
        _ => Vec::new(),
    }
}

/// What finally revealed the child rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actuation {
    Click(ClickMethod),
    PageFunction(String),
}

impl fmt::Display for Actuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actuation::Click(method) => write!(f, "{}", method),
            Actuation::PageFunction(name) => write!(f, "page function {}()", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// The row count grew by `added` after `via`
    Expanded { via: Actuation, added: usize },
    /// Nothing revealed any rows
    Unchanged,
}

impl Expansion {
    pub fn is_expanded(&self) -> bool {
        matches!(self, Expansion::Expanded { .. })
    }
}

pub struct Expander<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    row_queries: &'a [Query],
    config: &'a ExpandConfig,
    detail: &'a DetailExtractor<'a, D>,
}

impl<'a, D: PageDriver + ?Sized> Expander<'a, D> {
    pub fn new(
        driver: &'a D,
        row_queries: &'a [Query],
        config: &'a ExpandConfig,
        detail: &'a DetailExtractor<'a, D>,
    ) -> Self {
        Self { driver, row_queries, config, detail }
    }

    fn row_count(&self) -> usize {
        count_matches(self.driver, self.row_queries, None)
    }

    /// Wait for the row count to exceed `before`; popups that open instead get closed
    fn confirm(&self, before: usize, budget: PollBudget) -> Option<usize> {
        poll_until(budget, |_| {
            let now = self.row_count();
            if now > before {
                return Some(now - before);
            }
            if locate_first(self.driver, &self.config.popup_queries, None).is_ok() {
                log::debug!("A popup opened instead of child rows, closing it");
                if let Err(e) = self.detail.dismiss() {
                    log::warn!("Could not close popup: {}", e);
                }
            }
            None
        })
    }

    /// Actuate `toggle` until child rows show up
    pub fn expand(&self, toggle: &ToggleMatch) -> Expansion {
        let before = self.row_count();
        log::debug!("Expanding via {} (TD[{}]), {} rows before", toggle.signal, toggle.cell_index, before);

        for method in ClickMethod::ESCALATION {
            if let Err(e) = self.driver.click(toggle.element, method) {
                log::debug!("{} on {} failed: {}", method, toggle.element, e);
                continue;
            }
            if let Some(added) = self.confirm(before, self.config.confirm_budget) {
                log::info!("  Expanded with {}: {} new row(s)", method, added);
                return Expansion::Expanded { via: Actuation::Click(method), added };
            }
            log::debug!("{} revealed no rows", method);
        }

        match self.expand_with_page_functions(before) {
            Ok(Some(expansion)) => return expansion,
            Ok(None) => {}
            Err(e) => log::debug!("Page function fallback failed: {}", e),
        }

        log::warn!("Could not expand row via {}; keeping it without children", toggle.element);
        Expansion::Unchanged
    }

    fn expand_with_page_functions(&self, before: usize) -> Result<Option<Expansion>> {
        let names = function_names(&self.driver.evaluate(LIST_TOGGLE_FUNCTIONS_JS)?);
        if names.is_empty() {
            return Ok(None);
        }
        log::debug!("Candidate page functions: {:?}", names);

        for name in names {
            if let Err(e) = self.driver.evaluate(&call_page_function_js(&name)?) {
                log::debug!("Calling {}() failed: {}", name, e);
                continue;
            }
            if let Some(added) = self.confirm(before, self.config.function_budget) {
                log::info!("  Expanded with page function {}(): {} new row(s)", name, added);
                return Ok(Some(Expansion::Expanded { via: Actuation::PageFunction(name), added }));
            }
        }
        Ok(None)
    }

    /// Fold an expanded row back; `false` when the click did not go through
    pub fn collapse(&self, toggle: ElementRef) -> bool {
        match self.driver.click(toggle, ClickMethod::Native) {
            Ok(()) => {
                pause(self.config.collapse_settle());
                true
            }
            Err(e) => {
                log::warn!("Could not collapse row via {}: {}", toggle, e);
                false
            }
        }
    }
}
