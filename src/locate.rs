//! Selector strategy
//!
//! The target markup exposes no single stable selector for the data table, the detail
//! panel or the pagination control. Every lookup therefore goes through an ordered list
//! of [`Query`] candidates which are tried in turn until one of them matches.

use crate::browser::{ElementRef, PageDriver};
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};

/// Text filter applied to the trimmed `textContent` of a CSS match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatch {
    Exact(String),
    Contains(String),
}

impl TextMatch {
    pub fn matches(&self, text: &str) -> bool {
        let text = text.trim();
        match self {
            TextMatch::Exact(expected) => text == expected,
            TextMatch::Contains(needle) => text.contains(needle.as_str()),
        }
    }
}

/// One structural query: a CSS selector plus optional text and visibility filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub css: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextMatch>,

    #[serde(default)]
    pub visible_only: bool,
}

impl Query {
    pub fn css(css: impl Into<String>) -> Self {
        Self { css: css.into(), text: None, visible_only: false }
    }

    /// Builder method: keep only elements whose text equals `text`
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(TextMatch::Exact(text.into()));
        self
    }

    /// Builder method: keep only elements whose text contains `text`
    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.text = Some(TextMatch::Contains(text.into()));
        self
    }

    /// Builder method: keep only visible elements
    pub fn visible(mut self) -> Self {
        self.visible_only = true;
        self
    }

    /// Run this query alone and apply its filters
    pub fn run<D: PageDriver + ?Sized>(&self, driver: &D, scope: Option<ElementRef>) -> Result<Vec<ElementRef>> {
        let candidates = driver.query_all(scope, &self.css)?;
        if self.text.is_none() && !self.visible_only {
            return Ok(candidates);
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for element in candidates {
            if self.accepts(driver, element)? {
                kept.push(element);
            }
        }
        Ok(kept)
    }

    fn accepts<D: PageDriver + ?Sized>(&self, driver: &D, element: ElementRef) -> Result<bool> {
        if let Some(text_match) = &self.text {
            if !text_match.matches(&driver.text_content(element)?) {
                return Ok(false);
            }
        }
        if self.visible_only && !driver.is_visible(element)? {
            return Ok(false);
        }
        Ok(true)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.css)?;
        match &self.text {
            Some(TextMatch::Exact(text)) => write!(f, " [text = {:?}]", text)?,
            Some(TextMatch::Contains(text)) => write!(f, " [text ~ {:?}]", text)?,
            None => {}
        }
        if self.visible_only {
            f.write_str(" [visible]")?;
        }
        Ok(())
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Position of the winning query in the candidate list
    pub query_index: usize,

    /// Non-empty set of matched elements, in document order
    pub elements: Vec<ElementRef>,
}

impl Located {
    pub fn first(&self) -> ElementRef {
        self.elements[0]
    }
}

/// Try each candidate in order and return the first non-empty match.
///
/// A failing candidate is logged and skipped; `ElementNotFound` is only reported once
/// the whole list has been exhausted.
pub fn locate_all<D: PageDriver + ?Sized>(
    driver: &D,
    candidates: &[Query],
    scope: Option<ElementRef>,
) -> Result<Located> {
    for (query_index, query) in candidates.iter().enumerate() {
        match query.run(driver, scope) {
            Ok(elements) if !elements.is_empty() => {
                log::debug!("Matched {} element(s) with {}", elements.len(), query);
                return Ok(Located { query_index, elements });
            }
            Ok(_) => continue,
            Err(e) => {
                log::debug!("Query {} failed: {}", query, e);
                continue;
            }
        }
    }

    let tried: Vec<String> = candidates.iter().map(Query::to_string).collect();
    Err(HarvestError::ElementNotFound(format!("no match for any of [{}]", tried.join(", "))))
}

/// First element of the first matching candidate
pub fn locate_first<D: PageDriver + ?Sized>(
    driver: &D,
    candidates: &[Query],
    scope: Option<ElementRef>,
) -> Result<ElementRef> {
    locate_all(driver, candidates, scope).map(|located| located.first())
}

/// Size of the first non-empty match, or 0 when nothing matches
pub fn count_matches<D: PageDriver + ?Sized>(driver: &D, candidates: &[Query], scope: Option<ElementRef>) -> usize {
    locate_all(driver, candidates, scope).map_or(0, |located| located.elements.len())
}
