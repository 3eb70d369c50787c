//! Browser access
//!
//! The extraction engine never talks to Chrome directly. It consumes the [`PageDriver`]
//! capability set: navigation, structural queries, element reads, the four click flavours,
//! script evaluation and viewport snapshots. [`BrowserSession`] provides it over a
//! headless_chrome tab; tests provide an in-memory page.

pub mod config;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use session::BrowserSession;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Opaque handle to a rendered element.
///
/// Handles are only meaningful for the page pass that produced them; once pagination
/// replaces the table they may point at nothing, and operations on them fail with
/// [`crate::HarvestError::ElementNotFound`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef(pub u64);

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How an element gets clicked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClickMethod {
    /// Real mouse click at the element's midpoint, after scrolling it into view
    Native,
    /// Synthetic mouse event sequence dispatched without interactability checks
    Forced,
    /// `element.click()` from page script
    Scripted,
    /// Two clicks followed by a `dblclick` event
    Double,
}

impl ClickMethod {
    /// Order in which actuation is attempted on an expand control
    pub const ESCALATION: [ClickMethod; 4] =
        [ClickMethod::Native, ClickMethod::Forced, ClickMethod::Scripted, ClickMethod::Double];
}

impl fmt::Display for ClickMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClickMethod::Native => "native click",
            ClickMethod::Forced => "forced click",
            ClickMethod::Scripted => "scripted click",
            ClickMethod::Double => "double click",
        };
        f.write_str(name)
    }
}

/// Capabilities the extraction engine needs from a live page
pub trait PageDriver {
    /// Load a URL in the page
    fn navigate(&self, url: &str) -> Result<()>;

    /// Block until the page looks network-idle, or `timeout` elapses
    fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    /// All elements matching a CSS selector, in document order, below `scope` (or the document)
    fn query_all(&self, scope: Option<ElementRef>, css: &str) -> Result<Vec<ElementRef>>;

    /// `textContent` of the element
    fn text_content(&self, element: ElementRef) -> Result<String>;

    /// Raw inner markup of the element
    fn inner_html(&self, element: ElementRef) -> Result<String>;

    /// Attribute value, `None` when absent
    fn attribute(&self, element: ElementRef, name: &str) -> Result<Option<String>>;

    /// Lower-case tag name
    fn tag_name(&self, element: ElementRef) -> Result<String>;

    /// Computed style property value (e.g. `cursor`)
    fn computed_style(&self, element: ElementRef, property: &str) -> Result<String>;

    fn is_visible(&self, element: ElementRef) -> Result<bool>;

    fn click(&self, element: ElementRef, method: ClickMethod) -> Result<()>;

    /// Send a key press to the focused page (e.g. `Escape`)
    fn press_key(&self, key: &str) -> Result<()>;

    /// Evaluate a script in page context and return its value
    fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// PNG snapshot of the viewport, for diagnostics only
    fn capture_screenshot(&self) -> Result<Vec<u8>>;

    /// Tear the page down
    fn close(&self) -> Result<()>;
}
