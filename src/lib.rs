//! # table-harvest
//!
//! A Rust library for extracting hierarchical records from paginated, dynamically rendered
//! HTML tables via Chrome DevTools Protocol (CDP).
//!
//! ## Features
//!
//! - **Browser Session Management**: Launch or connect to Chrome/Chromium instances
//! - **Selector Strategy**: Ordered query candidates instead of a single brittle selector
//! - **Hierarchy Discovery**: Detects expand controls, reveals child rows and links them to their parent
//! - **Detail Panels**: Opens each row's popup and flattens its header/value table
//! - **Pagination**: Walks every page until no next-page control is left
//! - **Output**: Per-page JSON, a running CSV and a failure list
//!
//! ## Command Line
//!
//! ```bash
//! # Run headless against the default table
//! cargo run --bin table-harvest
//!
//! # Visible browser, custom output directory and config
//! cargo run --bin table-harvest -- --headed --out results --config harvest.json
//! ```
//!
//! ## Library Usage
//!
//! ```rust,no_run
//! use table_harvest::{BrowserSession, FileSink, HarvestConfig, Harvester, LaunchOptions};
//!
//! # fn main() -> table_harvest::Result<()> {
//! let session = BrowserSession::launch(LaunchOptions::default())?;
//! let config = HarvestConfig::default().with_start_url("https://example.com/codes");
//! let sink = FileSink::from_config(&config);
//!
//! let (report, state) = Harvester::new(&session, config, sink).run()?;
//! println!("{}", report);
//! println!("{} records", state.records.len());
//! # Ok(())
//! # }
//! ```
//!
//! Anything implementing [`PageDriver`] can stand in for the browser, which is how the
//! extraction logic is tested without Chrome.
//!
//! ## Module Overview
//!
//! - [`browser`]: Page driver trait, browser session management and configuration
//! - [`locate`]: Ordered query candidates
//! - [`extract`]: Row classification, expand controls, detail panels, record assembly
//! - [`navigator`]: Page readiness, per-page traversal and pagination
//! - [`harvest`]: The extraction session
//! - [`output`]: Record sinks and column ordering
//! - [`config`]: Run configuration
//! - [`error`]: Error types and result aliases

pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod harvest;
pub mod locate;
pub mod model;
pub mod navigator;
pub mod output;
pub mod poll;

pub use browser::{BrowserSession, ClickMethod, ConnectionOptions, ElementRef, LaunchOptions, PageDriver};
pub use config::HarvestConfig;
pub use error::{HarvestError, Result};
pub use harvest::{HarvestReport, Harvester, StopReason};
pub use locate::{Query, TextMatch};
pub use model::{FailureEntry, Level, PageOutcome, Record, SessionState};
pub use output::{ColumnLayout, FileSink, RecordSink};
