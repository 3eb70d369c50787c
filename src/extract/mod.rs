//! Row-level extraction: classification, expand controls, detail panels and record assembly

pub mod detail;
pub mod expand;
pub mod record;
pub mod row;
pub mod toggle;

pub use detail::{DetailExtractor, Dismissal, PanelRow, parse_panel_rows};
pub use expand::{Actuation, Expander, Expansion};
pub use record::RecordBuilder;
pub use row::{BasicFields, is_main_row};
pub use toggle::{ToggleMatch, ToggleSignal};
