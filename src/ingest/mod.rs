//! Import and export of exchange formats
//!
//! - `tab`: tab-delimited hash attribution lines
//! - `json`: line-oriented JSON records, import and export

pub mod json;
pub mod tab;

pub use json::{export_json, import_json};
pub use tab::import_tab;
