// src/process/mod.rs
pub mod date_parser;
pub mod format;
pub mod raw_table;
pub mod rows;
pub mod schema;
pub mod snapshot;
pub mod utils;

pub use format::{format_cme, FormatOptions, FormatReport, FormattedFrame, FormattedRow};
pub use raw_table::{parse_report, RawTable, Report};
pub use rows::{flatten, RawRow, TaggedTable};
pub use schema::{ColumnDef, ColumnType};
pub use snapshot::write_snapshot;
