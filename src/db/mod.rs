// src/db/mod.rs
pub mod engine;
pub mod ident;
pub mod lifecycle;
pub mod reconcile;

pub use engine::get_engine;
pub use ident::Ident;
pub use lifecycle::{load_table, setup_table, SetupOutcome};
pub use reconcile::{insert_table, row_count, sync_columns, table_columns, update_table, ColumnSync};
