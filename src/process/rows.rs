// src/process/rows.rs

use crate::process::raw_table::RawTable;
use crate::types::{DateEntry, Version};

/// One scraped table for one trade date, with its section heading.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTable {
    pub table_name: String,
    pub trade_date: String,
    pub trade_text: String,
    pub version: Version,
    pub table: RawTable,
}

/// One body row of a [`TaggedTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub table_name: String,
    pub category_full: String,
    pub trade_date: String,
    pub trade_text: String,
    pub version: Version,
    /// (column, raw cell) for every column after the label, in table order.
    pub metrics: Vec<(String, String)>,
}

impl TaggedTable {
    pub fn new(table_name: impl Into<String>, date: &DateEntry, table: RawTable) -> Self {
        Self {
            table_name: table_name.into(),
            trade_date: date.value.clone(),
            trade_text: date.text.clone(),
            version: date.version,
            table,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow> + '_ {
        self.table.rows.iter().map(move |cells| RawRow {
            table_name: self.table_name.clone(),
            category_full: cells.first().cloned().unwrap_or_default(),
            trade_date: self.trade_date.clone(),
            trade_text: self.trade_text.clone(),
            version: self.version,
            metrics: self
                .table
                .headers
                .iter()
                .skip(1)
                .cloned()
                .zip(cells.iter().skip(1).cloned())
                .collect(),
        })
    }
}

/// All rows of all tables, tables in order.
pub fn flatten(tables: &[TaggedTable]) -> Vec<RawRow> {
    tables.iter().flat_map(TaggedTable::rows).collect()
}

/// Metric column names across `rows`, in first-seen order.
pub fn metric_columns(rows: &[RawRow]) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    for row in rows {
        for (name, _) in &row.metrics {
            if !cols.contains(name) {
                cols.push(name.clone());
            }
        }
    }
    cols
}

impl RawRow {
    pub fn metric(&self, name: &str) -> Option<&str> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
