// src/error.rs

use thiserror::Error;

/// Failures while reading the source page. All of them abort the run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("element `{0}` not found on page")]
    ElementNotFound(String),

    #[error("trade date {trade_date}: {tables} tables but {headers} section headers")]
    TableCountMismatch {
        trade_date: String,
        tables: usize,
        headers: usize,
    },

    #[error("trade date {trade_date}: page did not render after {attempts} attempts")]
    RenderTimeout { trade_date: String, attempts: u32 },
}

/// Failures while reshaping scraped rows into the persisted schema.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("category `{0}` has no short code")]
    UnmappedCategory(String),

    #[error("table `{0}` has no short code")]
    UnmappedTable(String),

    #[error("duplicate uid `{0}`")]
    DuplicateUid(String),

    #[error("cannot parse trade date `{0}`")]
    BadTradeDate(String),

    #[error("metric column `{0}` collides with a fixed column")]
    ReservedColumn(String),
}
