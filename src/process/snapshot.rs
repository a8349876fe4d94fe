// src/process/snapshot.rs

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, instrument};

use crate::process::raw_table::LABEL_COLUMN;
use crate::process::rows::{metric_columns, RawRow};

/// Write every raw row to a CSV file: label, metric columns in first-seen
/// order, then the tags. Cells a row doesn't have are left empty.
#[instrument(level = "info", skip(rows), fields(path = %path.as_ref().display()))]
pub fn write_snapshot(path: impl AsRef<Path>, rows: &[RawRow]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let metrics = metric_columns(rows);
    let mut wtr =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;

    let mut header: Vec<&str> = vec![LABEL_COLUMN];
    header.extend(metrics.iter().map(String::as_str));
    header.extend(["table_name", "trade_date", "trade_text", "version"]);
    wtr.write_record(&header)?;

    for row in rows {
        let mut record: Vec<&str> = Vec::with_capacity(header.len());
        record.push(&row.category_full);
        record.extend(metrics.iter().map(|m| row.metric(m).unwrap_or("")));
        record.extend([
            row.table_name.as_str(),
            row.trade_date.as_str(),
            row.trade_text.as_str(),
            row.version.code(),
        ]);
        wtr.write_record(&record)?;
    }
    wtr.flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    info!(rows = rows.len(), "wrote snapshot");
    Ok(rows.len())
}
