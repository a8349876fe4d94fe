// src/process/format.rs

use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

use crate::error::FormatError;
use crate::process::date_parser::parse_trade_date;
use crate::process::rows::{metric_columns, RawRow};
use crate::process::schema::{fixed_columns, is_fixed_column, ColumnDef, FIXED_COLUMNS};
use crate::process::utils::{clean_str, infer_column_type};
use crate::types::Version;

/// Category label → short code.
pub const CATEGORY_CODES: &[(&str, &str)] = &[
    ("exchange", "exc"),
    ("exchange futures", "exc_fut"),
    ("exchange options", "exc_opt"),
    ("OTC Cleared-Only Forward Swaps", "otc"),
    ("agriculture", "agr"),
    ("energy", "ene"),
    ("equities", "equ"),
    ("FX", "fx"),
    ("interest rate", "int_rate"),
    ("metals", "met"),
    ("CBOT Division", "cbot"),
    ("CME Division", "cme"),
    ("COMEX Division", "comex"),
    ("GEM Division", "gem"),
    ("IMM Division", "imm"),
    ("IOM Division", "iom"),
    ("NYMEX Division", "nymex"),
];

/// Section heading → short code. The division and exchange tables have no
/// table code; their categories are already unique.
pub const TABLE_CODES: &[(&str, &str)] = &[
    ("Futures, Options & Forwards", "fof"),
    ("Futures Only", "fut"),
    ("Options Only", "opt"),
    ("Forward Swaps Only", "fs"),
    ("Options Forward Swaps", "ofs"),
    ("Divisions", ""),
    ("Exchange", ""),
];

pub fn category_code(label: &str) -> Option<&'static str> {
    lookup(CATEGORY_CODES, label)
}

pub fn table_code(name: &str) -> Option<&'static str> {
    lookup(TABLE_CODES, name)
}

fn lookup(map: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    let key = clean_str(key);
    map.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// `{trade_date}_{category}_{table}`.
pub fn make_uid(trade_date: &str, category: &str, table: &str) -> String {
    format!("{}_{}_{}", trade_date, category, table)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Fail on an unmapped category or table instead of skipping the row.
    pub strict: bool,
}

/// A raw row with its derived keys.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedRow {
    pub uid: String,
    pub table_name: String,
    pub category_full: String,
    pub trade_date: NaiveDate,
    pub trade_text: String,
    pub version: Version,
    pub category: &'static str,
    pub table_trunc: &'static str,
    pub metrics: Vec<(String, String)>,
}

impl FormattedRow {
    pub fn metric(&self, name: &str) -> Option<&str> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Formatted rows plus their typed column list.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedFrame {
    /// Fixed columns followed by metric columns.
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<FormattedRow>,
}

impl FormattedFrame {
    pub fn metric_columns(&self) -> &[ColumnDef] {
        &self.columns[FIXED_COLUMNS.len()..]
    }

    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.uid.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatReport {
    pub frame: FormattedFrame,
    /// Rows dropped because their category or table has no short code.
    pub skipped: usize,
}

/// Map labels to short codes, derive the uid, type the trade date and the
/// metric columns.
#[instrument(level = "info", skip_all, fields(rows = raw.len()))]
pub fn format_cme(raw: &[RawRow], opts: FormatOptions) -> Result<FormatReport> {
    let mut rows = Vec::with_capacity(raw.len());
    let mut seen: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut skipped = 0;

    for r in raw {
        let category = match category_code(&r.category_full) {
            Some(c) => c,
            None if opts.strict => {
                return Err(FormatError::UnmappedCategory(r.category_full.clone()).into())
            }
            None => {
                warn!(category = %r.category_full, table = %r.table_name, trade_date = %r.trade_date, "unmapped category, skipping row");
                skipped += 1;
                continue;
            }
        };
        let table_trunc = match table_code(&r.table_name) {
            Some(t) => t,
            None if opts.strict => {
                return Err(FormatError::UnmappedTable(r.table_name.clone()).into())
            }
            None => {
                warn!(table = %r.table_name, trade_date = %r.trade_date, "unmapped table, skipping row");
                skipped += 1;
                continue;
            }
        };

        let uid = make_uid(&r.trade_date, category, table_trunc);
        if !seen.insert(uid.clone()) {
            return Err(FormatError::DuplicateUid(uid).into());
        }
        let trade_date = parse_trade_date(&r.trade_date)
            .ok_or_else(|| FormatError::BadTradeDate(r.trade_date.clone()))?;

        rows.push(FormattedRow {
            uid,
            table_name: r.table_name.clone(),
            category_full: r.category_full.clone(),
            trade_date,
            trade_text: r.trade_text.clone(),
            version: r.version,
            category,
            table_trunc,
            metrics: r.metrics.clone(),
        });
    }

    let mut columns = fixed_columns();
    for name in metric_columns(raw) {
        if is_fixed_column(&name) {
            return Err(FormatError::ReservedColumn(name).into());
        }
        let ty = infer_column_type(rows.iter().filter_map(|r| r.metric(&name)));
        columns.push(ColumnDef::new(name, ty));
    }

    info!(rows = rows.len(), skipped, columns = columns.len(), "formatted");
    Ok(FormatReport {
        frame: FormattedFrame { columns, rows },
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::schema::ColumnType;

    fn raw(table: &str, label: &str, date: &str, metrics: &[(&str, &str)]) -> RawRow {
        RawRow {
            table_name: table.to_string(),
            category_full: label.to_string(),
            trade_date: date.to_string(),
            trade_text: format!("{} (Final)", date),
            version: Version::Final,
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn every_mapped_label_gets_its_code() {
        for (label, code) in CATEGORY_CODES {
            assert_eq!(category_code(label), Some(*code));
        }
        for (name, code) in TABLE_CODES {
            assert_eq!(table_code(name), Some(*code));
        }
        assert_eq!(category_code("agriculture"), Some("agr"));
        assert_eq!(table_code("Futures Only"), Some("fut"));
        assert_eq!(category_code("  interest\nrate "), Some("int_rate"));
        assert_eq!(category_code("Agriculture"), None);
    }

    #[test]
    fn uid_joins_date_category_and_table() -> Result<()> {
        let rows = vec![raw("Futures Only", "interest rate", "2022-01-05", &[("volume", "10")])];
        let report = format_cme(&rows, FormatOptions::default())?;
        let row = &report.frame.rows[0];
        assert_eq!(row.uid, "2022-01-05_int_rate_fut");
        assert_eq!(row.trade_date, NaiveDate::from_ymd_opt(2022, 1, 5).unwrap());
        assert_eq!(row.category, "int_rate");
        assert_eq!(row.table_trunc, "fut");
        Ok(())
    }

    #[test]
    fn uids_are_unique_over_well_formed_input() -> Result<()> {
        let mut rows = Vec::new();
        for date in ["20220103", "20220104"] {
            for table in ["Futures Only", "Options Only", "Futures, Options & Forwards"] {
                for label in ["agriculture", "energy", "metals", "FX"] {
                    rows.push(raw(table, label, date, &[("volume", "1")]));
                }
            }
            rows.push(raw("Divisions", "CME Division", date, &[("volume", "1")]));
            rows.push(raw("Exchange", "exchange", date, &[("volume", "1")]));
        }
        let report = format_cme(&rows, FormatOptions::default())?;
        assert_eq!(report.frame.rows.len(), rows.len());
        let uids: HashSet<&str> = report.frame.uids().collect();
        assert_eq!(uids.len(), rows.len());
        assert!(uids.contains("20220104_cme_"));
        Ok(())
    }

    #[test]
    fn unmapped_rows_are_skipped_or_rejected() -> Result<()> {
        let rows = vec![
            raw("Futures Only", "energy", "20220105", &[]),
            raw("Futures Only", "Total", "20220105", &[]),
            raw("Mystery Table", "energy", "20220105", &[]),
        ];
        let report = format_cme(&rows, FormatOptions::default())?;
        assert_eq!(report.frame.rows.len(), 1);
        assert_eq!(report.skipped, 2);

        let err = format_cme(&rows, FormatOptions { strict: true }).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::UnmappedCategory(c)) if c == "Total"
        ));
        Ok(())
    }

    #[test]
    fn duplicate_uid_is_an_error() {
        let rows = vec![
            raw("Divisions", "CME Division", "20220105", &[]),
            raw("Exchange", "CME Division", "20220105", &[]),
        ];
        let err = format_cme(&rows, FormatOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::DuplicateUid(u)) if u == "20220105_cme_"
        ));
    }

    #[test]
    fn bad_trade_date_is_an_error() {
        let rows = vec![raw("Futures Only", "energy", "not-a-date", &[])];
        let err = format_cme(&rows, FormatOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::BadTradeDate(_))
        ));
    }

    #[test]
    fn metric_columns_are_typed() -> Result<()> {
        let rows = vec![
            raw("Futures Only", "energy", "20220105", &[("volume", "1,000"), ("note", "n.m.")]),
            raw("Options Only", "energy", "20220105", &[("volume", "-"), ("note", "3")]),
        ];
        let report = format_cme(&rows, FormatOptions::default())?;
        let metrics = report.frame.metric_columns();
        assert_eq!(metrics[0], ColumnDef::new("volume", ColumnType::Double));
        assert_eq!(metrics[1], ColumnDef::new("note", ColumnType::Text));
        Ok(())
    }

    #[test]
    fn reserved_metric_name_is_rejected() {
        let rows = vec![raw("Futures Only", "energy", "20220105", &[("version", "1")])];
        let err = format_cme(&rows, FormatOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::ReservedColumn(c)) if c == "version"
        ));
    }
}
