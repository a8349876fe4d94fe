// src/process/schema.rs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SQL type of a persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Double,
    Date,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Date => "DATE",
        }
    }

    /// Map an `information_schema.columns.data_type` value back.
    pub fn from_information_schema(data_type: &str) -> Result<Self> {
        Ok(match data_type {
            "text" | "character varying" => ColumnType::Text,
            "double precision" | "real" | "numeric" | "bigint" | "integer" => ColumnType::Double,
            "date" => ColumnType::Date,
            other => bail!("unsupported column type `{}`", other),
        })
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Leading columns every formatted row has, in persisted order.
pub const FIXED_COLUMNS: &[(&str, ColumnType)] = &[
    ("uid", ColumnType::Text),
    ("table_name", ColumnType::Text),
    ("category_full", ColumnType::Text),
    ("trade_date", ColumnType::Date),
    ("trade_text", ColumnType::Text),
    ("version", ColumnType::Text),
    ("category", ColumnType::Text),
    ("table_trunc", ColumnType::Text),
];

pub fn fixed_columns() -> Vec<ColumnDef> {
    FIXED_COLUMNS
        .iter()
        .map(|(name, ty)| ColumnDef::new(*name, *ty))
        .collect()
}

pub fn is_fixed_column(name: &str) -> bool {
    FIXED_COLUMNS.iter().any(|(n, _)| *n == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn information_schema_round_trip() -> Result<()> {
        for ty in [ColumnType::Text, ColumnType::Double, ColumnType::Date] {
            let reported = ty.sql().to_lowercase();
            assert_eq!(ColumnType::from_information_schema(&reported)?, ty);
        }
        assert!(ColumnType::from_information_schema("jsonb").is_err());
        Ok(())
    }

    #[test]
    fn uid_leads_fixed_columns() {
        let cols = fixed_columns();
        assert_eq!(cols[0], ColumnDef::new("uid", ColumnType::Text));
        assert!(is_fixed_column("trade_date"));
        assert!(!is_fixed_column("volume"));
    }
}
