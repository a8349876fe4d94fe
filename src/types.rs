// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Whether a report for a trade date is still preliminary or already final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    Preliminary,
    Final,
}

impl Version {
    /// Infer from the option text shown in the trade-date picker.
    pub fn from_label(text: &str) -> Self {
        if text.contains("Preliminary") {
            Version::Preliminary
        } else {
            Version::Final
        }
    }

    /// Single-letter code persisted in the `version` column.
    pub fn code(&self) -> &'static str {
        match self {
            Version::Preliminary => "P",
            Version::Final => "F",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One option of the trade-date picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateEntry {
    /// The option's `value` attribute, e.g. `20220105`.
    pub value: String,
    /// The option's visible text.
    pub text: String,
    pub version: Version,
}

impl DateEntry {
    pub fn new(value: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            value: value.into(),
            version: Version::from_label(&text),
            text,
        }
    }
}

/// A report page linked from the source page's navigation list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub label: String,
    pub url: Url,
}
