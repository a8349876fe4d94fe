use anyhow::{bail, Result};
use std::fmt;

/// Postgres truncates identifiers longer than this.
const MAX_IDENT_LEN: usize = 63;

/// A table or column name that is safe to splice into SQL text.
/// Displays double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn new(name: &str) -> Result<Self> {
        let valid_start = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
        let valid_rest = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_start || !valid_rest || name.len() > MAX_IDENT_LEN {
            bail!("`{}` is not a valid identifier", name);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// `"a", "b", "c"`
pub fn column_list(cols: &[Ident]) -> String {
    cols.iter()
        .map(Ident::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
