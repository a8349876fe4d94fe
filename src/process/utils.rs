use once_cell::sync::Lazy;
use regex::Regex;

use crate::process::schema::ColumnType;

static NON_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9_]+").expect("identifier regex should parse"));
static UNDERSCORES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_{2,}").expect("underscore regex should parse"));

/// 1) Trim and collapse inner runs of whitespace (incl. nbsp) to one space.
pub fn clean_str(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '\u{a0}')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 2) Turn a header label into a column name: lowercase, anything outside
/// `[a-z0-9_]` becomes `_`, no leading/trailing/double underscores, and
/// never starts with a digit.
pub fn normalize_column(label: &str) -> String {
    let lower = clean_str(label).to_lowercase();
    let replaced = NON_IDENT.replace_all(&lower, "_");
    let collapsed = UNDERSCORES.replace_all(&replaced, "_");
    let name = collapsed.trim_matches('_');
    match name.chars().next() {
        Some(c) if c.is_ascii_digit() => format!("c_{}", name),
        _ => name.to_string(),
    }
}

/// 3) Parse a displayed number: `1,234`, `-5.5%`, `(12)`, `+3`. Empty cells,
/// dashes and `N/A` are `None`; anything else is not a number.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = clean_str(raw);
    let (negative, s) = match s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        Some(inner) => (true, inner.to_string()),
        None => (false, s),
    };
    let s = s.trim_end_matches('%').replace(',', "");
    let s = s.strip_prefix('+').unwrap_or(&s);
    let v: f64 = s.parse().ok()?;
    if !v.is_finite() {
        return None;
    }
    Some(if negative { -v } else { v })
}

/// Cells that carry no value.
pub fn is_blank(raw: &str) -> bool {
    matches!(clean_str(raw).as_str(), "" | "-" | "--" | "\u{2014}" | "N/A" | "n/a")
}

/// 4) Infer the SQL type of a metric column from its raw cells: DOUBLE when
/// every non-blank cell is numeric, TEXT otherwise.
pub fn infer_column_type<'a, I>(cells: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let all_numeric = cells
        .into_iter()
        .filter(|c| !is_blank(c))
        .all(|c| parse_number(c).is_some());
    if all_numeric {
        ColumnType::Double
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_header_labels() {
        assert_eq!(normalize_column("Open Interest"), "open_interest");
        assert_eq!(normalize_column("Volume_ADV Y/Y"), "volume_adv_y_y");
        assert_eq!(normalize_column("  Futures & Options  "), "futures_options");
        assert_eq!(normalize_column("% Chg"), "chg");
        assert_eq!(normalize_column("2021 ADV"), "c_2021_adv");
        assert_eq!(normalize_column("Pre-Market"), "pre_market");
        assert_eq!(normalize_column(""), "");
    }

    #[test]
    fn parses_displayed_numbers() {
        assert_eq!(parse_number("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_number("-12.5%"), Some(-12.5));
        assert_eq!(parse_number("(42)"), Some(-42.0));
        assert_eq!(parse_number("+3"), Some(3.0));
        assert_eq!(parse_number(" 7 "), Some(7.0));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn infers_column_types() {
        assert_eq!(infer_column_type(["1,000", "-", "2.5%"]), ColumnType::Double);
        assert_eq!(infer_column_type(["1,000", "n.m."]), ColumnType::Text);
        assert_eq!(infer_column_type(Vec::<&str>::new()), ColumnType::Double);
    }

    #[test]
    fn cleans_whitespace() {
        assert_eq!(clean_str("  interest\n   rate\u{a0}"), "interest rate");
    }
}
