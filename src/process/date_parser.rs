use chrono::NaiveDate;

const FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a trade date as it appears in the picker's option values:
/// `YYYYMMDD`, `YYYY-MM-DD`, `YYYY/MM/DD` or `MM/DD/YYYY`.
pub fn parse_trade_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    // `%Y%m%d` also accepts shorter digit runs, so pin the length
    if s.chars().all(|c| c.is_ascii_digit()) && s.len() != 8 {
        return None;
    }
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_layouts() {
        let d = NaiveDate::from_ymd_opt(2022, 1, 5).unwrap();
        assert_eq!(parse_trade_date("20220105"), Some(d));
        assert_eq!(parse_trade_date("2022-01-05"), Some(d));
        assert_eq!(parse_trade_date("2022/01/05"), Some(d));
        assert_eq!(parse_trade_date("01/05/2022"), Some(d));
        assert_eq!(parse_trade_date(" 2022-01-05 "), Some(d));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_trade_date("2022-13-01"), None);
        assert_eq!(parse_trade_date("202201"), None);
        assert_eq!(parse_trade_date("yesterday"), None);
        assert_eq!(parse_trade_date(""), None);
    }
}
