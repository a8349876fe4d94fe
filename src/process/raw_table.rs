use anyhow::Result;
use scraper::{ElementRef, Html};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

use crate::error::ScrapeError;
use crate::fetch::dates::selector;
use crate::process::utils::{clean_str, normalize_column};

/// Name given to the first column, which holds the row's category label.
pub const LABEL_COLUMN: &str = "category_full";

/// Cap on `colspan`/`rowspan` so a hostile attribute can't blow up the grid.
const MAX_SPAN: usize = 1000;

/// One HTML table, flattened: normalized column names plus body cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Column names, header levels joined with `_`. The first is always
    /// [`LABEL_COLUMN`].
    pub headers: Vec<String>,
    /// Each body row, padded or truncated to `headers.len()`.
    pub rows: Vec<Vec<String>>,
}

struct Cell {
    text: String,
    colspan: usize,
    rowspan: usize,
}

fn span(el: &ElementRef<'_>, attr: &str) -> usize {
    el.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

fn has_ancestor(el: &ElementRef<'_>, name: &str) -> bool {
    el.ancestors()
        .filter_map(|n| n.value().as_element())
        .take_while(|e| e.name() != "table")
        .any(|e| e.name() == name)
}

/// Lay out rows of cells on a grid, repeating spanned cells into every
/// position they cover.
fn expand(rows: &[Vec<Cell>]) -> Vec<Vec<String>> {
    // column -> (text, rows still covered)
    let mut carry: BTreeMap<usize, (String, usize)> = BTreeMap::new();
    let mut out = Vec::with_capacity(rows.len());

    for row in rows {
        let mut line: Vec<String> = Vec::new();
        let mut cells = row.iter();
        loop {
            let col = line.len();
            if let Some(entry) = carry.get_mut(&col) {
                line.push(entry.0.clone());
                entry.1 -= 1;
                let done = entry.1 == 0;
                if done {
                    carry.remove(&col);
                }
                continue;
            }
            match cells.next() {
                Some(cell) => {
                    for _ in 0..cell.colspan {
                        if cell.rowspan > 1 {
                            carry.insert(line.len(), (cell.text.clone(), cell.rowspan - 1));
                        }
                        line.push(cell.text.clone());
                    }
                }
                // a rowspan from above may still cover columns to the right
                None if carry.range(col..).next().is_some() => line.push(String::new()),
                None => break,
            }
        }
        out.push(line);
    }
    out
}

/// Join the header levels of each column into one normalized name.
fn column_names(header_grid: &[Vec<String>], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|j| {
            let mut levels: Vec<&str> = Vec::new();
            for row in header_grid {
                let Some(text) = row.get(j).map(|t| t.trim()) else {
                    continue;
                };
                if !text.is_empty() && levels.last() != Some(&text) {
                    levels.push(text);
                }
            }
            let base = if j == 0 {
                LABEL_COLUMN.to_string()
            } else {
                match normalize_column(&levels.join("_")) {
                    n if n.is_empty() => format!("col_{}", j),
                    n => n,
                }
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{}_{}", base, count)
            }
        })
        .collect()
}

impl RawTable {
    /// Flatten one `<table>` element, the way a dataframe reader would.
    pub fn from_element(table: ElementRef<'_>) -> Result<Self> {
        let tr_sel = selector("tr")?;
        let cell_sel = selector("th, td")?;

        let mut header_rows: Vec<Vec<Cell>> = Vec::new();
        let mut body_rows: Vec<Vec<Cell>> = Vec::new();
        let has_thead = table.select(&selector("thead")?).next().is_some();

        for tr in table.select(&tr_sel) {
            let mut all_th = true;
            let cells: Vec<Cell> = tr
                .select(&cell_sel)
                .map(|c| {
                    all_th &= c.value().name() == "th";
                    Cell {
                        text: clean_str(&c.text().collect::<String>()),
                        colspan: span(&c, "colspan"),
                        rowspan: span(&c, "rowspan"),
                    }
                })
                .collect();
            if cells.is_empty() {
                continue;
            }
            let is_header = if has_thead {
                has_ancestor(&tr, "thead")
            } else {
                all_th && body_rows.is_empty()
            };
            if is_header {
                header_rows.push(cells);
            } else {
                body_rows.push(cells);
            }
        }

        let header_grid = expand(&header_rows);
        let mut rows = expand(&body_rows);
        let width = header_grid
            .iter()
            .chain(rows.iter())
            .map(Vec::len)
            .max()
            .unwrap_or(0);
        for row in &mut rows {
            row.resize(width, String::new());
        }
        let headers = column_names(&header_grid, width);
        trace!(columns = headers.len(), rows = rows.len(), "parsed table");
        Ok(Self { headers, rows })
    }

    /// Index of column `name`, if present.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// The report section of a rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub tables: Vec<RawTable>,
    /// Section headings, expected to pair up with `tables` by position.
    pub headings: Vec<String>,
}

impl Report {
    /// Rendered far enough to be worth reading.
    pub fn has_content(&self) -> bool {
        !self.tables.is_empty() && !self.headings.is_empty()
    }

    /// Every heading has its table.
    pub fn is_complete(&self) -> bool {
        self.has_content() && self.tables.len() == self.headings.len()
    }
}

/// Every table and every `h3` heading inside the element with id
/// `container_id`.
pub fn parse_report(html: &str, container_id: &str) -> Result<Report> {
    let doc = Html::parse_document(html);
    let container = doc
        .select(&selector(&format!("#{}", container_id))?)
        .next()
        .ok_or_else(|| ScrapeError::ElementNotFound(format!("#{}", container_id)))?;

    let tables = container
        .select(&selector("table")?)
        .filter(|t| {
            // skip tables nested inside another report table
            !t.ancestors()
                .take_while(|n| n.id() != container.id())
                .any(|n| n.value().as_element().map(|e| e.name()) == Some("table"))
        })
        .map(RawTable::from_element)
        .collect::<Result<Vec<_>>>()?;
    let headings = container
        .select(&selector("h3")?)
        .map(|h| clean_str(&h.text().collect::<String>()))
        .collect();
    Ok(Report { tables, headings })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"
<div id="loadTable">
  <h3>Futures Only</h3>
  <table>
    <thead>
      <tr><th rowspan="2"></th><th colspan="2">Volume</th><th colspan="2">Open Interest</th></tr>
      <tr><th>Total</th><th>Y/Y %</th><th>Total</th><th>Change</th></tr>
    </thead>
    <tbody>
      <tr><td>agriculture</td><td>1,234</td><td>5.5%</td><td>10,000</td><td>-20</td></tr>
      <tr><td>interest rate</td><td>9,876</td><td>-1.0%</td><td>20,000</td><td>15</td></tr>
    </tbody>
  </table>
  <h3>Options Only</h3>
  <table>
    <tr><th></th><th>Volume</th><th>Volume</th></tr>
    <tr><td>energy</td><td>7</td></tr>
  </table>
</div>"#;

    #[test]
    fn flattens_multi_level_headers() -> Result<()> {
        let Report { tables, headings } = parse_report(REPORT, "loadTable")?;
        assert_eq!(headings, vec!["Futures Only", "Options Only"]);
        assert_eq!(tables.len(), 2);
        assert_eq!(
            tables[0].headers,
            vec![
                "category_full",
                "volume_total",
                "volume_y_y",
                "open_interest_total",
                "open_interest_change"
            ]
        );
        assert_eq!(tables[0].rows.len(), 2);
        assert_eq!(
            tables[0].rows[1],
            vec!["interest rate", "9,876", "-1.0%", "20,000", "15"]
        );
        assert_eq!(tables[0].column("open_interest_change"), Some(4));
        Ok(())
    }

    #[test]
    fn headerless_thead_uses_leading_th_rows_and_dedupes_names() -> Result<()> {
        let report = parse_report(REPORT, "loadTable")?;
        assert!(report.has_content());
        let t = &report.tables[1];
        assert_eq!(t.headers, vec!["category_full", "volume", "volume_2"]);
        assert_eq!(t.rows, vec![vec!["energy", "7", ""]]);
        Ok(())
    }

    #[test]
    fn heading_without_its_table_is_incomplete() -> Result<()> {
        let html = r#"<div id="loadTable"><h3>Futures Only</h3><h3>Options Only</h3>
            <table><tr><th></th><th>Volume</th></tr><tr><td>energy</td><td>1</td></tr></table></div>"#;
        let report = parse_report(html, "loadTable")?;
        assert!(report.has_content());
        assert!(!report.is_complete());
        assert!(parse_report(REPORT, "loadTable")?.is_complete());
        Ok(())
    }

    #[test]
    fn missing_container_is_reported() {
        let err = parse_report("<div></div>", "loadTable").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::ElementNotFound(_))
        ));
    }

    #[test]
    fn rowspan_in_body_is_repeated() {
        let rows = vec![
            vec![
                Cell { text: "a".into(), colspan: 1, rowspan: 2 },
                Cell { text: "b".into(), colspan: 1, rowspan: 1 },
            ],
            vec![Cell { text: "c".into(), colspan: 1, rowspan: 1 }],
        ];
        assert_eq!(expand(&rows), vec![vec!["a", "b"], vec!["a", "c"]]);
    }
}
