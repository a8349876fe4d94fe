// src/fetch/tables.rs
use anyhow::Result;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::browser::PageSession;
use crate::config::{SiteConfig, WaitPolicy};
use crate::error::ScrapeError;
use crate::process::raw_table::{parse_report, Report};
use crate::process::rows::TaggedTable;
use crate::types::DateEntry;

enum Render {
    /// Complete, stable and different from the previous date's report.
    Ready(Report),
    /// Complete and stable but identical to the previous date's report.
    Unchanged(Report),
    /// Stable, but headings and tables never paired up.
    Partial(Report),
    NotReady,
}

/// Poll the page until the report section holds one table per heading and
/// two consecutive reads agree, or the deadline passes.
async fn wait_for_render<S: PageSession>(
    session: &mut S,
    previous: Option<&Report>,
    site: &SiteConfig,
    wait: &WaitPolicy,
) -> Result<Render> {
    let deadline = Instant::now() + wait.timeout();
    let mut last: Option<Report> = None;
    let mut unchanged: Option<Report> = None;
    let mut partial: Option<Report> = None;

    loop {
        let html = session.current_html().await?;
        match parse_report(&html, &site.table_container_id) {
            Ok(report) if report.has_content() => {
                if last.as_ref() == Some(&report) {
                    if !report.is_complete() {
                        partial = Some(report.clone());
                    } else if previous != Some(&report) {
                        return Ok(Render::Ready(report));
                    } else {
                        unchanged = Some(report.clone());
                    }
                }
                last = Some(report);
            }
            Ok(_) => last = None,
            Err(e) => {
                debug!(error = %e, "report not on page yet");
                last = None;
            }
        }

        if Instant::now() >= deadline {
            return Ok(match (unchanged, partial) {
                (Some(report), _) => Render::Unchanged(report),
                (None, Some(report)) => Render::Partial(report),
                (None, None) => Render::NotReady,
            });
        }
        sleep(wait.poll_interval()).await;
    }
}

/// Switch the dropdown to option `index` and wait for its report, retrying
/// the selection with backoff.
async fn render_date<S: PageSession>(
    session: &mut S,
    index: usize,
    date: &DateEntry,
    previous: Option<&Report>,
    site: &SiteConfig,
    wait: &WaitPolicy,
) -> Result<Report> {
    let attempts = wait.max_attempts.max(1);
    for attempt in 1..=attempts {
        session.select_index(&site.dropdown_id, index).await?;
        let render = wait_for_render(session, previous, site, wait).await?;
        match render {
            Render::Ready(report) => return Ok(report),
            Render::Unchanged(report) => {
                warn!(trade_date = %date.value, "report identical to previous trade date");
                return Ok(report);
            }
            Render::Partial(report) if attempt == attempts => {
                return Err(ScrapeError::TableCountMismatch {
                    trade_date: date.value.clone(),
                    tables: report.tables.len(),
                    headers: report.headings.len(),
                }
                .into());
            }
            Render::Partial(_) | Render::NotReady if attempt < attempts => {
                let delay = wait.backoff(attempt);
                warn!(trade_date = %date.value, attempt, delay_ms = delay.as_millis() as u64, "report not rendered, retrying");
                sleep(delay).await;
            }
            Render::Partial(_) | Render::NotReady => {}
        }
    }

    // surface a missing container as such rather than as a timeout
    let html = session.current_html().await?;
    parse_report(&html, &site.table_container_id)?;
    Err(ScrapeError::RenderTimeout {
        trade_date: date.value.clone(),
        attempts,
    }
    .into())
}

/// Open `url`, then for every trade date switch the report to that date and
/// collect each table with its section heading. One failed date, including
/// one whose headings and tables never pair up, aborts the whole batch.
#[instrument(level = "info", skip_all, fields(%url, dates = dates.len()))]
pub async fn get_download<S: PageSession>(
    session: &mut S,
    url: &Url,
    dates: &[DateEntry],
    site: &SiteConfig,
    wait: &WaitPolicy,
) -> Result<Vec<TaggedTable>> {
    session.fetch_html(url).await?;

    let mut out = Vec::new();
    let mut previous: Option<Report> = None;
    for (index, date) in dates.iter().enumerate() {
        let report = render_date(session, index, date, previous.as_ref(), site, wait).await?;
        info!(trade_date = %date.value, version = %date.version, tables = report.tables.len(), "downloaded");

        out.extend(
            report
                .headings
                .iter()
                .zip(report.tables.iter())
                .map(|(name, table)| TaggedTable::new(name.clone(), date, table.clone())),
        );
        previous = Some(report);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::PageSource;
    use crate::types::Version;

    const LOADING: &str = r#"<html><body><div id="loadTable"><p>Loading…</p></div></body></html>"#;

    fn page(seed: u32, headings: &[&str], tables: usize) -> String {
        let mut body = String::from(r#"<html><body><div id="loadTable">"#);
        for h in headings {
            body.push_str(&format!("<h3>{}</h3>", h));
        }
        for t in 0..tables {
            body.push_str(&format!(
                "<table><thead><tr><th></th><th>Volume</th></tr></thead>\
                 <tbody><tr><td>energy</td><td>{}</td></tr>\
                 <tr><td>metals</td><td>{}</td></tr></tbody></table>",
                seed * 10 + t as u32,
                seed * 100 + t as u32
            ));
        }
        body.push_str("</div></body></html>");
        body
    }

    /// Serves `pages[i]` once option `i` is selected, after `delay` polls of
    /// `loading`.
    struct FakeSession {
        pages: Vec<String>,
        loading: String,
        delay: usize,
        selected: Option<usize>,
        polls: usize,
        selects: usize,
    }

    impl FakeSession {
        fn new(pages: Vec<String>, delay: usize) -> Self {
            Self {
                pages,
                loading: LOADING.to_string(),
                delay,
                selected: None,
                polls: 0,
                selects: 0,
            }
        }
    }

    impl PageSource for FakeSession {
        async fn fetch_html(&mut self, _url: &Url) -> Result<String> {
            Ok(LOADING.to_string())
        }
    }

    impl PageSession for FakeSession {
        async fn current_html(&mut self) -> Result<String> {
            self.polls += 1;
            match self.selected {
                Some(i) if self.polls > self.delay => Ok(self.pages[i].clone()),
                _ => Ok(self.loading.clone()),
            }
        }

        async fn select_index(&mut self, select_id: &str, index: usize) -> Result<()> {
            assert_eq!(select_id, "tradesDropdown");
            self.selected = Some(index);
            self.polls = 0;
            self.selects += 1;
            Ok(())
        }

        async fn close(self) -> Result<()> {
            Ok(())
        }
    }

    fn fast_wait(timeout_ms: u64) -> WaitPolicy {
        WaitPolicy {
            timeout_ms,
            poll_interval_ms: 1,
            max_attempts: 2,
            backoff_ms: 1,
        }
    }

    fn dates(n: usize) -> Vec<DateEntry> {
        (0..n)
            .map(|i| {
                let label = if i == 0 { "Preliminary" } else { "Final" };
                DateEntry::new(format!("2022010{}", 5 - i), format!("Jan {} ({})", 5 - i, label))
            })
            .collect()
    }

    fn url() -> Url {
        Url::parse("https://example.com/report.html").unwrap()
    }

    #[tokio::test]
    async fn yields_one_table_per_date_and_heading() -> Result<()> {
        let headings = ["Futures Only", "Options Only"];
        let pages = (0..3).map(|i| page(i, &headings, 2)).collect();
        let mut session = FakeSession::new(pages, 2);
        let dates = dates(3);

        let out = get_download(&mut session, &url(), &dates, &SiteConfig::default(), &fast_wait(2_000)).await?;

        assert_eq!(out.len(), 3 * 2);
        assert_eq!(session.selects, 3);
        assert_eq!(out[0].table_name, "Futures Only");
        assert_eq!(out[0].trade_date, "20220105");
        assert_eq!(out[0].version, Version::Preliminary);
        assert_eq!(out[1].table_name, "Options Only");
        assert_eq!(out[5].trade_date, "20220103");
        assert_eq!(out[5].version, Version::Final);
        assert_eq!(out[5].table.rows[1], vec!["metals", "201"]);
        Ok(())
    }

    #[tokio::test]
    async fn heading_table_count_mismatch_aborts() {
        let pages = vec![page(0, &["Futures Only", "Options Only"], 1)];
        let mut session = FakeSession::new(pages, 0);
        let err = get_download(&mut session, &url(), &dates(1), &SiteConfig::default(), &fast_wait(30))
            .await
            .unwrap_err();
        match err.downcast_ref::<ScrapeError>() {
            Some(ScrapeError::TableCountMismatch { tables, headers, .. }) => {
                assert_eq!((*tables, *headers), (1, 2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(session.selects, 2);
    }

    #[tokio::test]
    async fn headings_ahead_of_tables_keep_polling() -> Result<()> {
        let headings = ["Futures Only", "Options Only"];
        let mut session = FakeSession::new(vec![page(3, &headings, 2)], 4);
        session.loading = page(3, &headings, 1);

        let out = get_download(&mut session, &url(), &dates(1), &SiteConfig::default(), &fast_wait(2_000)).await?;

        assert_eq!(out.len(), 2);
        assert_eq!(session.selects, 1);
        assert_eq!(out[1].table_name, "Options Only");
        assert_eq!(out[1].table.rows[0], vec!["energy", "31"]);
        Ok(())
    }

    #[tokio::test]
    async fn never_rendering_times_out_after_retries() {
        let mut session = FakeSession::new(vec![page(0, &["Futures Only"], 1)], usize::MAX);
        let err = get_download(&mut session, &url(), &dates(1), &SiteConfig::default(), &fast_wait(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::RenderTimeout { attempts: 2, .. })
        ));
        assert_eq!(session.selects, 2);
    }

    #[tokio::test]
    async fn missing_container_is_element_not_found() {
        let mut session = FakeSession::new(vec!["<html><body></body></html>".to_string()], 0);
        let err = get_download(&mut session, &url(), &dates(1), &SiteConfig::default(), &fast_wait(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::ElementNotFound(_))
        ));
    }

    #[tokio::test]
    async fn identical_consecutive_reports_are_accepted() -> Result<()> {
        let same = page(7, &["Futures Only"], 1);
        let mut session = FakeSession::new(vec![same.clone(), same], 1);
        let out = get_download(&mut session, &url(), &dates(2), &SiteConfig::default(), &fast_wait(30)).await?;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].table, out[1].table);
        assert_eq!(out[1].trade_date, "20220104");
        Ok(())
    }
}
