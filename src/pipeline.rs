// src/pipeline.rs
use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::Instant;
use tracing::{info, instrument, warn};
use url::Url;

use crate::browser::{setup_driver, PageSession, WebDriverSession};
use crate::config::{Config, EnumerateVia, SiteConfig, WaitPolicy};
use crate::db::{self, ColumnSync, Ident, SetupOutcome};
use crate::fetch::{get_cme_dates, get_download, HttpPage};
use crate::process::{flatten, format_cme, write_snapshot, FormatOptions, FormattedFrame, RawRow, TaggedTable};
use crate::types::{DateEntry, LinkEntry};

/// Everything pulled from the site in one run.
#[derive(Debug, Clone)]
pub struct Scrape {
    pub dates: Vec<DateEntry>,
    pub links: Vec<LinkEntry>,
    pub tables: Vec<TaggedTable>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dates: usize,
    pub tables: usize,
    pub rows: usize,
    pub skipped: usize,
    /// The main table did not exist before this run.
    pub created_main: bool,
    pub staged: u64,
    pub columns: ColumnSync,
    pub inserted: u64,
    pub updated: u64,
}

/// Close the browser whatever happened, keeping the first error.
async fn finish<T>(session: WebDriverSession, result: Result<T>) -> Result<T> {
    if let Err(e) = session.close().await {
        warn!(error = %e, "closing browser session failed");
    }
    result
}

/// Download every date in `dates` with `session` and snapshot the raw rows.
pub async fn collect_tables<S: PageSession>(
    session: &mut S,
    dates: Vec<DateEntry>,
    links: Vec<LinkEntry>,
    site: &SiteConfig,
    wait: &WaitPolicy,
    snapshot: &Path,
) -> Result<Scrape> {
    let url = Url::parse(&site.source_url)
        .with_context(|| format!("parsing source URL {}", site.source_url))?;
    let tables = get_download(session, &url, &dates, site, wait).await?;
    let rows = flatten(&tables);
    let written = write_snapshot(snapshot, &rows)?;
    info!(rows = written, path = %snapshot.display(), "snapshot written");
    Ok(Scrape {
        dates,
        links,
        tables,
        rows,
    })
}

/// Enumerate trade dates, then render each one in the browser.
#[instrument(level = "info", skip_all, fields(via = ?cfg.pipeline.enumerate_with))]
pub async fn get_cme_tables(cfg: &Config) -> Result<Scrape> {
    let snapshot = cfg.pipeline.snapshot_path.as_path();
    match cfg.pipeline.enumerate_with {
        EnumerateVia::Browser => {
            let mut driver = setup_driver(&cfg.browser).await?;
            let result = async {
                let (dates, links) = get_cme_dates(&mut driver, &cfg.site).await?;
                collect_tables(&mut driver, dates, links, &cfg.site, &cfg.wait, snapshot).await
            }
            .await;
            finish(driver, result).await
        }
        EnumerateVia::Http => {
            let mut page = HttpPage::new(&cfg.browser, &cfg.wait)?;
            let (dates, links) = get_cme_dates(&mut page, &cfg.site).await?;
            let mut driver = setup_driver(&cfg.browser).await?;
            let result =
                collect_tables(&mut driver, dates, links, &cfg.site, &cfg.wait, snapshot).await;
            finish(driver, result).await
        }
    }
}

/// What writing one frame did to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persisted {
    pub setup: SetupOutcome,
    pub staged: u64,
    pub columns: ColumnSync,
    pub inserted: u64,
    pub updated: u64,
}

/// Create main if needed, reload staging, then insert new trade dates and
/// refresh existing rows of main from staging.
#[instrument(level = "info", skip_all, fields(main = %cfg.pipeline.main_table))]
pub async fn persist(pool: &sqlx::PgPool, cfg: &Config, frame: &FormattedFrame) -> Result<Persisted> {
    let main = Ident::new(&cfg.pipeline.main_table)?;
    let staging = Ident::new(&cfg.pipeline.staging_table)?;
    let key = Ident::new(&cfg.pipeline.key_column)?;
    let date_col = Ident::new("trade_date")?;

    let setup = db::setup_table(pool, &main, &key, frame).await?;
    let staged = db::load_table(pool, &staging, &key, frame).await?;
    let columns = db::sync_columns(pool, &main, &frame.columns).await?;
    let inserted = db::insert_table(pool, &main, &staging, &date_col).await?;
    let updated = db::update_table(pool, &main, &staging, &key).await?;

    Ok(Persisted {
        setup,
        staged,
        columns,
        inserted,
        updated,
    })
}

/// One full run: scrape, format, write to the database.
pub async fn run(cfg: &Config) -> Result<RunSummary> {
    let started = Instant::now();

    let scrape = get_cme_tables(cfg).await?;
    let report = format_cme(&scrape.rows, FormatOptions::default())?;
    let mut summary = RunSummary {
        dates: scrape.dates.len(),
        tables: scrape.tables.len(),
        rows: report.frame.rows.len(),
        skipped: report.skipped,
        ..RunSummary::default()
    };

    if report.frame.rows.is_empty() {
        warn!("nothing scraped, leaving the database untouched");
        return Ok(summary);
    }

    let pool = db::get_engine(&cfg.database, &cfg.database.name).await?;
    let persisted = persist(&pool, cfg, &report.frame).await?;
    pool.close().await;

    summary.created_main = persisted.setup == SetupOutcome::Created;
    summary.staged = persisted.staged;
    summary.columns = persisted.columns;
    summary.inserted = persisted.inserted;
    summary.updated = persisted.updated;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "run finished");
    Ok(summary)
}
