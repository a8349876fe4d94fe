use anyhow::Result;
use cmescraper::{pipeline, Config};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cmescraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) config ───────────────────────────────────────────────────
    let cfg = Config::load()?;
    info!(
        source = %cfg.site.source_url,
        db = %cfg.database.name,
        main = %cfg.pipeline.main_table,
        staging = %cfg.pipeline.staging_table,
        "configured"
    );

    // ─── 3) scrape → format → reconcile ──────────────────────────────
    match pipeline::run(&cfg).await {
        Ok(summary) => {
            info!(
                dates = summary.dates,
                tables = summary.tables,
                rows = summary.rows,
                skipped = summary.skipped,
                created_main = summary.created_main,
                staged = summary.staged,
                columns_added = summary.columns.added.len(),
                columns_widened = summary.columns.widened.len(),
                inserted = summary.inserted,
                updated = summary.updated,
                "done"
            );
            Ok(())
        }
        Err(e) => {
            error!("run failed: {:#}", e);
            Err(e)
        }
    }
}
