use anyhow::{anyhow, Context, Result};
use sqlx::migrate::MigrateDatabase;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use tracing::{info, instrument};
use url::Url;

use crate::config::DatabaseConfig;

/// `{program}://{user}:{passwd}@{host}:{port}/{db}`, credentials percent-encoded.
pub fn connection_url(cfg: &DatabaseConfig, db: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}://{}:{}/", cfg.program, cfg.host, cfg.port))
        .with_context(|| format!("building connection URL for host {}", cfg.host))?;
    url.set_username(&cfg.user)
        .map_err(|_| anyhow!("cannot put user `{}` in connection URL", cfg.user))?;
    if !cfg.passwd.is_empty() {
        url.set_password(Some(&cfg.passwd))
            .map_err(|_| anyhow!("cannot put password in connection URL"))?;
    }
    url.set_path(db);
    Ok(url)
}

/// Connect to database `db`, creating it first if it doesn't exist.
#[instrument(level = "info", skip(cfg), fields(host = %cfg.host, port = cfg.port))]
pub async fn get_engine(cfg: &DatabaseConfig, db: &str) -> Result<PgPool> {
    let url = connection_url(cfg, db)?;

    let exists = Postgres::database_exists(url.as_str())
        .await
        .with_context(|| format!("checking whether database {} exists", db))?;
    if !exists {
        info!(db, "database does not exist, creating");
        Postgres::create_database(url.as_str())
            .await
            .with_context(|| format!("creating database {}", db))?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.pool_size)
        .connect(url.as_str())
        .await
        .with_context(|| format!("connecting to database {}", db))?;
    info!(db, pool_size = cfg.pool_size, "connected");
    Ok(pool)
}
