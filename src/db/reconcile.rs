use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPool;
use tracing::{info, instrument, warn};

use crate::db::ident::{column_list, Ident};
use crate::process::schema::{ColumnDef, ColumnType};

/// Columns of `table` in ordinal order.
pub async fn table_columns(pool: &PgPool, table: &Ident) -> Result<Vec<ColumnDef>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT column_name::text, data_type::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 \
         ORDER BY ordinal_position",
    )
    .bind(table.as_str())
    .fetch_all(pool)
    .await
    .with_context(|| format!("reading columns of {}", table))?;

    if rows.is_empty() {
        bail!("table {} does not exist", table);
    }
    rows.into_iter()
        .map(|(name, ty)| Ok(ColumnDef::new(name, ColumnType::from_information_schema(&ty)?)))
        .collect()
}

pub async fn row_count(pool: &PgPool, table: &Ident) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .with_context(|| format!("counting rows of {}", table))
}

/// Column changes made by [`sync_columns`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSync {
    pub added: Vec<String>,
    /// Columns converted to TEXT because a new pull no longer fits their type.
    pub widened: Vec<String>,
}

impl ColumnSync {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.widened.is_empty()
    }
}

/// Make `target` able to take every column of `wanted`: add the ones it
/// lacks, and turn a non-TEXT column into TEXT when `wanted` types it
/// differently. A TEXT column already accepts any value.
#[instrument(level = "info", skip(pool, wanted), fields(table = %target))]
pub async fn sync_columns(pool: &PgPool, target: &Ident, wanted: &[ColumnDef]) -> Result<ColumnSync> {
    let existing = table_columns(pool, target).await?;
    let mut sync = ColumnSync::default();
    for col in wanted {
        let name = Ident::new(&col.name)?;
        match existing.iter().find(|e| e.name == col.name) {
            Some(e) if e.ty == col.ty || e.ty == ColumnType::Text => {}
            Some(e) => {
                warn!(column = %col.name, have = %e.ty, incoming = %col.ty, "column type drifted, widening to TEXT");
                sqlx::query(&format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE TEXT USING {}::text",
                    target, name, name
                ))
                .execute(pool)
                .await
                .with_context(|| format!("widening {} of {} to TEXT", name, target))?;
                sync.widened.push(col.name.clone());
            }
            None => {
                sqlx::query(&format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                    target,
                    name,
                    col.ty.sql()
                ))
                .execute(pool)
                .await
                .with_context(|| format!("adding column {} to {}", name, target))?;
                sync.added.push(col.name.clone());
            }
        }
    }
    if !sync.is_empty() {
        info!(added = ?sync.added, widened = ?sync.widened, "synced columns");
    }
    Ok(sync)
}

/// `UPDATE target AS t SET c = s.c, ... FROM source AS s WHERE t.key = s.key`
pub fn build_update_sql(target: &Ident, source: &Ident, key: &Ident, cols: &[Ident]) -> Result<String> {
    let sets = cols
        .iter()
        .filter(|c| *c != key)
        .map(|c| format!("{c} = s.{c}"))
        .collect::<Vec<_>>();
    if sets.is_empty() {
        bail!("nothing to update in {} besides {}", target, key);
    }
    Ok(format!(
        "UPDATE {} AS t SET {} FROM {} AS s WHERE t.{} = s.{}",
        target,
        sets.join(", "),
        source,
        key,
        key
    ))
}

/// Copy rows of `source` whose `date_col` value `target` has never seen.
pub fn build_insert_sql(target: &Ident, source: &Ident, date_col: &Ident, cols: &[Ident]) -> Result<String> {
    if cols.is_empty() {
        bail!("no columns to insert into {}", target);
    }
    if !cols.contains(date_col) {
        bail!("{} is not among the inserted columns", date_col);
    }
    let selected = cols
        .iter()
        .map(|c| format!("s.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) SELECT {} FROM {} AS s \
         WHERE NOT EXISTS (SELECT 1 FROM {} AS t WHERE t.{} = s.{})",
        target,
        column_list(cols),
        selected,
        source,
        target,
        date_col,
        date_col
    ))
}

async fn source_idents(pool: &PgPool, source: &Ident) -> Result<Vec<Ident>> {
    table_columns(pool, source)
        .await?
        .iter()
        .map(|c| Ident::new(&c.name))
        .collect()
}

/// Overwrite every `target` row that has a match on `key` in `source`.
#[instrument(level = "info", skip_all, fields(to = %target, from = %source))]
pub async fn update_table(pool: &PgPool, target: &Ident, source: &Ident, key: &Ident) -> Result<u64> {
    let cols = source_idents(pool, source).await?;
    let sql = build_update_sql(target, source, key, &cols)?;

    let mut tx = pool.begin().await.context("beginning update transaction")?;
    let updated = sqlx::query(&sql)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("updating {} from {}", target, source))?
        .rows_affected();
    tx.commit().await.context("committing update")?;

    info!(rows = updated, "{} updated from {}", target, source);
    Ok(updated)
}

/// Append `source` rows for trade dates `target` does not have yet.
#[instrument(level = "info", skip_all, fields(to = %target, from = %source))]
pub async fn insert_table(pool: &PgPool, target: &Ident, source: &Ident, date_col: &Ident) -> Result<u64> {
    let cols = source_idents(pool, source).await?;
    let sql = build_insert_sql(target, source, date_col, &cols)?;

    let mut tx = pool.begin().await.context("beginning insert transaction")?;
    let inserted = sqlx::query(&sql)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("inserting into {} from {}", target, source))?
        .rows_affected();
    tx.commit().await.context("committing insert")?;

    info!(rows = inserted, "{} new rows inserted into {}", inserted, target);
    Ok(inserted)
}
