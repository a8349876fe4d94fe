use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, instrument};

use crate::db::ident::{column_list, Ident};
use crate::process::format::{FormattedFrame, FormattedRow};
use crate::process::schema::{ColumnDef, ColumnType};
use crate::process::utils::{is_blank, parse_number};

/// Postgres accepts at most this many bind parameters per statement.
const BIND_LIMIT: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupOutcome {
    Created,
    AlreadyExists,
}

/// One bindable cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    Double(Option<f64>),
    Date(Option<NaiveDate>),
}

/// Cells of `row` in `columns` order, typed per column.
pub fn row_values(row: &FormattedRow, columns: &[ColumnDef]) -> Vec<SqlValue> {
    columns
        .iter()
        .map(|col| {
            let text = |s: &str| SqlValue::Text(Some(s.to_string()));
            match col.name.as_str() {
                "uid" => text(&row.uid),
                "table_name" => text(&row.table_name),
                "category_full" => text(&row.category_full),
                "trade_date" => SqlValue::Date(Some(row.trade_date)),
                "trade_text" => text(&row.trade_text),
                "version" => text(row.version.code()),
                "category" => text(row.category),
                "table_trunc" => text(row.table_trunc),
                metric => {
                    let raw = row.metric(metric).filter(|v| !is_blank(v));
                    match col.ty {
                        ColumnType::Double => SqlValue::Double(raw.and_then(parse_number)),
                        ColumnType::Text => SqlValue::Text(raw.map(str::to_string)),
                        ColumnType::Date => SqlValue::Date(
                            raw.and_then(crate::process::date_parser::parse_trade_date),
                        ),
                    }
                }
            }
        })
        .collect()
}

/// `CREATE TABLE "t" (... , PRIMARY KEY ("key"))`
pub fn build_create_sql(table: &Ident, key: &Ident, columns: &[ColumnDef]) -> Result<String> {
    if !columns.iter().any(|c| c.name == key.as_str()) {
        bail!("key column {} is not among the columns of {}", key, table);
    }
    let defs = columns
        .iter()
        .map(|c| {
            let name = Ident::new(&c.name)?;
            let not_null = if name == *key { " NOT NULL" } else { "" };
            Ok(format!("{} {}{}", name, c.ty.sql(), not_null))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "CREATE TABLE {} ({}, PRIMARY KEY ({}))",
        table,
        defs.join(", "),
        key
    ))
}

pub async fn table_exists(pool: &PgPool, table: &Ident) -> Result<bool> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1)",
    )
    .bind(table.as_str())
    .fetch_one(pool)
    .await
    .with_context(|| format!("checking whether {} exists", table))
}

/// Create `table` empty, with the frame's columns and `key` as primary key,
/// unless it already exists.
#[instrument(level = "info", skip(pool, frame), fields(table = %table))]
pub async fn setup_table(
    pool: &PgPool,
    table: &Ident,
    key: &Ident,
    frame: &FormattedFrame,
) -> Result<SetupOutcome> {
    if table_exists(pool, table).await? {
        info!("{} currently exists", table);
        return Ok(SetupOutcome::AlreadyExists);
    }
    info!("{} does not exist, creating", table);
    let sql = build_create_sql(table, key, &frame.columns)?;
    sqlx::query(&sql)
        .execute(pool)
        .await
        .with_context(|| format!("creating {}", table))?;
    info!("{} has been created", table);
    Ok(SetupOutcome::Created)
}

/// Replace `table` wholesale with the frame's rows, in one transaction.
#[instrument(level = "info", skip(pool, frame), fields(table = %table, rows = frame.rows.len()))]
pub async fn load_table(
    pool: &PgPool,
    table: &Ident,
    key: &Ident,
    frame: &FormattedFrame,
) -> Result<u64> {
    let create = build_create_sql(table, key, &frame.columns)?;
    let mut tx = pool.begin().await.context("beginning load transaction")?;

    sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("dropping {}", table))?;
    sqlx::query(&create)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("creating {}", table))?;
    let inserted = insert_rows(&mut *tx, table, frame).await?;

    tx.commit().await.context("committing load")?;
    info!(rows = inserted, "{} has been loaded", table);
    Ok(inserted)
}

/// Bulk insert, chunked to stay under the bind-parameter limit.
async fn insert_rows(conn: &mut PgConnection, table: &Ident, frame: &FormattedFrame) -> Result<u64> {
    if frame.rows.is_empty() {
        return Ok(0);
    }
    let cols = frame
        .columns
        .iter()
        .map(|c| Ident::new(&c.name))
        .collect::<Result<Vec<_>>>()?;
    let per_chunk = (BIND_LIMIT / cols.len()).max(1);
    let head = format!("INSERT INTO {} ({}) ", table, column_list(&cols));

    let mut total = 0;
    for chunk in frame.rows.chunks(per_chunk) {
        let mut qb = QueryBuilder::<Postgres>::new(head.as_str());
        qb.push_values(
            chunk.iter().map(|row| row_values(row, &frame.columns)),
            |mut b, values| {
                for v in values {
                    match v {
                        SqlValue::Text(t) => b.push_bind(t),
                        SqlValue::Double(d) => b.push_bind(d),
                        SqlValue::Date(d) => b.push_bind(d),
                    };
                }
            },
        );
        total += qb
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting into {}", table))?
            .rows_affected();
    }
    Ok(total)
}
