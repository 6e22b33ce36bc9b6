//! Relational persistence over a primary Postgres database with an embedded
//! SQLite fallback.
//!
//! One parameter convention at call sites: `$1, $2, ...`. A thin translation
//! layer rewrites placeholders to `?N` for SQLite. All queries go through the
//! helpers here, not raw pool handles in call sites.
//!
//! Portability rules encoded in the schema: dates are TEXT `YYYY-MM-DD`,
//! timestamps TEXT RFC 3339 (UTC), flags BIGINT 0/1, numerics BIGINT or
//! DOUBLE PRECISION.

pub mod migrate;
pub mod runs;

use std::borrow::Cow;

use chrono::{NaiveDate, SecondsFormat, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{MlbError, Result};

/// Default batch size for chunked upserts. Bounds transaction size and
/// matches upstream statement-timeout budgets.
pub const DB_BATCH_SIZE: usize = 500;

// =============================================================================
// SqlValue: uniform, typed parameter binding
// =============================================================================

/// A bind parameter that carries its SQL type even when NULL, so both
/// backends receive well-typed placeholders.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
}

impl SqlValue {
    pub fn null_int() -> Self {
        Self::Int(None)
    }

    pub fn null_float() -> Self {
        Self::Float(None)
    }

    pub fn null_text() -> Self {
        Self::Text(None)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(Some(v))
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(Some(v))
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(Some(v.to_string()))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(Some(v))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        Self::Text(v)
    }
}

impl From<Option<&str>> for SqlValue {
    fn from(v: Option<&str>) -> Self {
        Self::Text(v.map(|s| s.to_string()))
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        Self::Text(Some(v.format("%Y-%m-%d").to_string()))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Int(Some(if v { 1 } else { 0 }))
    }
}

/// Current UTC instant as the canonical stored timestamp string.
pub fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Canonical stored form of a calendar date.
pub fn date_str(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

// =============================================================================
// StoreRow: uniform row access
// =============================================================================

pub enum StoreRow {
    Pg(PgRow),
    Lite(SqliteRow),
}

impl StoreRow {
    pub fn opt_i64(&self, col: &str) -> Result<Option<i64>> {
        match self {
            Self::Pg(r) => r.try_get::<Option<i64>, _>(col).map_err(Into::into),
            Self::Lite(r) => r.try_get::<Option<i64>, _>(col).map_err(Into::into),
        }
    }

    pub fn i64(&self, col: &str) -> Result<i64> {
        self.opt_i64(col)?
            .ok_or_else(|| MlbError::Schema(format!("unexpected NULL in column {col}")))
    }

    pub fn opt_f64(&self, col: &str) -> Result<Option<f64>> {
        match self {
            Self::Pg(r) => r.try_get::<Option<f64>, _>(col).map_err(Into::into),
            Self::Lite(r) => r.try_get::<Option<f64>, _>(col).map_err(Into::into),
        }
    }

    pub fn f64(&self, col: &str) -> Result<f64> {
        self.opt_f64(col)?
            .ok_or_else(|| MlbError::Schema(format!("unexpected NULL in column {col}")))
    }

    pub fn opt_text(&self, col: &str) -> Result<Option<String>> {
        match self {
            Self::Pg(r) => r.try_get::<Option<String>, _>(col).map_err(Into::into),
            Self::Lite(r) => r.try_get::<Option<String>, _>(col).map_err(Into::into),
        }
    }

    pub fn text(&self, col: &str) -> Result<String> {
        self.opt_text(col)?
            .ok_or_else(|| MlbError::Schema(format!("unexpected NULL in column {col}")))
    }

    pub fn flag(&self, col: &str) -> Result<bool> {
        Ok(self.opt_i64(col)?.unwrap_or(0) != 0)
    }

    pub fn opt_date(&self, col: &str) -> Result<Option<NaiveDate>> {
        match self.opt_text(col)? {
            None => Ok(None),
            Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Some)
                .map_err(|e| MlbError::Schema(format!("bad date in column {col}: {e}"))),
        }
    }

    pub fn date(&self, col: &str) -> Result<NaiveDate> {
        self.opt_date(col)?
            .ok_or_else(|| MlbError::Schema(format!("unexpected NULL in column {col}")))
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

/// Connection abstraction over the primary database or the embedded
/// fallback. Clone-cheap (pools are reference counted); each backfill
/// worker clones its own handle.
#[derive(Clone)]
pub enum Store {
    Pg(PgPool),
    Lite(SqlitePool),
}

impl Store {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        if let Some(url) = cfg.url.as_deref() {
            let pool = PgPoolOptions::new()
                .max_connections(cfg.max_connections)
                .connect(url)
                .await?;
            info!("Connected to Postgres");
            return Ok(Self::Pg(pool));
        }

        if let Some(parent) = std::path::Path::new(&cfg.sqlite_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(&cfg.sqlite_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect_with(opts)
            .await?;
        info!(path = %cfg.sqlite_path, "No primary database URL; using embedded SQLite fallback");
        Ok(Self::Lite(pool))
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Pg(_) => Backend::Postgres,
            Self::Lite(_) => Backend::Sqlite,
        }
    }

    /// Rewrite `$N` placeholders to `?N` for the SQLite backend.
    fn translate<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        match self {
            Self::Pg(_) => Cow::Borrowed(sql),
            Self::Lite(_) => translate_placeholders(sql),
        }
    }

    pub async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let sql = self.translate(sql);
        match self {
            Self::Pg(pool) => {
                let mut q = sqlx::query(&sql);
                for p in params {
                    q = bind_pg(q, p);
                }
                Ok(q.execute(pool).await?.rows_affected())
            }
            Self::Lite(pool) => {
                let mut q = sqlx::query(&sql);
                for p in params {
                    q = bind_lite(q, p);
                }
                Ok(q.execute(pool).await?.rows_affected())
            }
        }
    }

    pub async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<StoreRow>> {
        let sql = self.translate(sql);
        match self {
            Self::Pg(pool) => {
                let mut q = sqlx::query(&sql);
                for p in params {
                    q = bind_pg(q, p);
                }
                Ok(q.fetch_all(pool).await?.into_iter().map(StoreRow::Pg).collect())
            }
            Self::Lite(pool) => {
                let mut q = sqlx::query(&sql);
                for p in params {
                    q = bind_lite(q, p);
                }
                Ok(q.fetch_all(pool).await?.into_iter().map(StoreRow::Lite).collect())
            }
        }
    }

    pub async fn fetch_optional(&self, sql: &str, params: &[SqlValue]) -> Result<Option<StoreRow>> {
        let sql = self.translate(sql);
        match self {
            Self::Pg(pool) => {
                let mut q = sqlx::query(&sql);
                for p in params {
                    q = bind_pg(q, p);
                }
                Ok(q.fetch_optional(pool).await?.map(StoreRow::Pg))
            }
            Self::Lite(pool) => {
                let mut q = sqlx::query(&sql);
                for p in params {
                    q = bind_lite(q, p);
                }
                Ok(q.fetch_optional(pool).await?.map(StoreRow::Lite))
            }
        }
    }

    pub async fn fetch_one(&self, sql: &str, params: &[SqlValue]) -> Result<StoreRow> {
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| MlbError::Database(sqlx::Error::RowNotFound))
    }

    /// Execute a sequence of statements in one transaction. Used by the
    /// supersede path and lineup snapshot swaps so partial writes never
    /// become visible.
    pub async fn execute_in_transaction(&self, stmts: &[(String, Vec<SqlValue>)]) -> Result<u64> {
        let mut affected = 0u64;
        match self {
            Self::Pg(pool) => {
                let mut tx = pool.begin().await?;
                for (sql, params) in stmts {
                    let mut q = sqlx::query(sql.as_str());
                    for p in params {
                        q = bind_pg(q, p);
                    }
                    affected += q.execute(&mut *tx).await?.rows_affected();
                }
                tx.commit().await?;
            }
            Self::Lite(pool) => {
                let mut tx = pool.begin().await?;
                for (sql, params) in stmts {
                    let translated = translate_placeholders(sql);
                    let mut q = sqlx::query(translated.as_ref());
                    for p in params {
                        q = bind_lite(q, p);
                    }
                    affected += q.execute(&mut *tx).await?.rows_affected();
                }
                tx.commit().await?;
            }
        }
        Ok(affected)
    }

    /// Batched natural-key upsert. Rows are chunked so one statement never
    /// exceeds the backend's parameter budget; each chunk is one
    /// multi-row `INSERT ... ON CONFLICT` statement in its own
    /// transaction, so a failed chunk rolls back alone and the caller can
    /// retry the date idempotently.
    pub async fn upsert_batch(
        &self,
        table: &str,
        columns: &[&str],
        conflict_cols: &[&str],
        rows: &[Vec<SqlValue>],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            if row.len() != columns.len() {
                return Err(MlbError::Internal(format!(
                    "upsert into {table}: row has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }

        let max_rows = DB_BATCH_SIZE.min((30_000 / columns.len()).max(1));
        let mut total = 0u64;
        for chunk in rows.chunks(max_rows) {
            let sql = build_upsert_sql(table, columns, conflict_cols, chunk.len());
            let params: Vec<SqlValue> = chunk.iter().flatten().cloned().collect();
            total += self.execute(&sql, &params).await?;
        }
        debug!(table, rows = rows.len(), "batched upsert complete");
        Ok(total)
    }

    /// Row count for a table, used by the status command.
    pub async fn table_count(&self, table: &str) -> Result<i64> {
        let row = self
            .fetch_one(&format!("SELECT CAST(COUNT(*) AS BIGINT) AS n FROM {table}"), &[])
            .await?;
        row.i64("n")
    }
}

fn build_upsert_sql(table: &str, columns: &[&str], conflict_cols: &[&str], n_rows: usize) -> String {
    let col_list = columns.join(", ");
    let mut values = Vec::with_capacity(n_rows);
    let mut idx = 1usize;
    for _ in 0..n_rows {
        let placeholders: Vec<String> = (0..columns.len())
            .map(|_| {
                let p = format!("${idx}");
                idx += 1;
                p
            })
            .collect();
        values.push(format!("({})", placeholders.join(", ")));
    }

    let update_cols: Vec<String> = columns
        .iter()
        .filter(|c| !conflict_cols.contains(c))
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();

    let conflict_action = if update_cols.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", update_cols.join(", "))
    };

    format!(
        "INSERT INTO {table} ({col_list}) VALUES {} ON CONFLICT ({}) {conflict_action}",
        values.join(", "),
        conflict_cols.join(", ")
    )
}

fn translate_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('$') {
        return Cow::Borrowed(sql);
    }
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '$' && chars.peek().is_some_and(|n| n.is_ascii_digit()) {
            out.push('?');
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;
type LiteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_pg<'q>(q: PgQuery<'q>, v: &SqlValue) -> PgQuery<'q> {
    match v {
        SqlValue::Int(x) => q.bind(*x),
        SqlValue::Float(x) => q.bind(*x),
        SqlValue::Text(x) => q.bind(x.clone()),
    }
}

fn bind_lite<'q>(q: LiteQuery<'q>, v: &SqlValue) -> LiteQuery<'q> {
    match v {
        SqlValue::Int(x) => q.bind(*x),
        SqlValue::Float(x) => q.bind(*x),
        SqlValue::Text(x) => q.bind(x.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_placeholders() {
        assert_eq!(
            translate_placeholders("SELECT * FROM t WHERE a = $1 AND b = $12"),
            "SELECT * FROM t WHERE a = ?1 AND b = ?12"
        );
        // untouched when no numbered placeholders
        assert_eq!(translate_placeholders("SELECT 1"), "SELECT 1");
        // a lone dollar not followed by a digit is preserved
        assert_eq!(translate_placeholders("SELECT '$' , $2"), "SELECT '$' , ?2");
    }

    #[test]
    fn test_build_upsert_sql_shape() {
        let sql = build_upsert_sql("games", &["game_id", "status"], &["game_id"], 2);
        assert_eq!(
            sql,
            "INSERT INTO games (game_id, status) VALUES ($1, $2), ($3, $4) \
             ON CONFLICT (game_id) DO UPDATE SET status = EXCLUDED.status"
        );
    }

    #[test]
    fn test_build_upsert_all_conflict_cols_is_do_nothing() {
        let sql = build_upsert_sql("t", &["a", "b"], &["a", "b"], 1);
        assert!(sql.ends_with("ON CONFLICT (a, b) DO NOTHING"));
    }

    #[test]
    fn test_sql_value_conversions() {
        assert_eq!(SqlValue::from(true), SqlValue::Int(Some(1)));
        assert_eq!(SqlValue::from(Option::<f64>::None), SqlValue::Float(None));
        let d = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(SqlValue::from(d), SqlValue::Text(Some("2024-07-04".into())));
    }
}
