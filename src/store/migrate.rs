//! Lexically-ordered SQL migration runner.
//!
//! Migration files are embedded at compile time, applied in filename order,
//! and recorded in `schema_migrations`; re-running is a no-op. Statements
//! are portable SQL except for the `BIGSERIAL PRIMARY KEY` token, which the
//! runner rewrites for the SQLite backend.

use tracing::info;

use crate::error::{MlbError, Result};
use crate::store::{now_ts, Backend, SqlValue, Store};

/// Embedded migrations, already in lexical filename order.
const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_core.sql", include_str!("../../migrations/0001_core.sql")),
    ("0002_events.sql", include_str!("../../migrations/0002_events.sql")),
    (
        "0003_market_data.sql",
        include_str!("../../migrations/0003_market_data.sql"),
    ),
    (
        "0004_features.sql",
        include_str!("../../migrations/0004_features.sql"),
    ),
    ("0005_scores.sql", include_str!("../../migrations/0005_scores.sql")),
];

fn translate_ddl(sql: &str, backend: Backend) -> String {
    match backend {
        Backend::Postgres => sql.to_string(),
        Backend::Sqlite => sql.replace("BIGSERIAL PRIMARY KEY", "INTEGER PRIMARY KEY AUTOINCREMENT"),
    }
}

fn split_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

async fn ensure_schema_migrations(store: &Store) -> Result<()> {
    store
        .execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                filename TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            &[],
        )
        .await?;
    Ok(())
}

async fn applied_migrations(store: &Store) -> Result<Vec<String>> {
    let rows = store
        .fetch_all("SELECT filename FROM schema_migrations ORDER BY filename", &[])
        .await?;
    rows.iter().map(|r| r.text("filename")).collect()
}

/// Apply all pending migrations. A failed migration is fatal (`Schema`);
/// its statements roll back and nothing is recorded.
pub async fn run_migrations(store: &Store) -> Result<usize> {
    ensure_schema_migrations(store).await?;
    let applied = applied_migrations(store).await?;

    let mut count = 0usize;
    for (name, raw_sql) in MIGRATIONS {
        if applied.iter().any(|a| a == name) {
            continue;
        }
        let sql = translate_ddl(raw_sql, store.backend());
        let mut stmts: Vec<(String, Vec<SqlValue>)> = split_statements(&sql)
            .into_iter()
            .map(|s| (s.to_string(), Vec::new()))
            .collect();
        stmts.push((
            "INSERT INTO schema_migrations (filename, applied_at) VALUES ($1, $2)".to_string(),
            vec![SqlValue::from(*name), SqlValue::from(now_ts())],
        ));

        store.execute_in_transaction(&stmts).await.map_err(|e| {
            MlbError::Schema(format!("migration {name} failed: {e}"))
        })?;
        info!(migration = name, "applied");
        count += 1;
    }

    if count == 0 {
        info!("no pending migrations");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_sorted_lexically() {
        let names: Vec<&str> = MIGRATIONS.iter().map(|(n, _)| *n).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_translate_ddl_sqlite() {
        let ddl = "CREATE TABLE t (id BIGSERIAL PRIMARY KEY, x TEXT)";
        assert_eq!(
            translate_ddl(ddl, Backend::Sqlite),
            "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, x TEXT)"
        );
        assert_eq!(translate_ddl(ddl, Backend::Postgres), ddl);
    }

    #[test]
    fn test_split_statements_drops_blanks() {
        let stmts = split_statements("CREATE TABLE a (x TEXT);\n\nCREATE INDEX i ON a (x);\n");
        assert_eq!(stmts.len(), 2);
    }
}
