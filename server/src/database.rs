//! # SQLite
//!
//! Relational store for the catalog, orders, and vendor accounts.
//!
//! ## Requirements
//!
//! - Single-file database, works on small deployments without a separate
//!   database server
//! - Transactional multi-table writes for order placement
//! - Survives concurrent checkout attempts on the same product without
//!   overselling
//!
//! ## Implementation
//!
//! - One pool, WAL journal, foreign keys on (order items cascade with their
//!   order)
//! - Stock decrements are conditional (`stock = stock - n WHERE stock >= n`)
//!   and checked via affected-row count, so the check and the write cannot
//!   race between two transactions
//! - Images are stored as base64 data URIs in the row itself; the deploy
//!   target has an ephemeral filesystem, so file paths would not survive a
//!   restart
use std::str::FromStr;

use serde::Deserialize;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    price REAL NOT NULL CHECK (price >= 0),
    stock INTEGER NOT NULL CHECK (stock >= 0),
    category TEXT NOT NULL,
    subcategory TEXT,
    available INTEGER NOT NULL DEFAULT 1,
    image TEXT
);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    buyer_name TEXT NOT NULL,
    buyer_phone TEXT,
    table_number INTEGER,
    payment_method TEXT NOT NULL,
    total REAL NOT NULL,
    receipt TEXT,
    note TEXT,
    paid INTEGER NOT NULL DEFAULT 0,
    delivered INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS order_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id INTEGER NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
    product_id INTEGER NOT NULL REFERENCES products (id),
    quantity INTEGER NOT NULL CHECK (quantity >= 1),
    unit_price REAL NOT NULL,
    subtotal REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items (order_id);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    display_name TEXT,
    role TEXT NOT NULL
);
"#;

pub async fn init_db(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;

    Ok(())
}

/// Structured filter for order listings. Each set field becomes one
/// parameterized predicate; nothing is spliced into the SQL text.
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    /// Inclusive lower creation date, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Inclusive upper creation date, `YYYY-MM-DD`.
    pub to: Option<String>,
    pub table: Option<i64>,
}

pub fn push_order_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &OrderFilter) {
    if let Some(from) = &filter.from {
        builder
            .push(" AND date(created_at) >= date(")
            .push_bind(from.clone())
            .push(")");
    }

    if let Some(to) = &filter.to {
        builder
            .push(" AND date(created_at) <= date(")
            .push_bind(to.clone())
            .push(")");
    }

    if let Some(table) = filter.table {
        builder.push(" AND table_number = ").push_bind(table);
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    // A single never-recycled connection, so the in-memory database lives
    // for the whole test.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();

    run_migrations(&pool).await.unwrap();

    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters() {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
        push_order_filters(&mut builder, &OrderFilter::default());

        assert_eq!(builder.sql(), "SELECT * FROM orders WHERE 1=1");
    }

    #[test]
    fn test_all_filters_parameterized() {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT * FROM orders WHERE 1=1");
        let filter = OrderFilter {
            from: Some("2025-01-01".to_string()),
            to: Some("2025-01-31".to_string()),
            table: Some(7),
        };
        push_order_filters(&mut builder, &filter);

        let sql = builder.sql();
        assert!(sql.contains("date(created_at) >= date("));
        assert!(sql.contains("date(created_at) <= date("));
        assert!(sql.contains("table_number = "));
        // values travel as binds, never as SQL text
        assert!(!sql.contains("2025-01-01"));
        assert!(!sql.contains('7'));
    }
}
