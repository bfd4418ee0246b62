//! SQLite-backed record store.
//!
//! Items live in `tracked_items`; the history and subscriber sets are child tables
//! keyed by `item_key` so that an upsert only appends the new history rows.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::RecordStore;
use crate::config::DatabaseConfig;
use crate::models::{ItemAttributes, ItemUpdate, NewTrackedItem, PricePoint, Subscriber, TrackedItem};
use crate::utils::error::StoreError;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct ItemRow {
    key: String,
    title: String,
    attributes_json: String,
    current_price: Option<f64>,
    lowest_price: Option<f64>,
    highest_price: Option<f64>,
    average_price: Option<f64>,
    is_out_of_stock: bool,
    last_updated: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PricePointRow {
    price: f64,
    observed_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SubscriberRow {
    email: String,
    target_price: Option<f64>,
}

const ITEM_COLUMNS: &str = "key, title, attributes_json, current_price, lowest_price, highest_price, \
     average_price, is_out_of_stock, last_updated, created_at";

impl SqliteStore {
    /// Open the pool described by `config` and apply pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let in_memory = is_in_memory(&config.url);
        if let Some(parent) = database_path(&config.url).and_then(|p| p.parent().map(PathBuf::from)) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(&parent)
                    .await
                    .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `:memory:` is its own database
        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.acquire_timeout));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        tracing::info!(url = %config.url, "Record store ready");
        Ok(store)
    }

    /// Wrap an existing pool. Migrations are not applied.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// On-disk location of the database file, if the url names one.
fn database_path(url: &str) -> Option<PathBuf> {
    if is_in_memory(url) {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

async fn load_item(conn: &mut SqliteConnection, key: &str) -> Result<Option<TrackedItem>, StoreError> {
    let row: Option<ItemRow> = sqlx::query_as(&format!(
        "SELECT {} FROM tracked_items WHERE key = ?1",
        ITEM_COLUMNS
    ))
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(hydrate(conn, row).await?)),
        None => Ok(None),
    }
}

async fn hydrate(conn: &mut SqliteConnection, row: ItemRow) -> Result<TrackedItem, StoreError> {
    let attributes: ItemAttributes =
        serde_json::from_str(&row.attributes_json).map_err(|e| StoreError::Corrupt {
            key: row.key.clone(),
            message: format!("attributes: {}", e),
        })?;

    let history: Vec<PricePointRow> = sqlx::query_as(
        "SELECT price, observed_at FROM price_history WHERE item_key = ?1 ORDER BY position ASC",
    )
    .bind(&row.key)
    .fetch_all(&mut *conn)
    .await?;

    let subscribers: Vec<SubscriberRow> = sqlx::query_as(
        "SELECT email, target_price FROM subscribers WHERE item_key = ?1 ORDER BY rowid ASC",
    )
    .bind(&row.key)
    .fetch_all(&mut *conn)
    .await?;

    Ok(TrackedItem {
        key: row.key,
        title: row.title,
        attributes,
        price_history: history
            .into_iter()
            .map(|p| PricePoint {
                price: p.price,
                observed_at: p.observed_at,
            })
            .collect(),
        current_price: row.current_price,
        lowest_price: row.lowest_price,
        highest_price: row.highest_price,
        average_price: row.average_price,
        is_out_of_stock: row.is_out_of_stock,
        subscribers: subscribers
            .into_iter()
            .map(|s| Subscriber {
                email: s.email,
                target_price: s.target_price,
            })
            .collect(),
        last_updated: row.last_updated,
        created_at: row.created_at,
    })
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn select_due(&self, limit: usize) -> Result<Vec<TrackedItem>, StoreError> {
        let mut conn = self.pool.acquire().await?;

        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tracked_items \
             ORDER BY last_updated IS NOT NULL, last_updated ASC, key ASC \
             LIMIT ?1",
            ITEM_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(hydrate(&mut conn, row).await?);
        }
        Ok(items)
    }

    #[tracing::instrument(level = "debug", skip(self, update))]
    async fn upsert(&self, key: &str, update: ItemUpdate) -> Result<TrackedItem, StoreError> {
        let update = update.normalized();
        let attributes_json = serde_json::to_string(&update.attributes)?;

        let mut tx = self.pool.begin().await?;

        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_history WHERE item_key = ?1")
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;
        let stored = stored as usize;
        if update.price_history.len() < stored {
            return Err(StoreError::HistoryRegression {
                key: key.to_string(),
                stored,
                proposed: update.price_history.len(),
            });
        }

        // Rows before `stored` are never rewritten; the update must extend them
        if let Some(position) = stored.checked_sub(1) {
            let (price, observed_at): (f64, String) = sqlx::query_as(
                "SELECT price, observed_at FROM price_history WHERE item_key = ?1 AND position = ?2",
            )
            .bind(key)
            .bind(position as i64)
            .fetch_one(&mut *tx)
            .await?;

            let proposed = &update.price_history[position];
            if proposed.price != price || timestamp(proposed.observed_at) != observed_at {
                return Err(StoreError::HistoryDiverged {
                    key: key.to_string(),
                    position,
                });
            }
        }

        sqlx::query(
            r#"
INSERT INTO tracked_items
  (key, title, attributes_json, current_price, lowest_price, highest_price,
   average_price, is_out_of_stock, last_updated, created_at)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(key) DO UPDATE SET
  title = excluded.title,
  attributes_json = excluded.attributes_json,
  current_price = excluded.current_price,
  lowest_price = excluded.lowest_price,
  highest_price = excluded.highest_price,
  average_price = excluded.average_price,
  is_out_of_stock = excluded.is_out_of_stock,
  last_updated = excluded.last_updated
"#,
        )
        .bind(key)
        .bind(&update.title)
        .bind(attributes_json)
        .bind(update.current_price)
        .bind(update.lowest_price)
        .bind(update.highest_price)
        .bind(update.average_price)
        .bind(update.is_out_of_stock)
        .bind(timestamp(update.last_updated))
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        for (position, point) in update.price_history.iter().enumerate().skip(stored) {
            sqlx::query(
                "INSERT INTO price_history (item_key, position, price, observed_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(key)
            .bind(position as i64)
            .bind(point.price)
            .bind(timestamp(point.observed_at))
            .execute(&mut *tx)
            .await?;
        }

        let item = load_item(&mut tx, key)
            .await?
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })?;
        tx.commit().await?;

        tracing::debug!(
            history_len = item.price_history.len(),
            appended = item.price_history.len() - stored,
            "Upserted item"
        );
        Ok(item)
    }

    async fn get(&self, key: &str) -> Result<Option<TrackedItem>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        load_item(&mut conn, key).await
    }

    async fn track(&self, item: NewTrackedItem) -> Result<TrackedItem, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO tracked_items (key, title, created_at) VALUES (?1, ?2, ?3) ON CONFLICT(key) DO NOTHING",
        )
        .bind(&item.key)
        .bind(item.title.clone().unwrap_or_default())
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        let stored = load_item(&mut tx, &item.key)
            .await?
            .ok_or_else(|| StoreError::NotFound { key: item.key.clone() })?;
        tx.commit().await?;

        if inserted.rows_affected() > 0 {
            tracing::info!(key = %item.key, "Tracking new item");
        }
        Ok(stored)
    }

    async fn subscribe(&self, key: &str, subscriber: Subscriber) -> Result<TrackedItem, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tracked_items WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound { key: key.to_string() });
        }

        sqlx::query(
            r#"
INSERT INTO subscribers (item_key, email, target_price, created_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(item_key, email) DO UPDATE SET target_price = excluded.target_price
"#,
        )
        .bind(key)
        .bind(&subscriber.email)
        .bind(subscriber.target_price)
        .bind(timestamp(Utc::now()))
        .execute(&mut *tx)
        .await?;

        let item = load_item(&mut tx, key)
            .await?
            .ok_or_else(|| StoreError::NotFound { key: key.to_string() })?;
        tx.commit().await?;
        Ok(item)
    }
}
