use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use fastfit_types::domain::money::{Money, Quantity};
use fastfit_types::domain::order::{
    DeliveryAddress, DeliveryType, Order, OrderItem, OrderStatus, PhoneNumber,
};
use fastfit_types::domain::progression::{JobState, StatusJob};
use fastfit_types::ports::order_read::{OrderReadRepository, OrderView};
use fastfit_types::ports::order_repository::{
    OrderRepository, RepoError, Transaction, TransactionManager,
};
use fastfit_types::ports::status_jobs::StatusJobStore;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "order_id, user_id, phone_number, status, delivery_type, delivery_address, restaurant_id, created_at, version";
const JOB_COLUMNS: &str = "order_id, target_status, run_at, attempts, last_error, state";

pub struct SqliteRepo {
    pool: SqlitePool,
}

pub struct SqliteTx(sqlx::Transaction<'static, Sqlite>);

#[derive(FromRow)]
struct DbOrder {
    order_id: String,
    user_id: Option<String>,
    phone_number: String,
    status: String,
    delivery_type: String,
    delivery_address: Option<String>,
    restaurant_id: String,
    created_at: String,
    version: i64,
}

#[derive(FromRow)]
struct DbItem {
    dish_id: String,
    quantity: i64,
    price: String,
    currency: String,
}

#[derive(FromRow)]
struct DbJob {
    order_id: String,
    target_status: String,
    run_at: i64,
    attempts: i64,
    last_error: Option<String>,
    state: String,
}

fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(s).map_err(RepoError::db)
}

fn parse_status(s: &str) -> Result<OrderStatus, RepoError> {
    OrderStatus::parse(s).ok_or_else(|| RepoError::db(format!("unknown order status '{s}'")))
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl DbItem {
    fn into_item(self) -> Result<OrderItem, RepoError> {
        let quantity = u32::try_from(self.quantity).map_err(RepoError::db)?;
        let price = Decimal::from_str(&self.price).map_err(RepoError::db)?;
        Ok(OrderItem::new(
            parse_uuid(&self.dish_id)?,
            Quantity::new(quantity)?,
            Money::new(price, self.currency)?,
        ))
    }
}

impl DbOrder {
    fn into_order(self, items: Vec<DbItem>) -> Result<Order, RepoError> {
        let items = items
            .into_iter()
            .map(DbItem::into_item)
            .collect::<Result<Vec<_>, _>>()?;
        let delivery_type = DeliveryType::parse(&self.delivery_type).ok_or_else(|| {
            RepoError::db(format!("unknown delivery type '{}'", self.delivery_type))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(RepoError::db)?
            .with_timezone(&Utc);
        let user_id = self.user_id.as_deref().map(parse_uuid).transpose()?;
        let delivery_address = self
            .delivery_address
            .map(DeliveryAddress::new)
            .transpose()?;
        let version = u64::try_from(self.version).map_err(RepoError::db)?;
        Ok(Order::restore(
            parse_uuid(&self.order_id)?,
            user_id,
            PhoneNumber::new(self.phone_number)?,
            items,
            parse_status(&self.status)?,
            delivery_type,
            delivery_address,
            parse_uuid(&self.restaurant_id)?,
            created_at,
            version,
        )?)
    }
}

impl DbJob {
    fn into_job(self) -> Result<StatusJob, RepoError> {
        let run_at = Utc
            .timestamp_millis_opt(self.run_at)
            .single()
            .ok_or_else(|| RepoError::db(format!("invalid run_at {}", self.run_at)))?;
        let state = JobState::parse(&self.state)
            .ok_or_else(|| RepoError::db(format!("unknown job state '{}'", self.state)))?;
        Ok(StatusJob {
            order_id: parse_uuid(&self.order_id)?,
            target_status: parse_status(&self.target_status)?,
            run_at,
            attempts: u32::try_from(self.attempts).map_err(RepoError::db)?,
            last_error: self.last_error,
            state,
        })
    }
}

/// Maps driver errors onto the repository taxonomy. `value` is the key being written.
fn classify(err: sqlx::Error, value: &str) -> RepoError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.message().contains("UNIQUE constraint failed") {
            return RepoError::DuplicateEntry {
                field: unique_field(db.message()),
                value: value.to_string(),
            };
        }
        if is_write_conflict(db.code().as_deref()) {
            tracing::debug!(key = value, error = %db.message(), "write conflict");
            return RepoError::OptimisticLock;
        }
    }
    RepoError::db(err)
}

/// SQLITE_BUSY and its extended codes: another writer holds the lock or
/// committed after this transaction took its snapshot.
fn is_write_conflict(code: Option<&str>) -> bool {
    matches!(code, Some("5" | "261" | "517"))
}

fn to_i64<T: TryInto<i64>>(n: T) -> Result<i64, RepoError>
where
    T::Error: std::fmt::Display,
{
    n.try_into().map_err(RepoError::db)
}

/// Column named in "UNIQUE constraint failed: orders.order_id".
fn unique_field(message: &str) -> String {
    message
        .split_once("constraint failed:")
        .and_then(|(_, cols)| cols.split(',').next())
        .map(|col| col.trim().rsplit('.').next().unwrap_or_default().to_string())
        .filter(|col| !col.is_empty())
        .unwrap_or_else(|| "unknown_field".to_string())
}

async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> Result<Vec<DbItem>, RepoError> {
    sqlx::query_as(
        "SELECT dish_id, quantity, price, currency FROM order_items WHERE order_id = ? ORDER BY line_no",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(RepoError::db)
}

async fn fetch_order(conn: &mut SqliteConnection, order_id: Uuid) -> Result<Option<Order>, RepoError> {
    let row: Option<DbOrder> =
        sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = ?"))
            .bind(order_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(RepoError::db)?;
    match row {
        Some(row) => {
            let items = fetch_items(conn, &row.order_id).await?;
            Ok(Some(row.into_order(items)?))
        }
        None => Ok(None),
    }
}

async fn hydrate(conn: &mut SqliteConnection, rows: Vec<DbOrder>) -> Result<Vec<Order>, RepoError> {
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let items = fetch_items(conn, &row.order_id).await?;
        orders.push(row.into_order(items)?);
    }
    Ok(orders)
}

async fn insert_items(conn: &mut SqliteConnection, order: &Order) -> Result<(), RepoError> {
    let order_id = order.order_id().to_string();
    for (line_no, item) in order.items().iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_items (order_id, line_no, dish_id, quantity, price, currency)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&order_id)
        .bind(to_i64(line_no)?)
        .bind(item.dish_id.to_string())
        .bind(i64::from(item.quantity.get()))
        .bind(item.price.amount().to_string())
        .bind(item.price.currency())
        .execute(&mut *conn)
        .await
        .map_err(|e| classify(e, &order_id))?;
    }
    Ok(())
}

fn views(orders: Vec<Order>) -> Result<Vec<OrderView>, RepoError> {
    orders
        .iter()
        .map(|o| OrderView::try_from(o).map_err(RepoError::from))
        .collect()
}

impl SqliteRepo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        let ddl = include_str!("../migrations/0001_create_orders.sql");
        for statement in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Transaction for SqliteTx {
    async fn commit(self) -> Result<(), RepoError> {
        self.0.commit().await.map_err(|e| classify(e, "commit"))
    }

    async fn rollback(self) -> Result<(), RepoError> {
        self.0.rollback().await.map_err(RepoError::db)
    }
}

#[async_trait]
impl TransactionManager for SqliteRepo {
    type Tx = SqliteTx;

    async fn begin(&self) -> Result<SqliteTx, RepoError> {
        let tx = self.pool.begin().await.map_err(RepoError::db)?;
        Ok(SqliteTx(tx))
    }
}

#[async_trait]
impl OrderRepository for SqliteRepo {
    async fn get_by_id(&self, tx: &mut SqliteTx, order_id: Uuid) -> Result<Order, RepoError> {
        fetch_order(&mut *tx.0, order_id)
            .await?
            .ok_or(RepoError::NotFound(order_id))
    }

    async fn add(&self, tx: &mut SqliteTx, order: &Order) -> Result<(), RepoError> {
        let order_id = order.order_id().to_string();
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&order_id)
        .bind(order.user_id().map(|u| u.to_string()))
        .bind(order.phone_number().as_str())
        .bind(order.status().as_str())
        .bind(order.delivery_type().as_str())
        .bind(order.delivery_address().map(|a| a.as_str().to_string()))
        .bind(order.restaurant_id().to_string())
        .bind(format_ts(order.created_at()))
        .bind(to_i64(order.version())?)
        .execute(&mut *tx.0)
        .await
        .map_err(|e| classify(e, &order_id))?;

        insert_items(&mut *tx.0, order).await
    }

    async fn update(&self, tx: &mut SqliteTx, order: &mut Order) -> Result<(), RepoError> {
        let order_id = order.order_id().to_string();
        let res = sqlx::query(
            "UPDATE orders
             SET user_id = ?, phone_number = ?, status = ?, delivery_type = ?,
                 delivery_address = ?, restaurant_id = ?, version = version + 1
             WHERE order_id = ? AND version = ?",
        )
        .bind(order.user_id().map(|u| u.to_string()))
        .bind(order.phone_number().as_str())
        .bind(order.status().as_str())
        .bind(order.delivery_type().as_str())
        .bind(order.delivery_address().map(|a| a.as_str().to_string()))
        .bind(order.restaurant_id().to_string())
        .bind(&order_id)
        .bind(to_i64(order.version())?)
        .execute(&mut *tx.0)
        .await
        .map_err(|e| classify(e, &order_id))?;

        if res.rows_affected() == 0 {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM orders WHERE order_id = ?")
                    .bind(&order_id)
                    .fetch_optional(&mut *tx.0)
                    .await
                    .map_err(|e| classify(e, &order_id))?;
            return Err(match exists {
                Some(_) => RepoError::OptimisticLock,
                None => RepoError::NotFound(order.order_id()),
            });
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = ?")
            .bind(&order_id)
            .execute(&mut *tx.0)
            .await
            .map_err(|e| classify(e, &order_id))?;
        insert_items(&mut *tx.0, order).await?;

        order.advance_version();
        Ok(())
    }
}

#[async_trait]
impl StatusJobStore for SqliteRepo {
    async fn put_job(&self, tx: &mut SqliteTx, job: &StatusJob) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO status_jobs ({JOB_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (order_id) DO UPDATE SET
                 target_status = excluded.target_status,
                 run_at = excluded.run_at,
                 attempts = excluded.attempts,
                 last_error = excluded.last_error,
                 state = excluded.state"
        ))
        .bind(job.order_id.to_string())
        .bind(job.target_status.as_str())
        .bind(job.run_at.timestamp_millis())
        .bind(i64::from(job.attempts))
        .bind(job.last_error.as_deref())
        .bind(job.state.as_str())
        .execute(&mut *tx.0)
        .await
        .map_err(|e| classify(e, &job.order_id.to_string()))?;
        Ok(())
    }

    async fn find_job(
        &self,
        tx: &mut SqliteTx,
        order_id: Uuid,
    ) -> Result<Option<StatusJob>, RepoError> {
        let row: Option<DbJob> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM status_jobs WHERE order_id = ?"))
                .bind(order_id.to_string())
                .fetch_optional(&mut *tx.0)
                .await
                .map_err(RepoError::db)?;
        row.map(DbJob::into_job).transpose()
    }

    async fn remove_job(&self, tx: &mut SqliteTx, order_id: Uuid) -> Result<bool, RepoError> {
        let key = order_id.to_string();
        let res = sqlx::query("DELETE FROM status_jobs WHERE order_id = ?")
            .bind(&key)
            .execute(&mut *tx.0)
            .await
            .map_err(|e| classify(e, &key))?;
        Ok(res.rows_affected() > 0)
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<StatusJob>, RepoError> {
        let rows: Vec<DbJob> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM status_jobs WHERE state = ? AND run_at <= ? ORDER BY run_at LIMIT ?"
        ))
        .bind(JobState::Pending.as_str())
        .bind(now.timestamp_millis())
        .bind(to_i64(limit)?)
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::db)?;
        rows.into_iter().map(DbJob::into_job).collect()
    }

    async fn dead_letters(&self) -> Result<Vec<StatusJob>, RepoError> {
        let rows: Vec<DbJob> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM status_jobs WHERE state = ? ORDER BY run_at"
        ))
        .bind(JobState::DeadLettered.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::db)?;
        rows.into_iter().map(DbJob::into_job).collect()
    }
}

#[async_trait]
impl OrderReadRepository for SqliteRepo {
    async fn find_view(&self, order_id: Uuid) -> Result<Option<OrderView>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(RepoError::db)?;
        fetch_order(&mut *conn, order_id)
            .await?
            .map(|o| OrderView::try_from(&o).map_err(RepoError::from))
            .transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(RepoError::db)?;
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .map_err(RepoError::db)?;
        views(hydrate(&mut *conn, rows).await?)
    }

    async fn list_by_restaurant(
        &self,
        restaurant_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderView>, RepoError> {
        let mut conn = self.pool.acquire().await.map_err(RepoError::db)?;
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE restaurant_id = ? AND (? IS NULL OR status = ?)
             ORDER BY created_at DESC"
        ))
        .bind(restaurant_id.to_string())
        .bind(status.map(OrderStatus::as_str))
        .bind(status.map(OrderStatus::as_str))
        .fetch_all(&mut *conn)
        .await
        .map_err(RepoError::db)?;
        views(hydrate(&mut *conn, rows).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_field_is_parsed_from_sqlite_message() {
        assert_eq!(
            unique_field("UNIQUE constraint failed: orders.order_id"),
            "order_id"
        );
        assert_eq!(
            unique_field("UNIQUE constraint failed: order_items.order_id, order_items.line_no"),
            "order_id"
        );
        assert_eq!(unique_field("something else"), "unknown_field");
    }

    #[test]
    fn busy_codes_are_write_conflicts() {
        assert!(is_write_conflict(Some("5")));
        assert!(is_write_conflict(Some("517")));
        assert!(!is_write_conflict(Some("2067")));
        assert!(!is_write_conflict(None));
    }
}
