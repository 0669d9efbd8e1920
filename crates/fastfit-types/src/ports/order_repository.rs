use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::Order;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error("duplicate value '{value}' for {field}")]
    DuplicateEntry { field: String, value: String },

    #[error("row was modified concurrently")]
    OptimisticLock,

    #[error("db error: {0}")]
    DbError(String),
}

impl RepoError {
    pub fn db(err: impl std::fmt::Display) -> Self {
        RepoError::DbError(err.to_string())
    }
}

/// A stored row that no longer satisfies the aggregate's invariants.
impl From<DomainError> for RepoError {
    fn from(e: DomainError) -> Self {
        RepoError::DbError(format!("corrupt order row: {e}"))
    }
}

/// An open storage transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait Transaction: Send + Sized + 'static {
    async fn commit(self) -> Result<(), RepoError>;
    async fn rollback(self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait TransactionManager: Send + Sync + 'static {
    type Tx: Transaction;

    async fn begin(&self) -> Result<Self::Tx, RepoError>;
}

#[async_trait]
pub trait OrderRepository: TransactionManager {
    async fn get_by_id(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<Order, RepoError>;

    /// Inserts the order row and all of its item rows.
    async fn add(&self, tx: &mut Self::Tx, order: &Order) -> Result<(), RepoError>;

    /// Compare-and-set on `order.version()`; replaces the whole item collection
    /// and advances the version on success.
    async fn update(&self, tx: &mut Self::Tx, order: &mut Order) -> Result<(), RepoError>;
}
