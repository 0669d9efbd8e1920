use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::order_repository::{RepoError, TransactionManager};
use crate::domain::progression::StatusJob;

/// Durable queue of delayed progression steps, one slot per order.
#[async_trait]
pub trait StatusJobStore: TransactionManager {
    /// Inserts or replaces the job for `job.order_id`.
    async fn put_job(&self, tx: &mut Self::Tx, job: &StatusJob) -> Result<(), RepoError>;

    async fn find_job(
        &self,
        tx: &mut Self::Tx,
        order_id: Uuid,
    ) -> Result<Option<StatusJob>, RepoError>;

    /// Returns `true` when a job was removed.
    async fn remove_job(&self, tx: &mut Self::Tx, order_id: Uuid) -> Result<bool, RepoError>;

    /// Pending jobs with `run_at <= now`, oldest first.
    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<StatusJob>, RepoError>;

    async fn dead_letters(&self) -> Result<Vec<StatusJob>, RepoError>;
}
