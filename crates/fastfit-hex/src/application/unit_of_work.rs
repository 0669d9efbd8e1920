//! Explicit transaction scope threaded through use cases.
//!
//! A `UnitOfWork` owns one storage transaction and a nesting depth. Every use
//! case brackets its work with [`UnitOfWork::enter`] / [`UnitOfWork::exit`], so
//! it can run on its own or inside a caller's scope; only the outermost `exit`
//! finishes the transaction. Dropping an unfinished unit of work drops the
//! transaction, which discards its writes.

use anyhow::anyhow;
use fastfit_types::ports::order_repository::{Transaction, TransactionManager};

use crate::errors::AppError;

pub struct UnitOfWork<T: Transaction> {
    tx: Option<T>,
    depth: usize,
    rollback_only: bool,
}

impl<T: Transaction> UnitOfWork<T> {
    /// Opens the outermost scope (depth 1).
    pub async fn begin<M>(manager: &M) -> Result<Self, AppError>
    where
        M: TransactionManager<Tx = T> + ?Sized,
    {
        let tx = manager.begin().await?;
        Ok(Self {
            tx: Some(tx),
            depth: 1,
            rollback_only: false,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn is_finished(&self) -> bool {
        self.tx.is_none()
    }

    pub fn tx(&mut self) -> Result<&mut T, AppError> {
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::Internal(anyhow!("unit of work already finished")))
    }

    pub fn enter(&mut self) -> Result<(), AppError> {
        if self.tx.is_none() {
            return Err(AppError::Internal(anyhow!("unit of work already finished")));
        }
        self.depth += 1;
        Ok(())
    }

    /// Closes the innermost scope. The outermost exit commits on `Ok` and rolls
    /// back on `Err`; an error in any inner scope forces the rollback.
    pub async fn exit<V>(&mut self, outcome: Result<V, AppError>) -> Result<V, AppError> {
        if self.depth == 0 {
            return Err(AppError::Internal(anyhow!("unit of work already finished")));
        }
        self.depth -= 1;
        if outcome.is_err() {
            self.rollback_only = true;
        }
        if self.depth > 0 {
            return outcome;
        }

        let tx = self
            .tx
            .take()
            .ok_or_else(|| AppError::Internal(anyhow!("unit of work already finished")))?;
        match outcome {
            Ok(value) if !self.rollback_only => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(_) => {
                tx.rollback().await?;
                Err(AppError::Internal(anyhow!(
                    "transaction was marked rollback-only by a failed inner scope"
                )))
            }
            Err(err) => {
                if let Err(rb) = tx.rollback().await {
                    tracing::warn!(error = %rb, "rollback failed");
                }
                Err(err)
            }
        }
    }
}
