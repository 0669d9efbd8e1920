//! Background progression of orders through the kitchen and delivery statuses.
//!
//! Each order has at most one pending [`StatusJob`] in the job store. A worker
//! polls for due jobs; running a job applies its target status through
//! [`UpdateOrderStatusUseCase`] and, in the same transaction, replaces the job
//! with the next step of the chain or removes it once the chain ends.
//!
//! Failures never disappear: transient errors reschedule the job with
//! exponential backoff until `max_attempts`, everything else (and retries that
//! run out) is dead-lettered and kept in the store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use fastfit_types::domain::order::OrderStatus;
use fastfit_types::domain::progression::{
    initial_step, next_step, JobState, ProgressionStep, StatusJob,
};
use fastfit_types::ports::clock::Clock;
use fastfit_types::ports::order_repository::OrderRepository;
use fastfit_types::ports::status_jobs::StatusJobStore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::commands::UpdateOrderStatusCommand;
use super::unit_of_work::UnitOfWork;
use super::update_order_status::UpdateOrderStatusUseCase;
use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Length of one policy time unit.
    pub time_unit: Duration,
    pub poll_interval: Duration,
    /// Max jobs picked up per scan.
    pub batch_size: usize,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_attempts: 5,
            retry_base: Duration::from_secs(1),
            retry_max: Duration::from_secs(60),
        }
    }
}

impl SchedulerConfig {
    /// Backoff before the next try: base * 2^attempts, capped at `retry_max`.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(attempts).unwrap_or(u32::MAX);
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

/// What happened to one due job during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Advanced {
        order_id: Uuid,
        status: OrderStatus,
        next: Option<OrderStatus>,
    },
    /// The job was cancelled or replaced after the scan picked it up.
    Skipped { order_id: Uuid },
    Retrying {
        order_id: Uuid,
        attempts: u32,
        run_at: DateTime<Utc>,
    },
    DeadLettered { order_id: Uuid, error: String },
}

pub struct StatusScheduler<R>
where
    R: OrderRepository + StatusJobStore,
{
    repo: Arc<R>,
    update: UpdateOrderStatusUseCase<R>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl<R> StatusScheduler<R>
where
    R: OrderRepository + StatusJobStore,
{
    pub fn new(repo: Arc<R>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            update: UpdateOrderStatusUseCase::new(repo.clone()),
            repo,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Enqueues the first step for a freshly created order inside the caller's
    /// unit of work, so the order and its job commit together.
    pub async fn schedule_initial(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        order_id: Uuid,
    ) -> Result<StatusJob, AppError> {
        uow.enter()?;
        let outcome = self.enqueue(uow, order_id, initial_step()).await;
        uow.exit(outcome).await
    }

    /// Drops the remaining automatic steps of an order. Steps already applied
    /// stay applied. Returns `false` when nothing was pending.
    pub async fn cancel(&self, order_id: Uuid) -> Result<bool, AppError> {
        let mut uow = UnitOfWork::begin(&*self.repo).await?;
        let outcome = match uow.tx() {
            Ok(tx) => self.repo.remove_job(tx, order_id).await.map_err(AppError::from),
            Err(e) => Err(e),
        };
        let removed = uow.exit(outcome).await?;
        if removed {
            tracing::info!(order_id = %order_id, "status progression cancelled");
        }
        Ok(removed)
    }

    pub async fn dead_letters(&self) -> Result<Vec<StatusJob>, AppError> {
        Ok(self.repo.dead_letters().await?)
    }

    /// Runs every job that is due now, one transaction per job.
    pub async fn run_due(&self) -> Result<Vec<JobOutcome>, AppError> {
        let due = self
            .repo
            .due_jobs(self.clock.now(), self.config.batch_size)
            .await?;
        let mut outcomes = Vec::with_capacity(due.len());
        for job in due {
            outcomes.push(self.process(job).await);
        }
        Ok(outcomes)
    }

    /// Polls until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            time_unit = ?self.config.time_unit,
            "status scheduler started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("status scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_due().await {
                        Ok(outcomes) if !outcomes.is_empty() => {
                            tracing::debug!(processed = outcomes.len(), "status jobs processed");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "failed to scan due status jobs"),
                    }
                }
            }
        }
    }

    async fn enqueue(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        order_id: Uuid,
        step: ProgressionStep,
    ) -> Result<StatusJob, AppError> {
        let job = StatusJob::new(order_id, step, self.after(step.delay(self.config.time_unit))?);
        self.repo.put_job(uow.tx()?, &job).await?;
        tracing::debug!(
            order_id = %order_id,
            target = %job.target_status,
            run_at = %job.run_at,
            "status job scheduled"
        );
        Ok(job)
    }

    fn after(&self, delay: Duration) -> Result<DateTime<Utc>, AppError> {
        let delay = chrono::Duration::from_std(delay).map_err(|e| AppError::Internal(anyhow!(e)))?;
        Ok(self.clock.now() + delay)
    }

    async fn process(&self, job: StatusJob) -> JobOutcome {
        match self.step(&job).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(job, err).await,
        }
    }

    async fn step(&self, job: &StatusJob) -> Result<JobOutcome, AppError> {
        let mut uow = UnitOfWork::begin(&*self.repo).await?;
        let outcome = self.advance(&mut uow, job).await;
        uow.exit(outcome).await
    }

    async fn advance(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        job: &StatusJob,
    ) -> Result<JobOutcome, AppError> {
        let order_id = job.order_id;
        if self.repo.find_job(uow.tx()?, order_id).await?.as_ref() != Some(job) {
            return Ok(JobOutcome::Skipped { order_id });
        }

        let order = self
            .update
            .execute(
                uow,
                UpdateOrderStatusCommand {
                    order_id,
                    new_status: job.target_status,
                },
            )
            .await?;

        let next = match next_step(order.status()) {
            Some(step) => Some(self.enqueue(uow, order_id, step).await?.target_status),
            None => {
                self.repo.remove_job(uow.tx()?, order_id).await?;
                None
            }
        };
        Ok(JobOutcome::Advanced {
            order_id,
            status: order.status(),
            next,
        })
    }

    async fn fail(&self, mut job: StatusJob, err: AppError) -> JobOutcome {
        let order_id = job.order_id;
        let delay = self.config.retry_delay(job.attempts);
        job.attempts += 1;
        job.last_error = Some(err.to_string());

        let retry_at = if err.is_transient() && job.attempts < self.config.max_attempts {
            self.after(delay).ok()
        } else {
            None
        };
        let outcome = match retry_at {
            Some(run_at) => {
                job.run_at = run_at;
                tracing::warn!(
                    order_id = %order_id,
                    target = %job.target_status,
                    attempt = job.attempts,
                    retry_in = ?delay,
                    error = %err,
                    "status job failed, retrying"
                );
                JobOutcome::Retrying {
                    order_id,
                    attempts: job.attempts,
                    run_at,
                }
            }
            None => {
                job.state = JobState::DeadLettered;
                tracing::error!(
                    order_id = %order_id,
                    target = %job.target_status,
                    attempt = job.attempts,
                    error = %err,
                    "status job dead-lettered"
                );
                JobOutcome::DeadLettered {
                    order_id,
                    error: err.to_string(),
                }
            }
        };

        if let Err(e) = self.record(&job).await {
            tracing::error!(order_id = %order_id, error = %e, "failed to record status job failure");
        }
        outcome
    }

    /// Writes back a failed job unless it was cancelled in the meantime.
    async fn record(&self, job: &StatusJob) -> Result<(), AppError> {
        let mut uow = UnitOfWork::begin(&*self.repo).await?;
        let outcome = self.record_in(&mut uow, job).await;
        uow.exit(outcome).await
    }

    async fn record_in(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        job: &StatusJob,
    ) -> Result<(), AppError> {
        if self.repo.find_job(uow.tx()?, job.order_id).await?.is_some() {
            self.repo.put_job(uow.tx()?, job).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let config = SchedulerConfig {
            retry_base: Duration::from_millis(100),
            retry_max: Duration::from_millis(1000),
            ..SchedulerConfig::default()
        };
        assert_eq!(config.retry_delay(0), Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(800));
        assert_eq!(config.retry_delay(4), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(40), Duration::from_millis(1000));
    }
}
