use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fastfit_types::domain::order::{Order, OrderStatus};
use fastfit_types::domain::progression::{JobState, StatusJob};
use fastfit_types::ports::order_read::{OrderReadRepository, OrderView};
use fastfit_types::ports::order_repository::{
    OrderRepository, RepoError, Transaction, TransactionManager,
};
use fastfit_types::ports::status_jobs::StatusJobStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone)]
pub struct InMemoryRepo {
    pub orders: Arc<DashMap<Uuid, Order>>,
    pub jobs: Arc<DashMap<Uuid, StatusJob>>,
    commit_lock: Arc<Mutex<()>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(DashMap::new()),
            jobs: Arc::new(DashMap::new()),
            commit_lock: Arc::new(Mutex::new(())),
        }
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

enum Write {
    InsertOrder(Order),
    UpdateOrder { expected_version: u64, order: Order },
    PutJob(StatusJob),
    RemoveJob(Uuid),
}

/// Staged writes, validated and applied together on commit.
pub struct MemoryTx {
    repo: InMemoryRepo,
    writes: Vec<Write>,
}

impl MemoryTx {
    fn current_order(&self, order_id: Uuid) -> Option<Order> {
        let staged = self.writes.iter().rev().find_map(|w| match w {
            Write::InsertOrder(o) | Write::UpdateOrder { order: o, .. }
                if o.order_id() == order_id =>
            {
                Some(o.clone())
            }
            _ => None,
        });
        staged.or_else(|| self.repo.orders.get(&order_id).map(|r| r.clone()))
    }

    fn current_job(&self, order_id: Uuid) -> Option<StatusJob> {
        for w in self.writes.iter().rev() {
            match w {
                Write::PutJob(job) if job.order_id == order_id => return Some(job.clone()),
                Write::RemoveJob(id) if *id == order_id => return None,
                _ => {}
            }
        }
        self.repo.jobs.get(&order_id).map(|r| r.clone())
    }

    fn apply(self) -> Result<(), RepoError> {
        let _guard = self
            .repo
            .commit_lock
            .lock()
            .map_err(|_| RepoError::db("commit lock poisoned"))?;

        // Validate everything first so a failed commit leaves the store untouched.
        let mut versions: HashMap<Uuid, u64> = HashMap::new();
        for w in &self.writes {
            match w {
                Write::InsertOrder(o) => {
                    let id = o.order_id();
                    if versions.contains_key(&id) || self.repo.orders.contains_key(&id) {
                        return Err(duplicate_order(id));
                    }
                    versions.insert(id, o.version());
                }
                Write::UpdateOrder {
                    expected_version,
                    order,
                } => {
                    let id = order.order_id();
                    let stored = versions
                        .get(&id)
                        .copied()
                        .or_else(|| self.repo.orders.get(&id).map(|r| r.version()));
                    match stored {
                        None => return Err(RepoError::NotFound(id)),
                        Some(v) if v != *expected_version => return Err(RepoError::OptimisticLock),
                        Some(_) => {}
                    }
                    versions.insert(id, order.version());
                }
                Write::PutJob(_) | Write::RemoveJob(_) => {}
            }
        }

        for w in self.writes {
            match w {
                Write::InsertOrder(o) | Write::UpdateOrder { order: o, .. } => {
                    self.repo.orders.insert(o.order_id(), o);
                }
                Write::PutJob(job) => {
                    self.repo.jobs.insert(job.order_id, job);
                }
                Write::RemoveJob(id) => {
                    self.repo.jobs.remove(&id);
                }
            }
        }
        Ok(())
    }
}

fn duplicate_order(id: Uuid) -> RepoError {
    RepoError::DuplicateEntry {
        field: "order_id".into(),
        value: id.to_string(),
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(self) -> Result<(), RepoError> {
        self.apply()
    }

    async fn rollback(self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for InMemoryRepo {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, RepoError> {
        Ok(MemoryTx {
            repo: self.clone(),
            writes: Vec::new(),
        })
    }
}

#[async_trait]
impl OrderRepository for InMemoryRepo {
    async fn get_by_id(&self, tx: &mut MemoryTx, order_id: Uuid) -> Result<Order, RepoError> {
        tx.current_order(order_id)
            .ok_or(RepoError::NotFound(order_id))
    }

    async fn add(&self, tx: &mut MemoryTx, order: &Order) -> Result<(), RepoError> {
        if tx.current_order(order.order_id()).is_some() {
            return Err(duplicate_order(order.order_id()));
        }
        tx.writes.push(Write::InsertOrder(order.clone()));
        Ok(())
    }

    async fn update(&self, tx: &mut MemoryTx, order: &mut Order) -> Result<(), RepoError> {
        let current = tx
            .current_order(order.order_id())
            .ok_or(RepoError::NotFound(order.order_id()))?;
        if current.version() != order.version() {
            return Err(RepoError::OptimisticLock);
        }
        let expected_version = order.version();
        order.advance_version();
        tx.writes.push(Write::UpdateOrder {
            expected_version,
            order: order.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl StatusJobStore for InMemoryRepo {
    async fn put_job(&self, tx: &mut MemoryTx, job: &StatusJob) -> Result<(), RepoError> {
        tx.writes.push(Write::PutJob(job.clone()));
        Ok(())
    }

    async fn find_job(
        &self,
        tx: &mut MemoryTx,
        order_id: Uuid,
    ) -> Result<Option<StatusJob>, RepoError> {
        Ok(tx.current_job(order_id))
    }

    async fn remove_job(&self, tx: &mut MemoryTx, order_id: Uuid) -> Result<bool, RepoError> {
        if tx.current_job(order_id).is_none() {
            return Ok(false);
        }
        tx.writes.push(Write::RemoveJob(order_id));
        Ok(true)
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<StatusJob>, RepoError> {
        let mut due: Vec<StatusJob> = self
            .jobs
            .iter()
            .filter(|kv| kv.value().is_due(now))
            .map(|kv| kv.value().clone())
            .collect();
        due.sort_by_key(|j| j.run_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn dead_letters(&self) -> Result<Vec<StatusJob>, RepoError> {
        Ok(self
            .jobs
            .iter()
            .filter(|kv| kv.value().state == JobState::DeadLettered)
            .map(|kv| kv.value().clone())
            .collect())
    }
}

#[async_trait]
impl OrderReadRepository for InMemoryRepo {
    async fn find_view(&self, order_id: Uuid) -> Result<Option<OrderView>, RepoError> {
        self.orders
            .get(&order_id)
            .map(|o| OrderView::try_from(o.value()).map_err(RepoError::from))
            .transpose()
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, RepoError> {
        self.collect_views(|o| o.user_id() == Some(user_id))
    }

    async fn list_by_restaurant(
        &self,
        restaurant_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderView>, RepoError> {
        self.collect_views(|o| {
            o.restaurant_id() == restaurant_id && status.map_or(true, |s| o.status() == s)
        })
    }
}

impl InMemoryRepo {
    fn collect_views(&self, keep: impl Fn(&Order) -> bool) -> Result<Vec<OrderView>, RepoError> {
        let mut views = self
            .orders
            .iter()
            .filter(|kv| keep(kv.value()))
            .map(|kv| OrderView::try_from(kv.value()).map_err(RepoError::from))
            .collect::<Result<Vec<_>, _>>()?;
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }
}
