use std::sync::Arc;

use fastfit_types::domain::order::OrderStatus;
use fastfit_types::ports::clock::{Clock, IdGenerator};
use fastfit_types::ports::order_read::{OrderReadRepository, OrderView};
use fastfit_types::ports::order_repository::OrderRepository;
use fastfit_types::ports::status_jobs::StatusJobStore;
use uuid::Uuid;

use super::commands::{CreateOrderCommand, UpdateOrderStatusCommand};
use super::create_order::CreateOrderUseCase;
use super::status_scheduler::{SchedulerConfig, StatusScheduler};
use super::unit_of_work::UnitOfWork;
use super::update_order_status::UpdateOrderStatusUseCase;
use crate::errors::AppError;

/// Storage the service needs: transactional writes, the job queue and the
/// read model.
pub trait OrderStore: OrderRepository + StatusJobStore + OrderReadRepository {}

impl<T> OrderStore for T where T: OrderRepository + StatusJobStore + OrderReadRepository {}

pub struct OrderService<R: OrderStore> {
    repo: Arc<R>,
    create: CreateOrderUseCase<R>,
    update: UpdateOrderStatusUseCase<R>,
    scheduler: Arc<StatusScheduler<R>>,
}

impl<R: OrderStore> OrderService<R> {
    pub fn new(
        repo: Arc<R>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        scheduler: SchedulerConfig,
    ) -> Self {
        Self {
            create: CreateOrderUseCase::new(repo.clone(), clock.clone(), ids),
            update: UpdateOrderStatusUseCase::new(repo.clone()),
            scheduler: Arc::new(StatusScheduler::new(repo.clone(), clock, scheduler)),
            repo,
        }
    }

    /// Worker handle; spawn `scheduler().run(token)` to drive progression.
    pub fn scheduler(&self) -> Arc<StatusScheduler<R>> {
        self.scheduler.clone()
    }

    /// Persists the order and its first progression job atomically.
    pub async fn place_order(&self, cmd: CreateOrderCommand) -> Result<Uuid, AppError> {
        let mut uow = UnitOfWork::begin(&*self.repo).await?;
        let outcome = self.place(&mut uow, cmd).await;
        uow.exit(outcome).await
    }

    async fn place(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        cmd: CreateOrderCommand,
    ) -> Result<Uuid, AppError> {
        let order_id = self.create.execute(uow, cmd).await?;
        self.scheduler.schedule_initial(uow, order_id).await?;
        Ok(order_id)
    }

    /// Read model of an order owned by `user_id`.
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderView, AppError> {
        let view = self.find(order_id).await?;
        if view.user_id != Some(user_id) {
            return Err(AppError::Forbidden(format!(
                "order {order_id} belongs to another user"
            )));
        }
        Ok(view)
    }

    pub async fn list_my_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, AppError> {
        Ok(self.repo.list_by_user(user_id).await?)
    }

    pub async fn list_restaurant_orders(
        &self,
        restaurant_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderView>, AppError> {
        Ok(self.repo.list_by_restaurant(restaurant_id, status).await?)
    }

    /// Administrative status change; goes through the same use case as the
    /// scheduler.
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderView, AppError> {
        let mut uow = UnitOfWork::begin(&*self.repo).await?;
        let outcome = self
            .update
            .execute(
                &mut uow,
                UpdateOrderStatusCommand {
                    order_id,
                    new_status: status,
                },
            )
            .await;
        let order = uow.exit(outcome).await?;
        Ok(OrderView::try_from(&order)?)
    }

    /// Stops further automatic steps for an order owned by `user_id`.
    pub async fn cancel_progression(&self, user_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        self.get_order(user_id, order_id).await?;
        self.scheduler.cancel(order_id).await?;
        Ok(())
    }

    async fn find(&self, order_id: Uuid) -> Result<OrderView, AppError> {
        self.repo
            .find_view(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
    }
}
