use std::sync::Arc;

use fastfit_types::domain::order::Order;
use fastfit_types::ports::order_repository::OrderRepository;

use super::commands::UpdateOrderStatusCommand;
use super::unit_of_work::UnitOfWork;
use crate::errors::AppError;

/// The only path that mutates an order's status, for both the scheduler and
/// administrative requests.
pub struct UpdateOrderStatusUseCase<R: OrderRepository> {
    repo: Arc<R>,
}

impl<R: OrderRepository> UpdateOrderStatusUseCase<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub async fn execute(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        cmd: UpdateOrderStatusCommand,
    ) -> Result<Order, AppError> {
        uow.enter()?;
        let outcome = self.update(uow, cmd).await;
        uow.exit(outcome).await
    }

    async fn update(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        cmd: UpdateOrderStatusCommand,
    ) -> Result<Order, AppError> {
        let mut order = self.repo.get_by_id(uow.tx()?, cmd.order_id).await?;
        let previous = order.status();
        order.update_status(cmd.new_status)?;
        self.repo.update(uow.tx()?, &mut order).await?;

        tracing::info!(
            order_id = %cmd.order_id,
            from = %previous,
            status = %order.status(),
            version = order.version(),
            "order status updated"
        );
        Ok(order)
    }
}
