use std::sync::Arc;

use fastfit_types::domain::order::{DeliveryAddress, DeliveryType, Order, PhoneNumber};
use fastfit_types::ports::clock::{Clock, IdGenerator};
use fastfit_types::ports::order_repository::OrderRepository;
use uuid::Uuid;

use super::commands::{CreateOrderCommand, OrderItemDto};
use super::unit_of_work::UnitOfWork;
use crate::errors::AppError;

pub struct CreateOrderUseCase<R: OrderRepository> {
    repo: Arc<R>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<R: OrderRepository> CreateOrderUseCase<R> {
    pub fn new(repo: Arc<R>, clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { repo, clock, ids }
    }

    /// Builds and persists a new order; returns its id.
    pub async fn execute(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        cmd: CreateOrderCommand,
    ) -> Result<Uuid, AppError> {
        uow.enter()?;
        let outcome = self.create(uow, cmd).await;
        uow.exit(outcome).await
    }

    async fn create(
        &self,
        uow: &mut UnitOfWork<R::Tx>,
        cmd: CreateOrderCommand,
    ) -> Result<Uuid, AppError> {
        let items = cmd
            .items
            .into_iter()
            .map(OrderItemDto::into_item)
            .collect::<Result<Vec<_>, _>>()?;
        let delivery_address = match cmd.delivery_type {
            DeliveryType::Delivery => cmd
                .delivery_address
                .map(DeliveryAddress::new)
                .transpose()?,
            DeliveryType::Pickup => None,
        };

        let order = Order::create(
            self.ids.create(),
            cmd.user_id,
            PhoneNumber::new(cmd.phone_number)?,
            items,
            cmd.delivery_type,
            delivery_address,
            cmd.restaurant_id,
            self.clock.now(),
        )?;
        self.repo.add(uow.tx()?, &order).await?;

        tracing::info!(
            order_id = %order.order_id(),
            items = order.items().len(),
            delivery_type = order.delivery_type().as_str(),
            "order created"
        );
        Ok(order.order_id())
    }
}
