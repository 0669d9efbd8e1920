use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order_repository::RepoError;
use crate::domain::errors::DomainError;
use crate::domain::order::{DeliveryType, Order, OrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub dish_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
    pub currency: String,
}

/// Flat read model returned by the query side of the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub phone_number: String,
    pub items: Vec<OrderItemView>,
    pub total_price: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub delivery_type: DeliveryType,
    pub delivery_address: Option<String>,
    pub restaurant_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&Order> for OrderView {
    type Error = DomainError;

    fn try_from(order: &Order) -> Result<Self, Self::Error> {
        let total = order.total()?;
        Ok(Self {
            order_id: order.order_id(),
            user_id: order.user_id(),
            phone_number: order.phone_number().as_str().to_string(),
            items: order
                .items()
                .iter()
                .map(|it| OrderItemView {
                    dish_id: it.dish_id,
                    quantity: it.quantity.get(),
                    price: it.price.amount(),
                    currency: it.price.currency().to_string(),
                })
                .collect(),
            total_price: total.amount(),
            currency: total.currency().to_string(),
            status: order.status(),
            delivery_type: order.delivery_type(),
            delivery_address: order.delivery_address().map(|a| a.as_str().to_string()),
            restaurant_id: order.restaurant_id(),
            created_at: order.created_at(),
        })
    }
}

/// Query side; reads committed state outside any unit of work.
#[async_trait]
pub trait OrderReadRepository: Send + Sync + 'static {
    async fn find_view(&self, order_id: Uuid) -> Result<Option<OrderView>, RepoError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<OrderView>, RepoError>;

    async fn list_by_restaurant(
        &self,
        restaurant_id: Uuid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderView>, RepoError>;
}
