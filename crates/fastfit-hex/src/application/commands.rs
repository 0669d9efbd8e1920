use fastfit_types::domain::errors::DomainError;
use fastfit_types::domain::money::{Money, Quantity};
use fastfit_types::domain::order::{DeliveryType, OrderItem, OrderStatus};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemDto {
    pub dish_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
    pub currency: String,
}

impl OrderItemDto {
    pub fn into_item(self) -> Result<OrderItem, DomainError> {
        Ok(OrderItem::new(
            self.dish_id,
            Quantity::new(self.quantity)?,
            Money::new(self.price, self.currency)?,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_id: Option<Uuid>,
    pub phone_number: String,
    pub items: Vec<OrderItemDto>,
    pub delivery_type: DeliveryType,
    /// Ignored for pickup orders.
    pub delivery_address: Option<String>,
    pub restaurant_id: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateOrderStatusCommand {
    pub order_id: Uuid,
    pub new_status: OrderStatus,
}
