use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;
use super::money::{Money, Quantity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Preparing,
    Ready,
    Delivered,
    PickedUp,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Created,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::PickedUp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::PickedUp => "picked_up",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Created => &[OrderStatus::Preparing],
            OrderStatus::Preparing => &[OrderStatus::Ready],
            OrderStatus::Ready => &[OrderStatus::Delivered, OrderStatus::PickedUp],
            OrderStatus::Delivered | OrderStatus::PickedUp => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Delivery,
    Pickup,
}

impl DeliveryType {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryType::Delivery => "delivery",
            DeliveryType::Pickup => "pickup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivery" => Some(DeliveryType::Delivery),
            "pickup" => Some(DeliveryType::Pickup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invariant("Phone number is required"));
        }
        Ok(Self(value.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhoneNumber::new(value)
    }
}

impl From<PhoneNumber> for String {
    fn from(p: PhoneNumber) -> Self {
        p.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeliveryAddress(String);

impl DeliveryAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invariant("Address is required"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeliveryAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DeliveryAddress::new(value)
    }
}

impl From<DeliveryAddress> for String {
    fn from(a: DeliveryAddress) -> Self {
        a.0
    }
}

/// One order line. The price is a snapshot and does not follow later menu changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub dish_id: Uuid,
    pub quantity: Quantity,
    pub price: Money,
}

impl OrderItem {
    pub fn new(dish_id: Uuid, quantity: Quantity, price: Money) -> Self {
        Self {
            dish_id,
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    order_id: Uuid,
    user_id: Option<Uuid>,
    phone_number: PhoneNumber,
    items: Vec<OrderItem>,
    status: OrderStatus,
    delivery_type: DeliveryType,
    delivery_address: Option<DeliveryAddress>,
    restaurant_id: Uuid,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        order_id: Uuid,
        user_id: Option<Uuid>,
        phone_number: PhoneNumber,
        items: Vec<OrderItem>,
        delivery_type: DeliveryType,
        delivery_address: Option<DeliveryAddress>,
        restaurant_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Self::restore(
            order_id,
            user_id,
            phone_number,
            items,
            OrderStatus::Created,
            delivery_type,
            delivery_address,
            restaurant_id,
            created_at,
            0,
        )
    }

    /// Rebuilds a persisted order. Invariants are checked again so corrupt rows
    /// never become live aggregates.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        order_id: Uuid,
        user_id: Option<Uuid>,
        phone_number: PhoneNumber,
        items: Vec<OrderItem>,
        status: OrderStatus,
        delivery_type: DeliveryType,
        delivery_address: Option<DeliveryAddress>,
        restaurant_id: Uuid,
        created_at: DateTime<Utc>,
        version: u64,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::invariant("Order must contain at least one item"));
        }
        ensure_single_currency(&items)?;
        let delivery_address = match delivery_type {
            DeliveryType::Delivery => match delivery_address {
                Some(address) => Some(address),
                None => {
                    return Err(DomainError::invariant(
                        "Delivery address is required for delivery orders",
                    ))
                }
            },
            DeliveryType::Pickup => None,
        };
        Ok(Self {
            order_id,
            user_id,
            phone_number,
            items,
            status,
            delivery_type,
            delivery_address,
            restaurant_id,
            created_at,
            version,
        })
    }

    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn delivery_type(&self) -> DeliveryType {
        self.delivery_type
    }

    pub fn delivery_address(&self) -> Option<&DeliveryAddress> {
        self.delivery_address.as_ref()
    }

    pub fn restaurant_id(&self) -> Uuid {
        self.restaurant_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Concurrency token owned by repositories.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Called by a repository once a write of this aggregate has been accepted.
    pub fn advance_version(&mut self) {
        self.version += 1;
    }

    pub fn update_status(&mut self, status: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(status) {
            return Err(DomainError::invariant(format!(
                "Invalid status transition from {} to {}",
                self.status, status
            )));
        }
        self.status = status;
        Ok(())
    }

    pub fn add_item(&mut self, item: OrderItem) -> Result<(), DomainError> {
        if let Some(first) = self.items.first() {
            if first.price.currency() != item.price.currency() {
                return Err(DomainError::invariant(format!(
                    "Order is priced in {}, cannot add an item priced in {}",
                    first.price.currency(),
                    item.price.currency()
                )));
            }
        }
        self.items.push(item);
        Ok(())
    }

    pub fn remove_item(&mut self, dish_id: Uuid) -> Result<(), DomainError> {
        if self.items.iter().all(|it| it.dish_id == dish_id) {
            return Err(DomainError::invariant("Order must contain at least one item"));
        }
        self.items.retain(|it| it.dish_id != dish_id);
        Ok(())
    }

    pub fn total(&self) -> Result<Money, DomainError> {
        let mut lines = self.items.iter().map(OrderItem::line_total);
        let first = lines
            .next()
            .ok_or_else(|| DomainError::invariant("Order must contain at least one item"))?;
        lines.try_fold(first, |acc, line| acc.checked_add(&line))
    }

    pub fn currency(&self) -> &str {
        self.items
            .first()
            .map(|it| it.price.currency())
            .unwrap_or_default()
    }
}

fn ensure_single_currency(items: &[OrderItem]) -> Result<(), DomainError> {
    let mut currencies = items.iter().map(|it| it.price.currency());
    if let Some(first) = currencies.next() {
        if let Some(other) = currencies.find(|c| *c != first) {
            return Err(DomainError::invariant(format!(
                "Order items must share one currency, found {first} and {other}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(dish_id: Uuid, qty: u32, price: i64) -> OrderItem {
        OrderItem::new(
            dish_id,
            Quantity::new(qty).unwrap(),
            Money::new(Decimal::from(price), "RUB").unwrap(),
        )
    }

    fn order_with(
        items: Vec<OrderItem>,
        delivery_type: DeliveryType,
        address: Option<&str>,
    ) -> Result<Order, DomainError> {
        Order::create(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            PhoneNumber::new("+79990000000").unwrap(),
            items,
            delivery_type,
            address.map(|a| DeliveryAddress::new(a).unwrap()),
            Uuid::new_v4(),
            Utc::now(),
        )
    }

    fn order_in(status: OrderStatus) -> Order {
        let mut order =
            order_with(vec![item(Uuid::new_v4(), 1, 100)], DeliveryType::Pickup, None).unwrap();
        order.status = status;
        order
    }

    #[test]
    fn pickup_order_ignores_address() {
        let with_address = order_with(
            vec![item(Uuid::new_v4(), 1, 100)],
            DeliveryType::Pickup,
            Some("Tverskaya 1"),
        )
        .unwrap();
        assert!(with_address.delivery_address().is_none());

        let without = order_with(vec![item(Uuid::new_v4(), 1, 100)], DeliveryType::Pickup, None);
        assert!(without.is_ok());
    }

    #[test]
    fn delivery_order_requires_address() {
        let res = order_with(vec![item(Uuid::new_v4(), 1, 100)], DeliveryType::Delivery, None);
        assert!(matches!(res, Err(DomainError::InvariantViolation(_))));

        let ok = order_with(
            vec![item(Uuid::new_v4(), 1, 100)],
            DeliveryType::Delivery,
            Some("Tverskaya 1"),
        )
        .unwrap();
        assert_eq!(ok.delivery_address().unwrap().as_str(), "Tverskaya 1");
    }

    #[test]
    fn blank_values_are_rejected() {
        assert!(DeliveryAddress::new("   ").is_err());
        assert!(PhoneNumber::new("").is_err());
    }

    #[test]
    fn empty_items_rejected() {
        let res = order_with(vec![], DeliveryType::Pickup, None);
        assert!(matches!(res, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn mixed_currencies_rejected() {
        let usd = OrderItem::new(
            Uuid::new_v4(),
            Quantity::new(1).unwrap(),
            Money::new(Decimal::from(3), "USD").unwrap(),
        );
        let res = order_with(
            vec![item(Uuid::new_v4(), 1, 100), usd],
            DeliveryType::Pickup,
            None,
        );
        assert!(res.is_err());
    }

    #[test]
    fn new_order_starts_created_and_totals_lines() {
        let dish = Uuid::new_v4();
        let order = order_with(vec![item(dish, 2, 100)], DeliveryType::Pickup, None).unwrap();
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.version(), 0);
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].quantity.get(), 2);
        let total = order.total().unwrap();
        assert_eq!(total.amount(), Decimal::from(200));
        assert_eq!(total.currency(), "RUB");
    }

    #[test]
    fn ready_can_be_delivered_or_picked_up() {
        let mut a = order_in(OrderStatus::Ready);
        assert!(a.update_status(OrderStatus::Delivered).is_ok());
        let mut b = order_in(OrderStatus::Ready);
        assert!(b.update_status(OrderStatus::PickedUp).is_ok());
        let mut c = order_in(OrderStatus::Ready);
        assert!(c.update_status(OrderStatus::Created).is_err());
        assert_eq!(c.status(), OrderStatus::Ready);
    }

    #[test]
    fn terminal_statuses_reject_everything() {
        for terminal in [OrderStatus::Delivered, OrderStatus::PickedUp] {
            for target in OrderStatus::ALL {
                let mut order = order_in(terminal);
                let err = order.update_status(target).unwrap_err();
                assert!(err.to_string().contains(terminal.as_str()));
                assert_eq!(order.status(), terminal);
            }
        }
    }

    #[test]
    fn full_chain_and_no_skipping() {
        let mut order = order_in(OrderStatus::Created);
        assert!(order.update_status(OrderStatus::Ready).is_err());
        order.update_status(OrderStatus::Preparing).unwrap();
        order.update_status(OrderStatus::Ready).unwrap();
        order.update_status(OrderStatus::Delivered).unwrap();
        assert!(order.status().is_terminal());
    }

    #[test]
    fn add_and_remove_items() {
        let d1 = Uuid::new_v4();
        let d2 = Uuid::new_v4();
        let mut order = order_with(vec![item(d1, 1, 100)], DeliveryType::Pickup, None).unwrap();
        order.add_item(item(d1, 1, 100)).unwrap();
        order.add_item(item(d2, 3, 50)).unwrap();
        assert_eq!(order.items().len(), 3);

        order.remove_item(d1).unwrap();
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.items()[0].dish_id, d2);

        assert!(order.remove_item(d2).is_err());
        assert_eq!(order.items().len(), 1);
    }

    #[test]
    fn status_round_trips_through_its_wire_name() {
        for st in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(
            serde_json::to_string(&OrderStatus::PickedUp).unwrap(),
            "\"picked_up\""
        );
    }
}
