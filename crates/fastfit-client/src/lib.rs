use std::time::Duration;

use anyhow::Context;
use fastfit_types::domain::order::{DeliveryType, OrderStatus};
use fastfit_types::ports::order_read::OrderView;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const IDENTITY_ID_HEADER: &str = "x-identity-id";
pub const IDENTITY_PHONE_HEADER: &str = "x-identity-phone";
pub const IDENTITY_ROLE_HEADER: &str = "x-identity-role";

#[derive(Clone)]
pub struct OrdersClientBuilder {
    base: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

#[derive(Clone)]
pub struct OrdersClient {
    base: Url,
    client: reqwest::Client,
}

/// Non-2xx answer from the API, decoded from its `{error, detail}` body.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{status} {error}: {detail}")]
pub struct ApiError {
    pub status: u16,
    pub error: String,
    pub detail: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    detail: String,
}

async fn checked(res: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    let (error, detail) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.error, body.detail),
        Err(_) => (status.canonical_reason().unwrap_or("Error").to_string(), text),
    };
    tracing::debug!(status = status.as_u16(), %error, "request rejected");
    Err(ApiError {
        status: status.as_u16(),
        error,
        detail,
    }
    .into())
}

impl OrdersClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::builder(base_url)?.build()
    }

    pub fn builder(base_url: &str) -> anyhow::Result<OrdersClientBuilder> {
        let base = Url::parse(base_url).context("invalid base url")?;
        Ok(OrdersClientBuilder {
            base,
            headers: HeaderMap::new(),
            timeout: None,
            client: None,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base.join(path).context("failed to join url")
    }

    pub async fn create_order(
        &self,
        req: CreateOrderRequest,
    ) -> anyhow::Result<CreateOrderResponse> {
        let res = self
            .client
            .post(self.url("orders")?)
            .json(&req)
            .send()
            .await?;
        Ok(checked(res).await?.json().await?)
    }

    pub async fn get_order(&self, id: Uuid) -> anyhow::Result<OrderView> {
        let res = self
            .client
            .get(self.url(&format!("orders/{id}"))?)
            .send()
            .await?;
        Ok(checked(res).await?.json().await?)
    }

    pub async fn list_my_orders(&self) -> anyhow::Result<Vec<OrderView>> {
        let res = self.client.get(self.url("orders")?).send().await?;
        Ok(checked(res).await?.json().await?)
    }

    pub async fn list_restaurant_orders(
        &self,
        restaurant_id: Uuid,
        status: Option<OrderStatus>,
    ) -> anyhow::Result<Vec<OrderView>> {
        let mut url = self.url(&format!("restaurants/{restaurant_id}/orders"))?;
        if let Some(status) = status {
            url.query_pairs_mut().append_pair("status", status.as_str());
        }
        let res = self.client.get(url).send().await?;
        Ok(checked(res).await?.json().await?)
    }

    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> anyhow::Result<OrderView> {
        let res = self
            .client
            .patch(self.url(&format!("orders/{id}/status"))?)
            .json(&UpdateStatusRequest { status })
            .send()
            .await?;
        Ok(checked(res).await?.json().await?)
    }

    pub async fn cancel_progression(&self, id: Uuid) -> anyhow::Result<()> {
        let res = self
            .client
            .delete(self.url(&format!("orders/{id}/progression"))?)
            .send()
            .await?;
        checked(res).await?;
        Ok(())
    }
}

impl OrdersClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(
        mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("invalid header value")?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Sends the caller identity that the API expects from its auth proxy.
    pub fn with_identity(self, user_id: Uuid, phone_number: &str) -> anyhow::Result<Self> {
        self.with_header(IDENTITY_ID_HEADER, user_id.to_string())?
            .with_header(IDENTITY_PHONE_HEADER, phone_number)
    }

    /// Marks the caller as restaurant staff, required for status changes and
    /// restaurant listings.
    pub fn with_role(self, role: &str) -> anyhow::Result<Self> {
        self.with_header(IDENTITY_ROLE_HEADER, role)
    }

    /// Uses `client` as is; headers and timeout set on this builder are ignored.
    pub fn with_reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> anyhow::Result<OrdersClient> {
        if let Some(client) = self.client {
            return Ok(OrdersClient {
                base: self.base,
                client,
            });
        }

        let mut builder = reqwest::Client::builder();
        if !self.headers.is_empty() {
            builder = builder.default_headers(self.headers);
        }
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        Ok(OrdersClient {
            base: self.base,
            client,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderItemRequest {
    pub dish_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub delivery_type: DeliveryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct UpdateStatusRequest {
    status: OrderStatus,
}
