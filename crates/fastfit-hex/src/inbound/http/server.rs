use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    serve, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::identity::{IdentityDescriptor, StaffIdentity};
use crate::application::commands::{CreateOrderCommand, OrderItemDto};
use crate::application::order_service::{OrderService, OrderStore};
use crate::errors::AppError;
use fastfit_types::domain::order::{DeliveryType, OrderStatus};
use fastfit_types::ports::order_read::OrderView;

#[derive(Clone)]
pub struct HttpServerConfig {
    pub port: String,
    pub default_restaurant_id: Uuid,
    pub default_currency: String,
}

struct AppState<R: OrderStore> {
    service: Arc<OrderService<R>>,
    config: HttpServerConfig,
}

pub struct HttpServer<R: OrderStore> {
    state: Arc<AppState<R>>,
}

impl<R: OrderStore> Clone for HttpServer<R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderItemRequest {
    pub dish_id: Uuid,
    pub quantity: u32,
    pub price: Decimal,
    /// Falls back to the configured default currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CreateOrderItemRequest>,
    pub delivery_type: DeliveryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub message: String,
}

#[derive(Deserialize)]
struct RestaurantOrdersQuery {
    status: Option<String>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|e| AppError::BadRequest(format!("invalid id '{raw}': {e}")))
}

impl<R: OrderStore> HttpServer<R> {
    pub async fn new(service: Arc<OrderService<R>>, config: HttpServerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            state: Arc::new(AppState { service, config }),
        })
    }

    pub fn router(&self) -> Router {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http_request",
                    %request_id,
                    method = %request.method(),
                    uri
                )
            })
            .on_request(
                |request: &axum::extract::Request<_>, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        method = %request.method(),
                        uri = %request.uri(),
                        "request"
                    );
                },
            )
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        status = %response.status(),
                        latency_ms = %latency.as_millis(),
                        "response"
                    );
                },
            );

        Router::new()
            .route("/health", get(health))
            .route("/orders", post(create_order::<R>).get(list_my_orders::<R>))
            .route("/orders/{id}", get(get_order::<R>))
            .route("/orders/{id}/status", patch(update_status::<R>))
            .route("/orders/{id}/progression", delete(cancel_progression::<R>))
            .route("/restaurants/{id}/orders", get(restaurant_orders::<R>))
            .layer(trace_layer)
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` is cancelled, then drains in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.state.config.port).parse()?;
        tracing::info!("starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn create_order<R: OrderStore>(
    State(state): State<Arc<AppState<R>>>,
    identity: IdentityDescriptor,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let Json(payload) = payload?;
    let currency = &state.config.default_currency;
    let cmd = CreateOrderCommand {
        user_id: Some(identity.user_id),
        phone_number: identity.phone_number,
        items: payload
            .items
            .into_iter()
            .map(|item| OrderItemDto {
                dish_id: item.dish_id,
                quantity: item.quantity,
                price: item.price,
                currency: item.currency.unwrap_or_else(|| currency.clone()),
            })
            .collect(),
        delivery_type: payload.delivery_type,
        delivery_address: payload.delivery_address,
        restaurant_id: state.config.default_restaurant_id,
    };
    let order_id = state.service.place_order(cmd).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            order_id,
            message: "Order created".into(),
        }),
    ))
}

async fn list_my_orders<R: OrderStore>(
    State(state): State<Arc<AppState<R>>>,
    identity: IdentityDescriptor,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let list = state.service.list_my_orders(identity.user_id).await?;
    Ok(Json(list))
}

async fn get_order<R: OrderStore>(
    State(state): State<Arc<AppState<R>>>,
    identity: IdentityDescriptor,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let order = state
        .service
        .get_order(identity.user_id, parse_id(&id)?)
        .await?;
    Ok(Json(order))
}

async fn update_status<R: OrderStore>(
    State(state): State<Arc<AppState<R>>>,
    staff: StaffIdentity,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderView>, AppError> {
    let Json(payload) = payload?;
    let updated = state
        .service
        .update_status(parse_id(&id)?, payload.status)
        .await?;
    tracing::info!(
        order_id = %updated.order_id,
        status = %updated.status,
        by = %staff.identity.user_id,
        role = %staff.role,
        "status changed by staff"
    );
    Ok(Json(updated))
}

async fn cancel_progression<R: OrderStore>(
    State(state): State<Arc<AppState<R>>>,
    identity: IdentityDescriptor,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .cancel_progression(identity.user_id, parse_id(&id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restaurant_orders<R: OrderStore>(
    State(state): State<Arc<AppState<R>>>,
    _staff: StaffIdentity,
    Path(id): Path<String>,
    Query(query): Query<RestaurantOrdersQuery>,
) -> Result<Json<Vec<OrderView>>, AppError> {
    let status = query
        .status
        .map(|s| {
            OrderStatus::parse(&s).ok_or_else(|| AppError::BadRequest(format!("unknown status '{s}'")))
        })
        .transpose()?;
    let list = state
        .service
        .list_restaurant_orders(parse_id(&id)?, status)
        .await?;
    Ok(Json(list))
}
