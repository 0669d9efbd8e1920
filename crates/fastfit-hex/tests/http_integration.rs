use fastfit_hex::application::order_service::OrderService;
use fastfit_hex::application::status_scheduler::SchedulerConfig;
use fastfit_hex::inbound::http::{
    CreateOrderItemRequest, CreateOrderRequest, CreateOrderResponse, HttpServer,
    HttpServerConfig, UpdateStatusRequest, IDENTITY_ID_HEADER, IDENTITY_PHONE_HEADER,
    IDENTITY_ROLE_HEADER,
};
use fastfit_repo::memory::InMemoryRepo;
use fastfit_types::domain::order::{DeliveryType, OrderStatus};
use fastfit_types::ports::clock::{SystemClock, UuidV4Generator};
use fastfit_types::ports::order_read::OrderView;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    detail: String,
}

struct TestServer {
    addr: String,
    restaurant_id: Uuid,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn start_server() -> TestServer {
    let port = find_free_port();
    let restaurant_id = Uuid::new_v4();
    let config = HttpServerConfig {
        port: port.to_string(),
        default_restaurant_id: restaurant_id,
        default_currency: "RUB".into(),
    };

    let service = OrderService::new(
        Arc::new(InMemoryRepo::new()),
        Arc::new(SystemClock),
        Arc::new(UuidV4Generator),
        SchedulerConfig::default(),
    );
    let server = HttpServer::new(Arc::new(service), config).await.unwrap();

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        server.run(token).await.expect("server run");
    });

    // Give the server a moment to start.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    TestServer {
        addr: format!("http://127.0.0.1:{}", port),
        restaurant_id,
        shutdown,
    }
}

fn authed(builder: reqwest::RequestBuilder, user: Uuid) -> reqwest::RequestBuilder {
    builder
        .header(IDENTITY_ID_HEADER, user.to_string())
        .header(IDENTITY_PHONE_HEADER, "+79990000000")
}

fn staff(builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    authed(builder, Uuid::new_v4()).header(IDENTITY_ROLE_HEADER, "staff")
}

fn order_body(delivery_type: DeliveryType, address: Option<&str>) -> CreateOrderRequest {
    CreateOrderRequest {
        items: vec![CreateOrderItemRequest {
            dish_id: Uuid::new_v4(),
            quantity: 2,
            price: Decimal::new(100, 0),
            currency: None,
        }],
        delivery_type,
        delivery_address: address.map(str::to_string),
    }
}

async fn error_of(res: reqwest::Response) -> ErrorBody {
    res.json().await.unwrap()
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let user = Uuid::new_v4();

    let health = client
        .get(format!("{}/health", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let res = authed(client.post(format!("{}/orders", server.addr)), user)
        .json(&order_body(DeliveryType::Delivery, Some("Lenina 1")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);
    let created: CreateOrderResponse = res.json().await.unwrap();
    assert_eq!(created.message, "Order created");
    let id = created.order_id;

    let view: OrderView = authed(client.get(format!("{}/orders/{}", server.addr, id)), user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view.status, OrderStatus::Created);
    assert_eq!(view.total_price, Decimal::new(200, 0));
    assert_eq!(view.currency, "RUB");
    assert_eq!(view.restaurant_id, server.restaurant_id);
    assert_eq!(view.user_id, Some(user));

    let mine: Vec<OrderView> = authed(client.get(format!("{}/orders", server.addr)), user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].order_id, id);

    // the owner is not staff
    let res = authed(
        client.patch(format!("{}/orders/{}/status", server.addr, id)),
        user,
    )
    .json(&UpdateStatusRequest {
        status: OrderStatus::Preparing,
    })
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::FORBIDDEN);

    let res = staff(client.patch(format!("{}/orders/{}/status", server.addr, id)))
        .json(&UpdateStatusRequest {
            status: OrderStatus::Preparing,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let updated: OrderView = res.json().await.unwrap();
    assert_eq!(updated.status, OrderStatus::Preparing);

    let listing = format!(
        "{}/restaurants/{}/orders?status=preparing",
        server.addr, server.restaurant_id
    );
    let res = client.get(&listing).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);
    let res = authed(client.get(&listing), user).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::FORBIDDEN);

    let preparing: Vec<OrderView> = staff(client.get(&listing))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(preparing.len(), 1);

    let res = authed(
        client.delete(format!("{}/orders/{}/progression", server.addr, id)),
        user,
    )
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn error_table_over_http() {
    let server = start_server().await;
    let client = reqwest::Client::new();
    let owner = Uuid::new_v4();

    // no identity
    let res = client
        .post(format!("{}/orders", server.addr))
        .json(&order_body(DeliveryType::Pickup, None))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(error_of(res).await.error, "Unauthorized");

    // delivery without address
    let res = authed(client.post(format!("{}/orders", server.addr)), owner)
        .json(&order_body(DeliveryType::Delivery, None))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await.error, "InvariantViolationError");

    // malformed body
    let res = authed(client.post(format!("{}/orders", server.addr)), owner)
        .header("content-type", "application/json")
        .body("{\"items\": 5}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await.error, "BadRequest");

    let created: CreateOrderResponse = authed(client.post(format!("{}/orders", server.addr)), owner)
        .json(&order_body(DeliveryType::Pickup, None))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created.order_id;

    // someone else's order
    let res = authed(
        client.get(format!("{}/orders/{}", server.addr, id)),
        Uuid::new_v4(),
    )
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(error_of(res).await.error, "Forbidden");

    // skipping a step
    let res = staff(client.patch(format!("{}/orders/{}/status", server.addr, id)))
        .json(&UpdateStatusRequest {
            status: OrderStatus::Delivered,
        })
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    let body = error_of(res).await;
    assert_eq!(body.error, "InvariantViolationError");
    assert!(body.detail.contains("Invalid status transition"));

    let res = authed(
        client.get(format!("{}/orders/{}", server.addr, Uuid::new_v4())),
        owner,
    )
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(error_of(res).await.error, "NotFoundError");

    let res = authed(client.get(format!("{}/orders/not-a-uuid", server.addr)), owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await.error, "BadRequest");

    let res = staff(client.get(format!(
        "{}/restaurants/{}/orders?status=cooking",
        server.addr, server.restaurant_id
    )))
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
}
