///  To run :
///  cargo r --example client_example
use std::sync::Arc;
use std::time::Duration;

use fastfit_client::{ApiError, CreateOrderRequest, OrderItemRequest, OrdersClient};
use fastfit_hex::application::order_service::OrderService;
use fastfit_hex::application::status_scheduler::SchedulerConfig;
use fastfit_hex::inbound::http::{HttpServer, HttpServerConfig};
use fastfit_repo::build_repo;
use fastfit_types::domain::order::{DeliveryType, OrderStatus};
use fastfit_types::ports::clock::{SystemClock, UuidV4Generator};
use rust_decimal::Decimal;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port = find_free_port();
    let addr = format!("http://127.0.0.1:{port}/");
    let restaurant_id = Uuid::new_v4();

    // Use a temp file-backed SQLite DB so multiple connections see the same data.
    let tmp = tempdir()?;
    let db_path = tmp.path().join("fastfit.db");
    let db_url = format!("sqlite://{}", db_path.display());

    // Compress the 15/15/60 unit chain into under two seconds.
    let scheduler_config = SchedulerConfig {
        time_unit: Duration::from_millis(20),
        poll_interval: Duration::from_millis(50),
        ..SchedulerConfig::default()
    };
    let repo = build_repo(Some(&db_url)).await?;
    let service = Arc::new(OrderService::new(
        Arc::new(repo),
        Arc::new(SystemClock),
        Arc::new(UuidV4Generator),
        scheduler_config,
    ));

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(service.scheduler().run(shutdown.clone()));
    let server = HttpServer::new(
        service,
        HttpServerConfig {
            port: port.to_string(),
            default_restaurant_id: restaurant_id,
            default_currency: "RUB".into(),
        },
    )
    .await?;
    let handle = tokio::spawn(server.run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let user = Uuid::new_v4();
    let client = OrdersClient::builder(&addr)?
        .with_identity(user, "+79990000000")?
        .with_timeout(Duration::from_secs(5))
        .build()?;

    let created = client
        .create_order(CreateOrderRequest {
            items: vec![OrderItemRequest {
                dish_id: Uuid::new_v4(),
                quantity: 2,
                price: Decimal::new(100, 0),
                currency: None,
            }],
            delivery_type: DeliveryType::Delivery,
            delivery_address: Some("Lenina 1".into()),
        })
        .await?;
    println!("Created order id={} ({})", created.order_id, created.message);

    let fetched = client.get_order(created.order_id).await?;
    println!(
        "Fetched status={} total={} {}",
        fetched.status, fetched.total_price, fetched.currency
    );

    // Watch the scheduler walk the order to Delivered.
    let mut last = fetched.status;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = client.get_order(created.order_id).await?.status;
        if status != last {
            println!("Status advanced to {status}");
            last = status;
        }
        if status == OrderStatus::Delivered {
            break;
        }
    }

    let staff = OrdersClient::builder(&addr)?
        .with_identity(Uuid::new_v4(), "+79990000001")?
        .with_role("staff")?
        .build()?;

    // A delivered order accepts no further transitions.
    match staff
        .update_status(created.order_id, OrderStatus::Preparing)
        .await
    {
        Ok(view) => println!("Unexpected update to {}", view.status),
        Err(err) => match err.downcast_ref::<ApiError>() {
            Some(api) => println!("Rejected: {} {}", api.error, api.detail),
            None => return Err(err),
        },
    }

    let restaurant_orders = staff
        .list_restaurant_orders(restaurant_id, Some(OrderStatus::Delivered))
        .await?;
    println!("Delivered orders for restaurant: {}", restaurant_orders.len());

    shutdown.cancel();
    handle.await??;
    worker.await?;
    Ok(())
}
