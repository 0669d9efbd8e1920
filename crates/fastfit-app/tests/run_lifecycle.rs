use std::sync::Arc;
use std::time::Duration;

use fastfit_hex::application::order_service::OrderService;
use fastfit_hex::application::status_scheduler::SchedulerConfig;
use fastfit_hex::inbound::http::HttpServerConfig;
use fastfit_repo::memory::InMemoryRepo;
use fastfit_types::ports::clock::{SystemClock, UuidV4Generator};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn service() -> Arc<OrderService<InMemoryRepo>> {
    Arc::new(OrderService::new(
        Arc::new(InMemoryRepo::new()),
        Arc::new(SystemClock),
        Arc::new(UuidV4Generator),
        SchedulerConfig::default(),
    ))
}

fn server_cfg(port: u16) -> HttpServerConfig {
    HttpServerConfig {
        port: port.to_string(),
        default_restaurant_id: Uuid::new_v4(),
        default_currency: "RUB".into(),
    }
}

#[tokio::test]
async fn occupied_port_fails_fast_and_stops_the_scheduler() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let shutdown = CancellationToken::new();

    let res = tokio::time::timeout(
        Duration::from_secs(5),
        fastfit_app::run(service(), server_cfg(port), shutdown.clone()),
    )
    .await
    .expect("run must not hang when the server cannot bind");

    let err = res.unwrap_err();
    assert!(err.to_string().contains("failed to bind"), "{err:#}");
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn cancelling_shutdown_stops_cleanly() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(fastfit_app::run(service(), server_cfg(port), shutdown.clone()));

    let health = format!("http://127.0.0.1:{port}/health");
    let mut up = false;
    for _ in 0..50 {
        if reqwest::get(&health).await.is_ok() {
            up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(up, "server never answered /health");

    shutdown.cancel();
    let res = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run must stop after cancellation")
        .unwrap();
    assert!(res.is_ok(), "{res:?}");
}
