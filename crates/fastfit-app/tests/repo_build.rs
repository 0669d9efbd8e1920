#![cfg(feature = "sqlite")]

use chrono::Utc;
use fastfit_repo::{build_repo, Repo};
use fastfit_types::domain::money::{Money, Quantity};
use fastfit_types::domain::order::{DeliveryType, Order, OrderItem, OrderStatus, PhoneNumber};
use fastfit_types::domain::progression::{initial_step, StatusJob};
use fastfit_types::ports::order_read::OrderReadRepository;
use fastfit_types::ports::order_repository::{OrderRepository, Transaction, TransactionManager};
use fastfit_types::ports::status_jobs::StatusJobStore;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn builds_sqlite_repo_and_keeps_jobs_across_reopen() {
    // Use a temp DB path for isolation.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("fastfit-test.db");
    let url = format!("sqlite://{}", db_path.display());

    let repo: Repo = build_repo(Some(&url)).await.expect("build repo");
    assert!(repo
        .list_by_restaurant(Uuid::new_v4(), None)
        .await
        .expect("list")
        .is_empty());

    let order = Order::create(
        Uuid::new_v4(),
        None,
        PhoneNumber::new("+79990000000").unwrap(),
        vec![OrderItem::new(
            Uuid::new_v4(),
            Quantity::new(1).unwrap(),
            Money::new(Decimal::new(350, 0), "RUB").unwrap(),
        )],
        DeliveryType::Pickup,
        None,
        Uuid::new_v4(),
        Utc::now(),
    )
    .unwrap();
    let job = StatusJob::new(order.order_id(), initial_step(), Utc::now());

    let mut tx = repo.begin().await.unwrap();
    repo.add(&mut tx, &order).await.unwrap();
    repo.put_job(&mut tx, &job).await.unwrap();
    tx.commit().await.unwrap();
    drop(repo);

    // a restarted process picks the pending chain up again
    let reopened: Repo = build_repo(Some(&url)).await.expect("reopen repo");
    let due = reopened
        .due_jobs(Utc::now() + chrono::Duration::seconds(1), 10)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].target_status, OrderStatus::Preparing);
    assert!(reopened.find_view(order.order_id()).await.unwrap().is_some());
}
