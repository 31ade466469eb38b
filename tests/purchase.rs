pub mod common;

use ticket_office::{booking::PurchaseError, db::event::Status};

#[tokio::test]
async fn records_ticket_and_decrements_stock() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 5)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let ticket = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 10, 2))
        .await
        .unwrap();

    assert_eq!(ticket.user_id, 1.into());
    assert_eq!(ticket.event_id, 1.into());
    assert_eq!(ticket.event_title, "Rock Concert");
    assert_eq!(ticket.date, "2026-07-15");
    assert_eq!(ticket.price, 25.0);
    assert_eq!(ticket.quantity, 2);

    let state = store.ticket_type_state(1, 10).await.unwrap();
    assert_eq!(state, (Status::Available, 3));
    assert_eq!(store.tickets().await.len(), 1);
}

#[tokio::test]
async fn buying_out_remaining_stock_sells_out() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 10)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let ticket = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 10, 10))
        .await
        .unwrap();
    assert_eq!(ticket.quantity, 10);

    let state = store.ticket_type_state(1, 10).await.unwrap();
    assert_eq!(state, (Status::SoldOut, 0));
    assert_eq!(store.tickets().await.len(), 1);
}

#[tokio::test]
async fn unknown_ticket_type_is_rejected_without_mutation() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 5)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let err = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 99, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::NotFound));

    let state = store.ticket_type_state(1, 10).await.unwrap();
    assert_eq!(state, (Status::Available, 5));
    assert!(store.tickets().await.is_empty());
}

#[tokio::test]
async fn unknown_event_is_rejected() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 5)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let err = orchestrator
        .purchase(&common::identity(1), common::request(1, 7, 10, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::NotFound));
    assert!(store.tickets().await.is_empty());
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 5)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let err = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 10, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::InvalidQuantity));

    let state = store.ticket_type_state(1, 10).await.unwrap();
    assert_eq!(state, (Status::Available, 5));
}

#[tokio::test]
async fn mismatched_user_is_unauthorized() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 5)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let err = orchestrator
        .purchase(&common::identity(2), common::request(1, 1, 10, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::Unauthorized));

    let state = store.ticket_type_state(1, 10).await.unwrap();
    assert_eq!(state, (Status::Available, 5));
    assert!(store.tickets().await.is_empty());
}

#[tokio::test]
async fn sold_out_type_rejects_purchases() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 0)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let err = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 10, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::SoldOut));
}

#[tokio::test]
async fn requesting_more_than_remaining_is_rejected_without_mutation() {
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![common::ticket_type(10, 25.0, 3)],
    )]);
    let orchestrator = common::orchestrator(&store);

    let err = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 10, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, PurchaseError::InsufficientStock));

    let state = store.ticket_type_state(1, 10).await.unwrap();
    assert_eq!(state, (Status::Available, 3));
    assert!(store.tickets().await.is_empty());
}

#[tokio::test]
async fn ticket_types_are_addressed_by_id_not_position() {
    // Two types whose ids do not match their positions in the list.
    let store = common::InMemoryStore::new(vec![common::event(
        1,
        vec![
            common::ticket_type(7, 50.0, 5),
            common::ticket_type(3, 20.0, 5),
        ],
    )]);
    let orchestrator = common::orchestrator(&store);

    let ticket = orchestrator
        .purchase(&common::identity(1), common::request(1, 1, 3, 1))
        .await
        .unwrap();
    assert_eq!(ticket.price, 20.0);

    assert_eq!(
        store.ticket_type_state(1, 3).await.unwrap(),
        (Status::Available, 4),
    );
    assert_eq!(
        store.ticket_type_state(1, 7).await.unwrap(),
        (Status::Available, 5),
    );
}
