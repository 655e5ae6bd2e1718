//! Concurrency behavior of loan submission and booking submission.
//!
//! These tests race real service calls against the in-memory store, whose
//! single write lock gives every repository mutation the same
//! all-or-nothing shape as a database transaction.

use chrono::{Duration, NaiveTime};
use sarpras_core::clock::{Clock, ManualClock};
use sarpras_core::db::mocks::MockStore;
use sarpras_core::error::ServiceError;
use sarpras_core::identity::{Account, Role};
use sarpras_core::models::{Item, LoanRequestLine, Room};
use sarpras_core::{BookingRequest, BookingService, CacheRegistry, LoanRequest, LoanService};
use std::sync::Arc;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[tokio::test]
async fn concurrent_submissions_cannot_overdraw_stock() {
    let clock = Arc::new(ManualClock::at_system_time());
    let now = clock.now();
    let store = Arc::new(MockStore::new());
    let registry = Arc::new(CacheRegistry::new(clock.clone()));

    let item = Item::new("Proyektor", "PRJ-1", 2, now);
    store.insert_item(item.clone()).await;
    let first = Account::new("First", Role::Borrower, now);
    let second = Account::new("Second", Role::Borrower, now);
    store.insert_account(first.clone()).await;
    store.insert_account(second.clone()).await;

    let service = Arc::new(LoanService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry,
        clock.clone(),
    ));
    let date = (now + Duration::days(1)).date_naive();

    let mut handles = Vec::new();
    for borrower in [first.id, second.id] {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .submit(LoanRequest {
                    borrower_id: borrower,
                    request_date: date,
                    return_date: None,
                    purpose: None,
                    lines: vec![LoanRequestLine {
                        item_id: item.id,
                        quantity: Some(2),
                    }],
                })
                .await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ServiceError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // Exactly one request got the last two units.
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    let stored = store.item_snapshot(item.id).await.unwrap();
    assert_eq!(stored.total_quantity, 0);
}

#[tokio::test]
async fn concurrent_bookings_for_one_window_admit_one() {
    let clock = Arc::new(ManualClock::at_system_time());
    let now = clock.now();
    let store = Arc::new(MockStore::new());
    let registry = Arc::new(CacheRegistry::new(clock.clone()));

    let room = Room::new("Aula", "AULA-1", 100, now);
    store.insert_room(room.clone()).await;
    let first = Account::new("First", Role::Borrower, now);
    let second = Account::new("Second", Role::Borrower, now);
    store.insert_account(first.clone()).await;
    store.insert_account(second.clone()).await;

    let service = Arc::new(BookingService::new(
        store.clone(),
        store.clone(),
        registry,
        clock.clone(),
    ));
    let date = (now + Duration::days(2)).date_naive();

    let mut handles = Vec::new();
    for requester in [first.id, second.id] {
        let service = service.clone();
        let room_id = room.id;
        handles.push(tokio::spawn(async move {
            service
                .submit(BookingRequest {
                    room_id,
                    requester_id: requester,
                    date,
                    start_time: t(9, 0),
                    end_time: t(11, 0),
                    activity: "seminar".to_string(),
                })
                .await
        }));
    }

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(ServiceError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
}

#[tokio::test]
async fn duplicate_active_loan_blocks_second_request() {
    let clock = Arc::new(ManualClock::at_system_time());
    let now = clock.now();
    let store = Arc::new(MockStore::new());
    let registry = Arc::new(CacheRegistry::new(clock.clone()));

    let item = Item::new("Mixer", "MIX-1", 10, now);
    store.insert_item(item.clone()).await;
    let borrower = Account::new("Borrower", Role::Borrower, now);
    store.insert_account(borrower.clone()).await;

    let service = LoanService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        registry,
        clock.clone(),
    );
    let date = (now + Duration::days(1)).date_naive();
    let request = || LoanRequest {
        borrower_id: borrower.id,
        request_date: date,
        return_date: None,
        purpose: None,
        lines: vec![LoanRequestLine {
            item_id: item.id,
            quantity: Some(1),
        }],
    };

    service.submit(request()).await.unwrap();
    let err = service.submit(request()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // Stock was reserved once, not twice.
    let stored = store.item_snapshot(item.id).await.unwrap();
    assert_eq!(stored.total_quantity, 9);
}
