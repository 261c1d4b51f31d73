//! Registration and admission tests

mod helpers;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use futures::future::join_all;
use gymbooking::database::EngineStore;
use gymbooking::models::{ParticipationStatus, PaymentStatus, RefundPolicy};
use gymbooking::EngineError;
use helpers::*;

#[tokio::test]
async fn test_capacity_one_race_admits_exactly_one() {
    let ctx = TestContext::new();
    let event = ctx.free_event(1).await;

    let first = ctx.service.clone();
    let second = ctx.service.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.register_participant(event.id, 1).await }),
        tokio::spawn(async move { second.register_participant(event.id, 2).await }),
    );
    let a = a.unwrap().unwrap();
    let b = b.unwrap().unwrap();

    let mut statuses = vec![a.status, b.status];
    statuses.sort_by_key(|s| s.to_string());
    assert_eq!(statuses, vec![ParticipationStatus::Registered, ParticipationStatus::WaitingList]);
    assert_eq!(ctx.store.count_registered(event.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_never_exceed_capacity() {
    let ctx = TestContext::new();
    let event = ctx.free_event(5).await;

    let handles: Vec<_> = (1..=40)
        .map(|member_id| {
            let service = ctx.service.clone();
            tokio::spawn(async move { service.register_participant(event.id, member_id).await })
        })
        .collect();

    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap().unwrap()).collect();
    let registered = results.iter().filter(|p| p.status == ParticipationStatus::Registered).count();
    let waiting = results.iter().filter(|p| p.status == ParticipationStatus::WaitingList).count();

    assert_eq!(registered, 5);
    assert_eq!(waiting, 35);
    assert_eq!(ctx.store.count_registered(event.id).await.unwrap(), 5);
}

#[tokio::test]
async fn test_paid_event_admission_waits_for_payment() {
    let ctx = TestContext::new();
    let event = ctx.paid_event(2, RefundPolicy::FullRefund, 24).await;

    let participation = ctx.register(event.id, 10).await;
    assert_eq!(participation.status, ParticipationStatus::PendingPayment);
    assert_eq!(participation.payment_status, Some(PaymentStatus::Pending));
    assert_eq!(participation.tenant_id, GYM_ID);
    assert_eq!(ctx.store.count_registered(event.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_free_event_with_seat_registers_directly() {
    let ctx = TestContext::new();
    let event = ctx.free_event(3).await;

    let participation = ctx.register(event.id, 10).await;
    assert_eq!(participation.status, ParticipationStatus::Registered);
    assert!(participation.payment_status.is_none());
    assert!(ctx.cache.invalidated.lock().unwrap().contains(&event.id));
}

#[tokio::test]
async fn test_unlimited_event_never_waitlists() {
    let ctx = TestContext::new();
    let event = ctx.free_event(0).await;

    for member_id in 1..=25 {
        let participation = ctx.register(event.id, member_id).await;
        assert_eq!(participation.status, ParticipationStatus::Registered);
    }
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let ctx = TestContext::new();
    let event = ctx.free_event(3).await;
    ctx.register(event.id, 10).await;

    let result = ctx.service.register_participant(event.id, 10).await;
    assert_matches!(result, Err(EngineError::AlreadyRegistered { member_id: 10, .. }));
}

#[tokio::test]
async fn test_unknown_event_rejected() {
    let ctx = TestContext::new();
    let result = ctx.service.register_participant(404, 10).await;
    assert_matches!(result, Err(EngineError::EventNotFound { event_id: 404 }));
}

#[tokio::test]
async fn test_started_event_is_closed() {
    let ctx = TestContext::new();
    let mut request = free_event_request(5);
    request.start_time = Utc::now() - Duration::minutes(5);
    let event = ctx.service.create_event(&request).await.unwrap();

    let result = ctx.service.register_participant(event.id, 10).await;
    assert_matches!(result, Err(EngineError::EventNotOpen { .. }));
}

#[tokio::test]
async fn test_reregistration_reactivates_same_row() {
    let ctx = TestContext::new();
    let event = ctx.free_event(3).await;
    let first = ctx.register(event.id, 10).await;

    let cancelled = ctx.service.cancel_participation(10, event.id).await.unwrap();
    assert_eq!(cancelled.status, ParticipationStatus::Cancelled);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let again = ctx.register(event.id, 10).await;
    assert_eq!(again.id, first.id);
    assert_eq!(again.status, ParticipationStatus::Registered);
    assert!(again.registered_at > first.registered_at);
    assert_eq!(ctx.store.participations_for(event.id).await.len(), 1);
}

#[tokio::test]
async fn test_create_event_enforces_monetization_fields() {
    let ctx = TestContext::new();

    let mut free_with_price = free_event_request(5);
    free_with_price.price_cents = Some(1000);
    assert_matches!(ctx.service.create_event(&free_with_price).await, Err(EngineError::InvalidInput(_)));

    let mut paid_without_policy = paid_event_request(5, RefundPolicy::FullRefund, 24);
    paid_without_policy.refund_policy = None;
    assert_matches!(ctx.service.create_event(&paid_without_policy).await, Err(EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn test_completion_attempt_closes_started_event() {
    let ctx = TestContext::new();
    let event = ctx.free_event(5).await;

    let untouched = ctx.service.record_completion_attempt(event.id, Utc::now()).await.unwrap();
    assert_eq!(untouched.completion_attempts, 1);

    let completed = ctx
        .service
        .record_completion_attempt(event.id, event.start_time + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(completed.completion_attempts, 2);
    assert_eq!(completed.status, gymbooking::models::EventStatus::Completed);

    let result = ctx.service.register_participant(event.id, 10).await;
    assert_matches!(result, Err(EngineError::EventNotOpen { .. }));
}
