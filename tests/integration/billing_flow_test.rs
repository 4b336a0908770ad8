//! Subscription state machine behavior against a real database.
//!
//! Covers the reconciliation properties that matter: redelivered payment
//! facts leave state and ledger as if delivered once, webhook facts with no
//! matching account are silent no-ops, and cancellation keeps the grace
//! period intact.

use backfolio::error::ApiError;
use backfolio::models::billing::{
    PaymentConfirmed, PlanId, SubscriptionChanged, SubscriptionClosed,
};
use backfolio::services::ledger_service::LedgerService;
use backfolio::services::subscription_service::{is_entitled, SubscriptionService};
use entity::sea_orm_active_enums::{
    PaymentProvider, SubscriptionPlan, SubscriptionStatus, TransactionStatus,
};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::helpers::{create_test_user, reload_user, setup_test_db};

fn checkout_fact(user_id: Uuid, plan: PlanId) -> PaymentConfirmed {
    let suffix = Uuid::new_v4().simple().to_string();
    PaymentConfirmed {
        user_id,
        provider: PaymentProvider::Stripe,
        plan,
        payment_id: format!("cs_{}", suffix),
        order_id: None,
        amount_minor: 1000,
        currency: "USD".to_string(),
        customer_id: Some(format!("cus_{}", suffix)),
        subscription_id: Some(format!("sub_{}", suffix)),
        period_end: Some(OffsetDateTime::now_utc() + Duration::days(30)),
    }
}

/// Deliver a checkout-completed fact the way the webhook path does: ledger
/// first, duplicate treated as benign, state applied only for the winner.
async fn deliver_checkout(
    ledger: &LedgerService,
    subscriptions: &SubscriptionService,
    fact: &PaymentConfirmed,
) {
    match ledger.record(fact.into()).await {
        Ok(_) => subscriptions
            .apply_checkout_completed(fact)
            .await
            .expect("state transition failed"),
        Err(ApiError::DuplicatePayment(_)) => {}
        Err(e) => panic!("unexpected ledger error: {}", e),
    }
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_checkout_completed_activates_and_is_idempotent() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let ledger = LedgerService::new(db.clone());
    let subscriptions = SubscriptionService::new(db.clone());

    let fact = checkout_fact(user.id, PlanId::Monthly);

    // First delivery
    deliver_checkout(&ledger, &subscriptions, &fact).await;

    let after_first = reload_user(&db, user.id).await;
    assert_eq!(after_first.subscription_status, SubscriptionStatus::Active);
    assert_eq!(after_first.subscription_plan, SubscriptionPlan::Monthly);
    assert_eq!(after_first.provider_subscription_id, fact.subscription_id);
    assert_eq!(after_first.current_period_end, fact.period_end);

    // Redelivery of the identical event
    deliver_checkout(&ledger, &subscriptions, &fact).await;

    let after_second = reload_user(&db, user.id).await;
    let history = ledger.list_for_user(user.id).await.unwrap();

    // One ledger row, and state identical to a single delivery
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].provider, PaymentProvider::Stripe);
    assert_eq!(history[0].status, TransactionStatus::Completed);
    assert_eq!(after_second.subscription_status, after_first.subscription_status);
    assert_eq!(after_second.subscription_plan, after_first.subscription_plan);
    assert_eq!(after_second.current_period_end, after_first.current_period_end);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_subscription_updated_matches_by_provider_handle() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let ledger = LedgerService::new(db.clone());
    let subscriptions = SubscriptionService::new(db.clone());

    let fact = checkout_fact(user.id, PlanId::Monthly);
    deliver_checkout(&ledger, &subscriptions, &fact).await;
    let subscription_id = fact.subscription_id.clone().unwrap();

    // Provider reports a failed renewal: anything non-"active" parks the
    // account in past_due
    let new_end = OffsetDateTime::now_utc() + Duration::days(7);
    subscriptions
        .apply_subscription_updated(&SubscriptionChanged {
            subscription_id: subscription_id.clone(),
            provider_status: "past_due".to_string(),
            period_end: Some(new_end),
        })
        .await
        .unwrap();

    let lapsing = reload_user(&db, user.id).await;
    assert_eq!(lapsing.subscription_status, SubscriptionStatus::PastDue);

    // Payment recovered
    subscriptions
        .apply_subscription_updated(&SubscriptionChanged {
            subscription_id,
            provider_status: "active".to_string(),
            period_end: Some(new_end + Duration::days(30)),
        })
        .await
        .unwrap();

    let recovered = reload_user(&db, user.id).await;
    assert_eq!(recovered.subscription_status, SubscriptionStatus::Active);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_subscription_deleted_resets_to_baseline() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let ledger = LedgerService::new(db.clone());
    let subscriptions = SubscriptionService::new(db.clone());

    let fact = checkout_fact(user.id, PlanId::Yearly);
    deliver_checkout(&ledger, &subscriptions, &fact).await;

    subscriptions
        .apply_subscription_deleted(&SubscriptionClosed {
            subscription_id: fact.subscription_id.clone().unwrap(),
        })
        .await
        .unwrap();

    let reset = reload_user(&db, user.id).await;
    assert_eq!(reset.subscription_status, SubscriptionStatus::None);
    assert_eq!(reset.subscription_plan, SubscriptionPlan::Free);
    assert_eq!(reset.provider_subscription_id, None);
    assert_eq!(reset.current_period_end, None);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_subscription_events_for_unknown_handle_are_noops() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let subscriptions = SubscriptionService::new(db.clone());

    let unknown = format!("sub_missing_{}", Uuid::new_v4().simple());

    subscriptions
        .apply_subscription_updated(&SubscriptionChanged {
            subscription_id: unknown.clone(),
            provider_status: "past_due".to_string(),
            period_end: None,
        })
        .await
        .expect("unknown handle must not error");

    subscriptions
        .apply_subscription_deleted(&SubscriptionClosed {
            subscription_id: unknown,
        })
        .await
        .expect("unknown handle must not error");

    // Nothing about the unrelated account moved
    let untouched = reload_user(&db, user.id).await;
    assert_eq!(untouched.subscription_status, SubscriptionStatus::None);
    assert_eq!(untouched.subscription_plan, SubscriptionPlan::Free);
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_client_confirmed_projects_period_end_locally() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let subscriptions = SubscriptionService::new(db.clone());

    let now = OffsetDateTime::now_utc();
    subscriptions
        .apply_client_confirmed(user.id, PlanId::Monthly, now)
        .await
        .unwrap();

    let activated = reload_user(&db, user.id).await;
    assert_eq!(activated.subscription_status, SubscriptionStatus::Active);
    assert_eq!(activated.subscription_plan, SubscriptionPlan::Monthly);
    // No recurring agreement exists for this flow
    assert_eq!(activated.provider_subscription_id, None);

    let period_end = activated.current_period_end.expect("period end must be set");
    let expected = now + Duration::days(30);
    assert!((period_end - expected).abs() < Duration::seconds(1));
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_refund_correction_updates_ledger_status() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let ledger = LedgerService::new(db.clone());
    let subscriptions = SubscriptionService::new(db.clone());

    let fact = checkout_fact(user.id, PlanId::Monthly);
    deliver_checkout(&ledger, &subscriptions, &fact).await;

    let refunded = ledger
        .update_status(
            PaymentProvider::Stripe,
            &fact.payment_id,
            TransactionStatus::Refunded,
        )
        .await
        .unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);

    // Corrections require an existing key
    let missing = ledger
        .update_status(
            PaymentProvider::Stripe,
            "cs_does_not_exist",
            TransactionStatus::Refunded,
        )
        .await;
    assert!(matches!(missing, Err(ApiError::NotFound(_))));
}

#[tokio::test]
#[ignore] // Run only when database is available
async fn test_cancel_keeps_grace_period() {
    let db = setup_test_db().await;
    let user = create_test_user(&db).await;
    let ledger = LedgerService::new(db.clone());
    let subscriptions = SubscriptionService::new(db.clone());

    let fact = checkout_fact(user.id, PlanId::Monthly);
    deliver_checkout(&ledger, &subscriptions, &fact).await;

    subscriptions.mark_cancel_requested(user.id).await.unwrap();

    let canceled = reload_user(&db, user.id).await;
    assert_eq!(canceled.subscription_status, SubscriptionStatus::Canceled);
    // The paid period is untouched; entitlement holds until it lapses
    assert_eq!(canceled.current_period_end, fact.period_end);
    assert!(is_entitled(
        canceled.subscription_status,
        canceled.current_period_end,
        OffsetDateTime::now_utc()
    ));
}
