use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::UserIdentity,
    models::{
        billing::{
            CheckoutSessionRequest, CheckoutSessionResponse, OrderRequest, OrderResponse,
            PaymentConfirmed, PlanId, SubscriptionChanged, SubscriptionClosed,
            SubscriptionResponse, TransactionResponse, VerifyPaymentRequest,
            VerifyPaymentResponse, WebhookAck,
        },
        common::MessageResponse,
    },
    services::{
        stripe_gateway::{CheckoutSession, WebhookEvent},
        subscription_service::{is_entitled, projected_period_end},
    },
};
use entity::sea_orm_active_enums::PaymentProvider;

fn parse_plan(plan_id: &str) -> Result<PlanId> {
    PlanId::from_str(plan_id).ok_or_else(|| ApiError::BadRequest("Invalid plan selected".to_string()))
}

/// POST /api/v1/billing/checkout-session
///
/// Start a hosted checkout with the webhook-flow provider. Creates the
/// provider customer on first use and stores its handle so later webhook
/// events can be tied back to the account.
#[instrument(skip(state, request))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    identity: UserIdentity,
    Json(request): Json<CheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;
    let plan = parse_plan(&request.plan_id)?;

    let user = state.auth_service.find_by_id(identity.user_id).await?;

    let customer_id = match user.provider_customer_id {
        Some(customer_id) => customer_id,
        None => {
            let customer_id = state
                .stripe
                .create_customer(&user.email, &user.name, user.id)
                .await?;
            state
                .subscriptions
                .store_customer_id(user.id, &customer_id)
                .await?;
            customer_id
        }
    };

    let session = state
        .stripe
        .create_checkout_session(
            &customer_id,
            plan,
            user.id,
            &state.config.application.client_url,
        )
        .await?;

    let redirect_url = session.url.ok_or_else(|| {
        ApiError::Upstream("Checkout session came back without a redirect URL".to_string())
    })?;

    Ok(Json(CheckoutSessionResponse {
        session_id: session.id,
        redirect_url,
    }))
}

/// POST /api/v1/billing/webhook
///
/// Inbound deliveries from the webhook-flow provider. The signature is
/// checked against the raw body before anything is parsed; ledger and state
/// work then runs on a spawned task so the provider gets its acknowledgment
/// inside the redelivery window.
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature_header = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::SignatureVerification("Missing Stripe-Signature header".to_string())
        })?;

    let event = state.stripe.decode_webhook(&body, signature_header)?;

    tokio::spawn(async move {
        if let Err(e) = process_stripe_event(state, event).await {
            error!("Failed to process webhook event: {}", e);
        }
    });

    Ok(Json(WebhookAck { received: true }))
}

/// Apply one verified webhook event: ledger first, then the state machine.
async fn process_stripe_event(state: AppState, event: WebhookEvent) -> Result<()> {
    match event {
        WebhookEvent::CheckoutCompleted(session) => {
            apply_checkout_completed(&state, session).await
        }
        WebhookEvent::SubscriptionUpdated(subscription) => {
            let changed = SubscriptionChanged {
                period_end: subscription.period_end(),
                subscription_id: subscription.id,
                provider_status: subscription.status,
            };
            state.subscriptions.apply_subscription_updated(&changed).await
        }
        WebhookEvent::SubscriptionDeleted(subscription) => {
            let closed = SubscriptionClosed {
                subscription_id: subscription.id,
            };
            state.subscriptions.apply_subscription_deleted(&closed).await
        }
        WebhookEvent::Ignored(event_type) => {
            debug!("Unhandled event type {}", event_type);
            Ok(())
        }
    }
}

async fn apply_checkout_completed(state: &AppState, session: CheckoutSession) -> Result<()> {
    // The session metadata was stamped at session creation; a session
    // without it cannot be matched to an account and is dropped with a log
    let Some(user_id) = session
        .metadata
        .get("userId")
        .and_then(|v| Uuid::parse_str(v).ok())
    else {
        warn!("Checkout session {} has no usable userId metadata", session.id);
        return Ok(());
    };
    let Some(plan) = session.metadata.get("planId").and_then(|v| PlanId::from_str(v)) else {
        warn!("Checkout session {} has no usable planId metadata", session.id);
        return Ok(());
    };

    // The completed-checkout event does not carry the period end; fetch the
    // recurring agreement for it
    let period_end = match &session.subscription {
        Some(subscription_id) => state
            .stripe
            .retrieve_subscription(subscription_id)
            .await?
            .period_end(),
        None => None,
    };

    let fact = PaymentConfirmed {
        user_id,
        provider: PaymentProvider::Stripe,
        plan,
        payment_id: session.id.clone(),
        order_id: None,
        amount_minor: session.amount_total.unwrap_or(0),
        currency: session
            .currency
            .as_deref()
            .unwrap_or("usd")
            .to_uppercase(),
        customer_id: session.customer.clone(),
        subscription_id: session.subscription.clone(),
        period_end,
    };

    match state.ledger.record((&fact).into()).await {
        Ok(_) => {}
        Err(ApiError::DuplicatePayment(msg)) => {
            // At-least-once delivery; the first copy already did the work
            info!("Ignoring redelivered payment event: {}", msg);
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    state.subscriptions.apply_checkout_completed(&fact).await
}

/// POST /api/v1/billing/order
///
/// Create an order with the client-confirmed provider for the checkout
/// widget to pay against.
#[instrument(skip(state, request))]
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<OrderRequest>,
) -> Result<Json<OrderResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;
    let plan = parse_plan(&request.plan_id)?;

    let order = state.razorpay.create_order(plan).await?;

    Ok(Json(OrderResponse {
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        key_id: state.razorpay.key_id()?,
    }))
}

/// POST /api/v1/billing/verify-payment
///
/// The client-confirmed flow: check the submitted payment proof, record the
/// payment, activate the subscription. The period end is a local projection
/// because this provider pushes no renewal events.
#[instrument(skip(state, request))]
pub async fn verify_payment(
    State(state): State<AppState>,
    identity: UserIdentity,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;
    let plan = parse_plan(&request.plan_id)?;

    // Authenticity first; nothing below runs on a bad signature
    state.razorpay.verify_payment_signature(
        &request.order_ref,
        &request.payment_ref,
        &request.signature,
    )?;

    let now = OffsetDateTime::now_utc();
    let (amount_minor, currency) = state.razorpay.plan_amount(plan)?;

    let fact = PaymentConfirmed {
        user_id: identity.user_id,
        provider: PaymentProvider::Razorpay,
        plan,
        payment_id: request.payment_ref.clone(),
        order_id: Some(request.order_ref.clone()),
        amount_minor,
        currency,
        customer_id: None,
        subscription_id: None,
        period_end: Some(projected_period_end(plan, now)),
    };

    match state.ledger.record((&fact).into()).await {
        Ok(_) => {}
        Err(ApiError::DuplicatePayment(msg)) => {
            // A resubmitted proof for a payment that already went through;
            // re-applying the same state below is a no-op
            info!("Ignoring resubmitted payment proof: {}", msg);
        }
        Err(e) => return Err(e),
    }

    state
        .subscriptions
        .apply_client_confirmed(identity.user_id, plan, now)
        .await?;

    Ok(Json(VerifyPaymentResponse { success: true }))
}

/// GET /api/v1/billing/history
#[instrument(skip(state))]
pub async fn payment_history(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<Vec<TransactionResponse>>> {
    let transactions = state.ledger.list_for_user(identity.user_id).await?;

    Ok(Json(
        transactions.into_iter().map(TransactionResponse::from).collect(),
    ))
}

/// GET /api/v1/billing/subscription
///
/// Read-only projection of the caller's subscription state; the `entitled`
/// flag is the single source of truth for paid-feature gating.
#[instrument(skip(state))]
pub async fn subscription_status(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<SubscriptionResponse>> {
    let user = state.auth_service.find_by_id(identity.user_id).await?;
    let now = OffsetDateTime::now_utc();

    Ok(Json(SubscriptionResponse {
        entitled: is_entitled(user.subscription_status, user.current_period_end, now),
        status: user.subscription_status,
        plan: user.subscription_plan,
        current_period_end: user.current_period_end,
    }))
}

/// POST /api/v1/billing/cancel
///
/// Cancel at period end. Only subscriptions held at the webhook-flow
/// provider carry a recurring agreement to cancel; everything else is a 400.
#[instrument(skip(state))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<MessageResponse>> {
    let user = state.auth_service.find_by_id(identity.user_id).await?;

    let subscription_id = user.provider_subscription_id.ok_or_else(|| {
        ApiError::BadRequest("No active subscription found".to_string())
    })?;

    state.stripe.cancel_at_period_end(&subscription_id).await?;
    state.subscriptions.mark_cancel_requested(user.id).await?;

    Ok(Json(MessageResponse::new(
        "Subscription will be canceled at the end of the current billing period",
    )))
}
