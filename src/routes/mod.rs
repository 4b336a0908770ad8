// Route modules
pub mod auth;
pub mod billing;
pub mod resume;

use crate::{
    app_state::AppState,
    middleware::{create_rate_limiter, jwt_auth_middleware, logging_middleware},
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes(state: AppState) -> Router<AppState> {
    // Billing mutations hit the payment providers; these sit behind both
    // authentication and rate limiting
    let rate_limiter = create_rate_limiter(state.redis.clone());
    let billing_mutation_routes = Router::new()
        .route("/billing/checkout-session", post(billing::create_checkout_session))
        .route("/billing/order", post(billing::create_order))
        .route("/billing/verify-payment", post(billing::verify_payment))
        .route_layer(middleware::from_fn(rate_limiter))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Auth-only routes (no rate limiting, require JWT)
    let auth_only_routes = Router::new()
        .route("/billing/history", get(billing::payment_history))
        .route("/billing/subscription", get(billing::subscription_status))
        .route("/billing/cancel", post(billing::cancel_subscription))
        .route("/auth/me", get(auth::get_me))
        .route("/resume", get(resume::get_resume))
        .route(
            "/resume/{kind}",
            get(resume::get_section)
                .put(resume::upsert_section)
                .delete(resume::delete_section),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_middleware,
        ));

    // Public routes: signup/signin carry their own credentials, the webhook
    // is authenticated by the provider signature over the raw body
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/signin", post(auth::signin))
        .route("/billing/webhook", post(billing::stripe_webhook));

    // Combine all routes with request logging
    Router::new()
        .merge(billing_mutation_routes)
        .merge(auth_only_routes)
        .merge(public_routes)
        .layer(middleware::from_fn(logging_middleware))
}
