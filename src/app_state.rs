use crate::{
    config::Config,
    services::{
        AuthService, JWTService, LedgerService, RazorpayGateway, ResumeService, StripeGateway,
        SubscriptionService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: Arc<redis::Client>,
    pub jwt_service: Arc<JWTService>,
    pub auth_service: Arc<AuthService>,
    pub ledger: Arc<LedgerService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub stripe: Arc<StripeGateway>,
    pub razorpay: Arc<RazorpayGateway>,
    pub resumes: Arc<ResumeService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        // Connect to database
        let db = sea_orm::Database::connect(&config.database.url).await?;

        // Connect to Redis
        let redis = Arc::new(redis::Client::open(config.redis.url.as_str())?);

        // Initialize services; the payment gateways take their (optional)
        // provider sections explicitly and fail closed when absent
        let jwt_service = Arc::new(JWTService::new(Arc::new(config.auth.clone())));
        let auth_service = Arc::new(AuthService::new(
            db.clone(),
            jwt_service.clone(),
            &config.application,
        ));
        let ledger = Arc::new(LedgerService::new(db.clone()));
        let subscriptions = Arc::new(SubscriptionService::new(db.clone()));
        let stripe = Arc::new(StripeGateway::new(config.billing.stripe.clone()));
        let razorpay = Arc::new(RazorpayGateway::new(config.billing.razorpay.clone()));
        let resumes = Arc::new(ResumeService::new(db.clone()));

        Ok(Self {
            db,
            redis,
            jwt_service,
            auth_service,
            ledger,
            subscriptions,
            stripe,
            razorpay,
            resumes,
            config: Arc::new(config),
        })
    }
}
