// Service modules
pub mod auth_service;
pub mod jwt_service;
pub mod ledger_service;
pub mod razorpay_gateway;
pub mod resume_service;
pub mod signature;
pub mod stripe_gateway;
pub mod subscription_service;

pub use auth_service::AuthService;
pub use jwt_service::JWTService;
pub use ledger_service::LedgerService;
pub use razorpay_gateway::RazorpayGateway;
pub use resume_service::ResumeService;
pub use stripe_gateway::StripeGateway;
pub use subscription_service::SubscriptionService;
