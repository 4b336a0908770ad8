use entity::sea_orm_active_enums::{
    PaymentProvider, SubscriptionPlan, SubscriptionStatus, TransactionStatus,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// Plans
// ============================================================================

/// A purchasable plan. `free` is not purchasable, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Monthly,
    Yearly,
}

impl PlanId {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "yearly" => Some(Self::Yearly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    pub fn as_subscription_plan(&self) -> SubscriptionPlan {
        match self {
            Self::Monthly => SubscriptionPlan::Monthly,
            Self::Yearly => SubscriptionPlan::Yearly,
        }
    }

    /// Billing period length, used when the provider gives us no
    /// server-confirmed renewal date.
    pub fn period_days(&self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }
}

// ============================================================================
// Canonical payment facts
// ============================================================================

/// Provider-neutral "a payment went through" fact. Both payment flows reduce
/// their provider-native payloads to this before anything is persisted, which
/// keeps the subscription state machine free of provider branching.
#[derive(Debug, Clone)]
pub struct PaymentConfirmed {
    pub user_id: Uuid,
    pub provider: PaymentProvider,
    pub plan: PlanId,
    /// Provider-issued payment reference; idempotency key together with
    /// `provider`
    pub payment_id: String,
    pub order_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// When the paid period lapses. Provider-confirmed for the webhook flow,
    /// locally projected for the client-confirmed flow.
    pub period_end: Option<OffsetDateTime>,
}

/// Provider pushed a status change for an existing recurring agreement.
/// Carries no user identity; accounts are matched by the subscription handle.
#[derive(Debug, Clone)]
pub struct SubscriptionChanged {
    pub subscription_id: String,
    pub provider_status: String,
    pub period_end: Option<OffsetDateTime>,
}

/// Provider reports the recurring agreement is gone.
#[derive(Debug, Clone)]
pub struct SubscriptionClosed {
    pub subscription_id: String,
}

// ============================================================================
// Request Models
// ============================================================================

/// Request body for creating a checkout session (webhook-flow provider)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    #[validate(length(min = 1, max = 20))]
    pub plan_id: String,
}

/// Request body for creating a payment order (client-confirmed provider)
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[validate(length(min = 1, max = 20))]
    pub plan_id: String,
}

/// Request body for the client-submitted payment proof
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub order_ref: String,
    #[validate(length(min = 1, max = 100))]
    pub payment_ref: String,
    #[validate(length(min = 1, max = 200))]
    pub signature: String,
    #[validate(length(min = 1, max = 20))]
    pub plan_id: String,
}

// ============================================================================
// Response Models
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    /// Public key id the client needs to open the provider's checkout widget
    pub key_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
}

/// Acknowledgment body for webhook deliveries
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
}

/// One ledger entry in the payment history
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: PaymentProvider,
    pub payment_id: String,
    pub order_id: Option<String>,
    pub status: TransactionStatus,
    pub plan: SubscriptionPlan,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<entity::transactions::Model> for TransactionResponse {
    fn from(txn: entity::transactions::Model) -> Self {
        Self {
            id: txn.id,
            amount_minor: txn.amount_minor,
            currency: txn.currency,
            provider: txn.provider,
            payment_id: txn.payment_id,
            order_id: txn.order_id,
            status: txn.status,
            plan: txn.plan,
            created_at: txn.created_at,
        }
    }
}

/// Current subscription state plus the derived entitlement flag
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub status: SubscriptionStatus,
    pub plan: SubscriptionPlan,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    pub entitled: bool,
}
