use crate::{
    config::RazorpayConfig,
    error::{ApiError, Result},
    models::billing::PlanId,
    services::signature,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

/// Adapter for the client-confirmed payment flow.
///
/// This provider pushes nothing to the server: the client opens the checkout
/// widget against an order created here, then submits the signed proof back
/// for verification. Configuration is explicit; without it every operation
/// fails closed with `NotConfigured`.
pub struct RazorpayGateway {
    config: Option<RazorpayConfig>,
    http_client: reqwest::Client,
}

/// Order descriptor as returned by the provider
#[derive(Debug, Deserialize)]
pub struct Order {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

impl RazorpayGateway {
    pub fn new(config: Option<RazorpayConfig>) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn config(&self) -> Result<&RazorpayConfig> {
        self.config
            .as_ref()
            .ok_or(ApiError::NotConfigured("Razorpay"))
    }

    /// Public key id the client needs to open the checkout widget
    pub fn key_id(&self) -> Result<String> {
        Ok(self.config()?.key_id.clone())
    }

    /// Configured price of a plan, in minor units with its currency
    pub fn plan_amount(&self, plan: PlanId) -> Result<(i64, String)> {
        let config = self.config()?;
        let amount = match plan {
            PlanId::Monthly => config.monthly_amount_minor,
            PlanId::Yearly => config.yearly_amount_minor,
        };
        Ok((amount, config.currency.clone()))
    }

    /// Create a provider order for the client to pay against
    #[instrument(skip(self))]
    pub async fn create_order(&self, plan: PlanId) -> Result<Order> {
        let config = self.config()?;
        let (amount, currency) = self.plan_amount(plan)?;

        let body = serde_json::json!({
            "amount": amount,
            "currency": currency,
            "receipt": format!("rcpt_{}", Uuid::new_v4().simple()),
        });

        let response = self
            .http_client
            .post(format!("{}/orders", RAZORPAY_API_BASE))
            .basic_auth(&config.key_id, Some(&config.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Order creation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Provider returned {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        response
            .json::<Order>()
            .await
            .map_err(|e| ApiError::Upstream(format!("Invalid provider response: {}", e)))
    }

    /// Check the client-submitted payment proof. Rejects before anything is
    /// persisted; the error message is the one the client surface expects.
    pub fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        submitted_signature: &str,
    ) -> Result<()> {
        let config = self.config()?;
        signature::verify_razorpay_signature(
            order_id,
            payment_id,
            &config.key_secret,
            submitted_signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn gateway() -> RazorpayGateway {
        RazorpayGateway::new(Some(RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: "rzp_test_secret".to_string(),
            monthly_amount_minor: 85_000,
            yearly_amount_minor: 595_000,
            currency: "INR".to_string(),
        }))
    }

    fn sign(order_id: &str, payment_id: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(b"rzp_test_secret").unwrap();
        mac.update(format!("{}|{}", order_id, payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_plan_amounts() {
        let gateway = gateway();
        assert_eq!(
            gateway.plan_amount(PlanId::Monthly).unwrap(),
            (85_000, "INR".to_string())
        );
        assert_eq!(
            gateway.plan_amount(PlanId::Yearly).unwrap(),
            (595_000, "INR".to_string())
        );
    }

    #[test]
    fn test_verify_payment_signature_accepts_valid_proof() {
        let signature = sign("order_abc", "pay_xyz");
        assert!(gateway()
            .verify_payment_signature("order_abc", "pay_xyz", &signature)
            .is_ok());
    }

    #[test]
    fn test_verify_payment_signature_rejects_tampering() {
        let signature = sign("order_abc", "pay_xyz");
        let result = gateway().verify_payment_signature("order_abc", "pay_other", &signature);
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }

    #[test]
    fn test_unconfigured_gateway_fails_closed() {
        let gateway = RazorpayGateway::new(None);
        assert!(matches!(
            gateway.verify_payment_signature("o", "p", "s"),
            Err(ApiError::NotConfigured("Razorpay"))
        ));
        assert!(matches!(
            gateway.key_id(),
            Err(ApiError::NotConfigured("Razorpay"))
        ));
    }
}
