use crate::{
    config::StripeConfig,
    error::{ApiError, Result},
    models::billing::PlanId,
    services::signature,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Adapter for the event-driven (webhook) payment flow.
///
/// Constructed from explicit configuration; a deployment without the
/// provider section gets `NotConfigured` from every operation instead of a
/// silently dead endpoint.
pub struct StripeGateway {
    config: Option<StripeConfig>,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Customer {
    id: String,
}

/// Checkout session object, both as returned from session creation and as
/// embedded in the `checkout.session.completed` event
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Subscription object as returned by the API and carried in
/// `customer.subscription.*` events
#[derive(Debug, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl Subscription {
    pub fn period_end(&self) -> Option<OffsetDateTime> {
        self.current_period_end
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
    }
}

/// A verified, decoded webhook delivery
#[derive(Debug)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutSession),
    SubscriptionUpdated(Subscription),
    SubscriptionDeleted(Subscription),
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

impl StripeGateway {
    pub fn new(config: Option<StripeConfig>) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn config(&self) -> Result<&StripeConfig> {
        self.config.as_ref().ok_or(ApiError::NotConfigured("Stripe"))
    }

    /// Create a customer so future checkouts and webhook events can be tied
    /// back to the account
    #[instrument(skip(self))]
    pub async fn create_customer(&self, email: &str, name: &str, user_id: Uuid) -> Result<String> {
        let config = self.config()?;

        let params = [
            ("email", email.to_string()),
            ("name", name.to_string()),
            ("metadata[userId]", user_id.to_string()),
        ];

        let response = self
            .http_client
            .post(format!("{}/customers", STRIPE_API_BASE))
            .bearer_auth(&config.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Customer creation failed: {}", e)))?;

        let customer: Customer = Self::parse_response(response).await?;
        Ok(customer.id)
    }

    /// Create a subscription-mode checkout session for the given plan
    #[instrument(skip(self, client_url))]
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        plan: PlanId,
        user_id: Uuid,
        client_url: &str,
    ) -> Result<CheckoutSession> {
        let config = self.config()?;

        let price_id = match plan {
            PlanId::Monthly => config.monthly_price_id.clone(),
            PlanId::Yearly => config.yearly_price_id.clone(),
        };

        let params = [
            ("customer", customer_id.to_string()),
            ("mode", "subscription".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][price]", price_id),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "success_url",
                format!("{}/dashboard?payment=success", client_url),
            ),
            (
                "cancel_url",
                format!("{}/pricing?payment=cancel", client_url),
            ),
            ("metadata[userId]", user_id.to_string()),
            ("metadata[planId]", plan.as_str().to_string()),
        ];

        let response = self
            .http_client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .bearer_auth(&config.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Checkout session creation failed: {}", e)))?;

        Self::parse_response(response).await
    }

    /// Fetch the recurring agreement, primarily for its current period end
    #[instrument(skip(self))]
    pub async fn retrieve_subscription(&self, subscription_id: &str) -> Result<Subscription> {
        let config = self.config()?;

        let response = self
            .http_client
            .get(format!(
                "{}/subscriptions/{}",
                STRIPE_API_BASE, subscription_id
            ))
            .bearer_auth(&config.secret_key)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Subscription fetch failed: {}", e)))?;

        Self::parse_response(response).await
    }

    /// Flag the recurring agreement to lapse at the end of the paid period
    #[instrument(skip(self))]
    pub async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()> {
        let config = self.config()?;

        let response = self
            .http_client
            .post(format!(
                "{}/subscriptions/{}",
                STRIPE_API_BASE, subscription_id
            ))
            .bearer_auth(&config.secret_key)
            .form(&[("cancel_at_period_end", "true")])
            .send()
            .await
            .map_err(|e| ApiError::Upstream(format!("Subscription cancel failed: {}", e)))?;

        let _: Subscription = Self::parse_response(response).await?;
        Ok(())
    }

    /// Authenticate a webhook delivery against the raw body bytes, then
    /// decode it. Verification happens strictly before parsing; a payload
    /// that fails the signature check is never even deserialized.
    pub fn decode_webhook(&self, payload: &[u8], signature_header: &str) -> Result<WebhookEvent> {
        let config = self.config()?;

        signature::verify_stripe_signature(payload, signature_header, &config.webhook_secret)?;

        let envelope: EventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| ApiError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

        let event = match envelope.event_type.as_str() {
            "checkout.session.completed" => {
                WebhookEvent::CheckoutCompleted(Self::decode_object(envelope.data.object)?)
            }
            "customer.subscription.updated" => {
                WebhookEvent::SubscriptionUpdated(Self::decode_object(envelope.data.object)?)
            }
            "customer.subscription.deleted" => {
                WebhookEvent::SubscriptionDeleted(Self::decode_object(envelope.data.object)?)
            }
            other => WebhookEvent::Ignored(other.to_string()),
        };

        Ok(event)
    }

    fn decode_object<T: DeserializeOwned>(object: serde_json::Value) -> Result<T> {
        serde_json::from_value(object)
            .map_err(|e| ApiError::BadRequest(format!("Malformed event object: {}", e)))
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
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
            .json::<T>()
            .await
            .map_err(|e| ApiError::Upstream(format!("Invalid provider response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const WEBHOOK_SECRET: &str = "whsec_test";

    fn gateway() -> StripeGateway {
        StripeGateway::new(Some(StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            monthly_price_id: "price_monthly".to_string(),
            yearly_price_id: "price_yearly".to_string(),
        }))
    }

    fn sign(payload: &[u8]) -> String {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    #[test]
    fn test_decode_checkout_completed() {
        let payload = br#"{
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_1",
                    "customer": "cus_1",
                    "subscription": "sub_1",
                    "amount_total": 1000,
                    "currency": "usd",
                    "metadata": {"userId": "3fa85f64-5717-4562-b3fc-2c963f66afa6", "planId": "monthly"}
                }
            }
        }"#;

        let event = gateway().decode_webhook(payload, &sign(payload)).unwrap();
        match event {
            WebhookEvent::CheckoutCompleted(session) => {
                assert_eq!(session.id, "cs_test_1");
                assert_eq!(session.subscription.as_deref(), Some("sub_1"));
                assert_eq!(session.amount_total, Some(1000));
                assert_eq!(session.metadata.get("planId").map(String::as_str), Some("monthly"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_tampered_payload() {
        let payload = br#"{"type": "checkout.session.completed", "data": {"object": {"id": "cs_1"}}}"#;
        let header = sign(payload);

        let tampered = br#"{"type": "checkout.session.completed", "data": {"object": {"id": "cs_2"}}}"#;
        let result = gateway().decode_webhook(tampered, &header);
        assert!(matches!(result, Err(ApiError::SignatureVerification(_))));
    }

    #[test]
    fn test_decode_unknown_event_is_ignored() {
        let payload = br#"{"type": "invoice.finalized", "data": {"object": {}}}"#;

        let event = gateway().decode_webhook(payload, &sign(payload)).unwrap();
        assert!(matches!(event, WebhookEvent::Ignored(t) if t == "invoice.finalized"));
    }

    #[test]
    fn test_unconfigured_gateway_fails_closed() {
        let gateway = StripeGateway::new(None);
        let result = gateway.decode_webhook(b"{}", "t=0,v1=00");
        assert!(matches!(result, Err(ApiError::NotConfigured("Stripe"))));
    }
}
