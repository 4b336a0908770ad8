use crate::{
    error::Result,
    models::billing::{PaymentConfirmed, PlanId, SubscriptionChanged, SubscriptionClosed},
};
use entity::{
    sea_orm_active_enums::{SubscriptionPlan, SubscriptionStatus},
    users,
};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Whether an account currently qualifies for paid features.
///
/// `canceled` stays entitled until the already-paid period lapses; only
/// `none`, or a period end in the past, closes the gate.
pub fn is_entitled(
    status: SubscriptionStatus,
    current_period_end: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> bool {
    match status {
        SubscriptionStatus::None => false,
        SubscriptionStatus::Active
        | SubscriptionStatus::PastDue
        | SubscriptionStatus::Canceled => current_period_end.map_or(true, |end| end > now),
    }
}

/// Map the webhook provider's status vocabulary onto ours. Anything that is
/// not plainly "active" (past_due, unpaid, incomplete, paused, ...) parks the
/// account in `past_due` until a terminal deletion event arrives.
pub fn map_provider_status(provider_status: &str) -> SubscriptionStatus {
    if provider_status == "active" {
        SubscriptionStatus::Active
    } else {
        SubscriptionStatus::PastDue
    }
}

/// Period end for the client-confirmed flow. That provider pushes no renewal
/// events, so this is a local projection rather than provider-confirmed
/// truth.
pub fn projected_period_end(plan: PlanId, now: OffsetDateTime) -> OffsetDateTime {
    now + Duration::days(plan.period_days())
}

/// Owns every write to the subscription columns on `users`.
///
/// All transitions are single conditional UPDATE statements scoped by
/// account id or provider subscription handle, so two facts racing for the
/// same account cannot interleave a read-then-write. Re-applying an
/// already-applied fact writes the same values and is treated as success.
pub struct SubscriptionService {
    db: DatabaseConnection,
}

impl SubscriptionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The webhook flow confirmed a completed checkout
    #[instrument(skip(self, fact), fields(user_id = %fact.user_id))]
    pub async fn apply_checkout_completed(&self, fact: &PaymentConfirmed) -> Result<()> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::SubscriptionStatus,
                Expr::value(SubscriptionStatus::Active),
            )
            .col_expr(
                users::Column::SubscriptionPlan,
                Expr::value(fact.plan.as_subscription_plan()),
            )
            .col_expr(
                users::Column::ProviderCustomerId,
                Expr::value(fact.customer_id.clone()),
            )
            .col_expr(
                users::Column::ProviderSubscriptionId,
                Expr::value(fact.subscription_id.clone()),
            )
            .col_expr(
                users::Column::CurrentPeriodEnd,
                Expr::value(fact.period_end),
            )
            .filter(users::Column::Id.eq(fact.user_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                "Checkout completed for unknown account: user={}, payment={}",
                fact.user_id, fact.payment_id
            );
        } else {
            info!(
                "Activated subscription: user={}, plan={}",
                fact.user_id,
                fact.plan.as_str()
            );
        }

        Ok(())
    }

    /// The webhook flow pushed a status change for a recurring agreement.
    /// Matched by the provider's subscription handle; the event may not
    /// carry any user identity. No matching account is a no-op.
    #[instrument(skip(self, changed), fields(subscription_id = %changed.subscription_id))]
    pub async fn apply_subscription_updated(&self, changed: &SubscriptionChanged) -> Result<()> {
        let status = map_provider_status(&changed.provider_status);

        let mut update = users::Entity::update_many()
            .col_expr(users::Column::SubscriptionStatus, Expr::value(status));

        if let Some(period_end) = changed.period_end {
            update = update.col_expr(
                users::Column::CurrentPeriodEnd,
                Expr::value(Some(period_end)),
            );
        }

        let result = update
            .filter(users::Column::ProviderSubscriptionId.eq(&changed.subscription_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            debug!(
                "Subscription update for unknown handle: {}",
                changed.subscription_id
            );
        }

        Ok(())
    }

    /// The recurring agreement is gone at the provider; reset the account to
    /// the unsubscribed baseline. No matching account is a no-op.
    #[instrument(skip(self, closed), fields(subscription_id = %closed.subscription_id))]
    pub async fn apply_subscription_deleted(&self, closed: &SubscriptionClosed) -> Result<()> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::SubscriptionStatus,
                Expr::value(SubscriptionStatus::None),
            )
            .col_expr(
                users::Column::SubscriptionPlan,
                Expr::value(SubscriptionPlan::Free),
            )
            .col_expr(
                users::Column::ProviderSubscriptionId,
                Expr::value(None::<String>),
            )
            .col_expr(
                users::Column::CurrentPeriodEnd,
                Expr::value(None::<OffsetDateTime>),
            )
            .filter(users::Column::ProviderSubscriptionId.eq(&closed.subscription_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            debug!(
                "Subscription deletion for unknown handle: {}",
                closed.subscription_id
            );
        } else {
            info!("Reset subscription for handle {}", closed.subscription_id);
        }

        Ok(())
    }

    /// The client-confirmed flow verified a payment. The period end is a
    /// local projection (see `projected_period_end`); any previous recurring
    /// agreement handle is cleared because this payment is not one.
    #[instrument(skip(self))]
    pub async fn apply_client_confirmed(
        &self,
        user_id: Uuid,
        plan: PlanId,
        now: OffsetDateTime,
    ) -> Result<()> {
        let period_end = projected_period_end(plan, now);

        let result = users::Entity::update_many()
            .col_expr(
                users::Column::SubscriptionStatus,
                Expr::value(SubscriptionStatus::Active),
            )
            .col_expr(
                users::Column::SubscriptionPlan,
                Expr::value(plan.as_subscription_plan()),
            )
            .col_expr(
                users::Column::ProviderSubscriptionId,
                Expr::value(None::<String>),
            )
            .col_expr(
                users::Column::CurrentPeriodEnd,
                Expr::value(Some(period_end)),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!("Verified payment for unknown account: user={}", user_id);
        } else {
            info!(
                "Activated subscription: user={}, plan={}, projected_end={}",
                user_id,
                plan.as_str(),
                period_end
            );
        }

        Ok(())
    }

    /// User asked to cancel. Entitlement survives until the paid period
    /// lapses, so only the status flips; `current_period_end` stays.
    #[instrument(skip(self))]
    pub async fn mark_cancel_requested(&self, user_id: Uuid) -> Result<()> {
        users::Entity::update_many()
            .col_expr(
                users::Column::SubscriptionStatus,
                Expr::value(SubscriptionStatus::Canceled),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;

        info!("Marked subscription canceled at period end: user={}", user_id);

        Ok(())
    }

    /// Persist a freshly created provider customer handle
    #[instrument(skip(self))]
    pub async fn store_customer_id(&self, user_id: Uuid, customer_id: &str) -> Result<()> {
        users::Entity::update_many()
            .col_expr(
                users::Column::ProviderCustomerId,
                Expr::value(Some(customer_id.to_string())),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-15 12:00 UTC);

    #[test]
    fn test_entitlement_requires_some_subscription() {
        assert!(!is_entitled(SubscriptionStatus::None, None, NOW));
        assert!(!is_entitled(
            SubscriptionStatus::None,
            Some(NOW + Duration::days(10)),
            NOW
        ));
    }

    #[test]
    fn test_entitlement_active_without_period_end() {
        assert!(is_entitled(SubscriptionStatus::Active, None, NOW));
    }

    #[test]
    fn test_entitlement_survives_cancellation_until_period_end() {
        let future = Some(NOW + Duration::days(3));
        assert!(is_entitled(SubscriptionStatus::Canceled, future, NOW));

        let past = Some(NOW - Duration::days(3));
        assert!(!is_entitled(SubscriptionStatus::Canceled, past, NOW));
    }

    #[test]
    fn test_entitlement_past_due_keeps_access_within_period() {
        let future = Some(NOW + Duration::days(1));
        assert!(is_entitled(SubscriptionStatus::PastDue, future, NOW));

        let past = Some(NOW - Duration::minutes(1));
        assert!(!is_entitled(SubscriptionStatus::PastDue, past, NOW));
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(map_provider_status("active"), SubscriptionStatus::Active);
        for other in ["past_due", "unpaid", "incomplete", "paused", "trialing"] {
            assert_eq!(map_provider_status(other), SubscriptionStatus::PastDue);
        }
    }

    #[test]
    fn test_projected_period_end() {
        assert_eq!(
            projected_period_end(PlanId::Monthly, NOW),
            NOW + Duration::days(30)
        );
        assert_eq!(
            projected_period_end(PlanId::Yearly, NOW),
            NOW + Duration::days(365)
        );
    }
}
