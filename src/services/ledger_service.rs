use crate::{
    error::{ApiError, Result},
    models::billing::PaymentConfirmed,
};
use anyhow::anyhow;
use entity::{
    sea_orm_active_enums::{PaymentProvider, SubscriptionPlan, TransactionStatus},
    transactions,
};
use sea_orm::{entity::*, query::*, sea_query::OnConflict, DatabaseConnection, DbErr};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// A ledger entry about to be written
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: PaymentProvider,
    pub payment_id: String,
    pub order_id: Option<String>,
    pub status: TransactionStatus,
    pub plan: SubscriptionPlan,
}

impl From<&PaymentConfirmed> for NewTransaction {
    fn from(fact: &PaymentConfirmed) -> Self {
        Self {
            user_id: fact.user_id,
            amount_minor: fact.amount_minor,
            currency: fact.currency.clone(),
            provider: fact.provider,
            payment_id: fact.payment_id.clone(),
            order_id: fact.order_id.clone(),
            status: TransactionStatus::Completed,
            plan: fact.plan.as_subscription_plan(),
        }
    }
}

/// Append-only record of payment attempts.
///
/// `(provider, payment_id)` is unique at the database level; redelivered or
/// concurrently delivered provider events collapse into one stored row, and
/// every loser gets `DuplicatePayment`.
pub struct LedgerService {
    db: DatabaseConnection,
}

impl LedgerService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record a payment attempt exactly once.
    ///
    /// Insert with `ON CONFLICT DO NOTHING`, then read back by the
    /// idempotency key: if the persisted row is not ours, someone else got
    /// there first and the caller receives `DuplicatePayment`.
    #[instrument(skip(self, new), fields(payment_id = %new.payment_id))]
    pub async fn record(&self, new: NewTransaction) -> Result<transactions::Model> {
        let now = OffsetDateTime::now_utc();
        let transaction_id = Uuid::new_v4();

        let row = transactions::ActiveModel {
            id: Set(transaction_id),
            user_id: Set(new.user_id),
            amount_minor: Set(new.amount_minor),
            currency: Set(new.currency),
            provider: Set(new.provider),
            payment_id: Set(new.payment_id.clone()),
            order_id: Set(new.order_id),
            status: Set(new.status),
            plan: Set(new.plan),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let insert_result = transactions::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    transactions::Column::Provider,
                    transactions::Column::PaymentId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&self.db)
            .await;

        match insert_result {
            Ok(_) => {}
            // Conflict with an existing key; resolved by the read-back below
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        let persisted = transactions::Entity::find()
            .filter(transactions::Column::Provider.eq(new.provider))
            .filter(transactions::Column::PaymentId.eq(&new.payment_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(anyhow!(
                    "Failed to read transaction after insert for payment {}",
                    new.payment_id
                ))
            })?;

        if persisted.id != transaction_id {
            return Err(ApiError::DuplicatePayment(format!(
                "Payment {} already recorded at {}",
                new.payment_id, persisted.created_at
            )));
        }

        info!(
            "Recorded payment: user={}, provider={}, payment={}, amount_minor={}",
            persisted.user_id,
            persisted.provider.as_str(),
            persisted.payment_id,
            persisted.amount_minor
        );

        Ok(persisted)
    }

    /// All transactions for an account, newest first
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<transactions::Model>> {
        let transactions = transactions::Entity::find()
            .filter(transactions::Column::UserId.eq(user_id))
            .order_by_desc(transactions::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(transactions)
    }

    /// Post-hoc status correction driven by a later provider event
    /// (e.g. refund). Never used on the hot payment path.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        provider: PaymentProvider,
        payment_id: &str,
        status: TransactionStatus,
    ) -> Result<transactions::Model> {
        let existing = transactions::Entity::find()
            .filter(transactions::Column::Provider.eq(provider))
            .filter(transactions::Column::PaymentId.eq(payment_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("No transaction for payment {}", payment_id))
            })?;

        let mut active: transactions::ActiveModel = existing.into();
        active.status = Set(status);
        active.updated_at = Set(OffsetDateTime::now_utc());

        Ok(active.update(&self.db).await?)
    }
}
