use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create payment_provider enum
        manager
            .create_type(
                Type::create()
                    .as_enum(PaymentProvider::Type)
                    .values([PaymentProvider::Stripe, PaymentProvider::Razorpay])
                    .to_owned(),
            )
            .await?;

        // Create transaction_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(TransactionStatus::Type)
                    .values([
                        TransactionStatus::Pending,
                        TransactionStatus::Completed,
                        TransactionStatus::Failed,
                        TransactionStatus::Refunded,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(pk_uuid(Transactions::Id))
                    .col(uuid(Transactions::UserId))
                    .col(big_integer(Transactions::AmountMinor))
                    .col(string(Transactions::Currency))
                    .col(
                        ColumnDef::new(Transactions::Provider)
                            .custom(PaymentProvider::Type)
                            .not_null(),
                    )
                    .col(string(Transactions::PaymentId))
                    .col(string_null(Transactions::OrderId))
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .custom(TransactionStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom("'pending'::transaction_status".to_string())),
                    )
                    .col(
                        ColumnDef::new(Transactions::Plan)
                            .custom(SubscriptionPlan::Type)
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Transactions::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Transactions::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_user_id")
                            .from(Transactions::Table, Transactions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The idempotency key: one row per provider payment reference,
        // enforced by the database so concurrent redeliveries cannot both
        // insert
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_provider_payment_id")
                    .table(Transactions::Table)
                    .col(Transactions::Provider)
                    .col(Transactions::PaymentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // History reads are per-user, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_user_id_created_at")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER update_transactions_updated_at
                BEFORE UPDATE ON transactions
                FOR EACH ROW
                EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(TransactionStatus::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(PaymentProvider::Type).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    UserId,
    AmountMinor,
    Currency,
    Provider,
    PaymentId,
    OrderId,
    Status,
    Plan,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum PaymentProvider {
    #[sea_orm(iden = "payment_provider")]
    Type,
    #[sea_orm(iden = "stripe")]
    Stripe,
    #[sea_orm(iden = "razorpay")]
    Razorpay,
}

#[derive(DeriveIden)]
enum TransactionStatus {
    #[sea_orm(iden = "transaction_status")]
    Type,
    #[sea_orm(iden = "pending")]
    Pending,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "failed")]
    Failed,
    #[sea_orm(iden = "refunded")]
    Refunded,
}

#[derive(DeriveIden)]
enum SubscriptionPlan {
    #[sea_orm(iden = "subscription_plan")]
    Type,
}
