use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create subscription_status enum
        manager
            .create_type(
                Type::create()
                    .as_enum(SubscriptionStatus::Type)
                    .values([
                        SubscriptionStatus::None,
                        SubscriptionStatus::Active,
                        SubscriptionStatus::PastDue,
                        SubscriptionStatus::Canceled,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create subscription_plan enum
        manager
            .create_type(
                Type::create()
                    .as_enum(SubscriptionPlan::Type)
                    .values([
                        SubscriptionPlan::Free,
                        SubscriptionPlan::Monthly,
                        SubscriptionPlan::Yearly,
                    ])
                    .to_owned(),
            )
            .await?;

        // Create users table (FIRST - other tables reference this)
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_uuid(Users::Id))
                    .col(string(Users::Name))
                    .col(string(Users::Username).unique_key())
                    .col(string(Users::Email).unique_key())
                    .col(string(Users::PasswordHash))
                    .col(string(Users::ProfileUrl))
                    .col(
                        ColumnDef::new(Users::SubscriptionStatus)
                            .custom(SubscriptionStatus::Type)
                            .not_null()
                            .default(SimpleExpr::Custom("'none'::subscription_status".to_string())),
                    )
                    .col(
                        ColumnDef::new(Users::SubscriptionPlan)
                            .custom(SubscriptionPlan::Type)
                            .not_null()
                            .default(SimpleExpr::Custom("'free'::subscription_plan".to_string())),
                    )
                    .col(string_null(Users::ProviderCustomerId))
                    .col(string_null(Users::ProviderSubscriptionId))
                    .col(timestamp_with_time_zone_null(Users::CurrentPeriodEnd))
                    .col(
                        timestamp_with_time_zone(Users::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Users::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookup index for webhook events that only carry the provider's
        // subscription handle
        manager
            .create_index(
                Index::create()
                    .name("idx_users_provider_subscription_id")
                    .table(Users::Table)
                    .col(Users::ProviderSubscriptionId)
                    .to_owned(),
            )
            .await?;

        // Create trigger function for updated_at
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;
                "#,
            )
            .await?;

        // Create trigger on users table
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER update_users_updated_at
                BEFORE UPDATE ON users
                FOR EACH ROW
                EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TRIGGER IF EXISTS update_users_updated_at ON users;")
            .await?;

        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(SubscriptionPlan::Type).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(SubscriptionStatus::Type).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Username,
    Email,
    PasswordHash,
    ProfileUrl,
    SubscriptionStatus,
    SubscriptionPlan,
    ProviderCustomerId,
    ProviderSubscriptionId,
    CurrentPeriodEnd,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum SubscriptionStatus {
    #[sea_orm(iden = "subscription_status")]
    Type,
    #[sea_orm(iden = "none")]
    None,
    #[sea_orm(iden = "active")]
    Active,
    #[sea_orm(iden = "past_due")]
    PastDue,
    #[sea_orm(iden = "canceled")]
    Canceled,
}

#[derive(DeriveIden)]
enum SubscriptionPlan {
    #[sea_orm(iden = "subscription_plan")]
    Type,
    #[sea_orm(iden = "free")]
    Free,
    #[sea_orm(iden = "monthly")]
    Monthly,
    #[sea_orm(iden = "yearly")]
    Yearly,
}
