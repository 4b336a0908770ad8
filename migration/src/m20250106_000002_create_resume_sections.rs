use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ResumeSections::Table)
                    .if_not_exists()
                    .col(pk_uuid(ResumeSections::Id))
                    .col(uuid(ResumeSections::UserId))
                    .col(string(ResumeSections::Kind))
                    .col(json_binary(ResumeSections::Content))
                    .col(
                        timestamp_with_time_zone(ResumeSections::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(ResumeSections::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_resume_sections_user_id")
                            .from(ResumeSections::Table, ResumeSections::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (user, section kind); saves are upserts
        manager
            .create_index(
                Index::create()
                    .name("idx_resume_sections_user_id_kind")
                    .table(ResumeSections::Table)
                    .col(ResumeSections::UserId)
                    .col(ResumeSections::Kind)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER update_resume_sections_updated_at
                BEFORE UPDATE ON resume_sections
                FOR EACH ROW
                EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ResumeSections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ResumeSections {
    Table,
    Id,
    UserId,
    Kind,
    Content,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
