pub use sea_orm_migration::prelude::*;

mod m20250106_000001_create_users;
mod m20250106_000002_create_resume_sections;
mod m20250115_000001_create_transactions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250106_000001_create_users::Migration),
            Box::new(m20250106_000002_create_resume_sections::Migration),
            Box::new(m20250115_000001_create_transactions::Migration),
        ]
    }
}
