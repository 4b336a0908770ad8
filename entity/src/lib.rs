pub mod resume_sections;
pub mod sea_orm_active_enums;
pub mod transactions;
pub mod users;

pub use sea_orm_active_enums::*;
