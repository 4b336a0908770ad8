// Request/Response models
pub mod auth;
pub mod billing;
pub mod common;
pub mod resume;
