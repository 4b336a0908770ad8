use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// Request Models
// ============================================================================

/// Request body for account signup
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 3, max = 40))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Request body for signin
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SigninRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

// ============================================================================
// Response Models
// ============================================================================

/// User information in responses
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub profile_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<entity::users::Model> for UserResponse {
    fn from(user: entity::users::Model) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            username: user.username,
            email: user.email,
            profile_url: user.profile_url,
            created_at: user.created_at,
        }
    }
}

/// Response from successful authentication
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: u64, // Access token expiration in seconds
    pub user: UserResponse,
}
