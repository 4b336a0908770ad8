use crate::{
    config::ApplicationConfig,
    error::{ApiError, Result},
    models::auth::SignupRequest,
    services::jwt_service::JWTService,
};
use anyhow::anyhow;
use entity::{
    sea_orm_active_enums::{SubscriptionPlan, SubscriptionStatus},
    users,
};
use sea_orm::{entity::*, query::*, DatabaseConnection};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Tokens handed back after a successful signin
#[derive(Debug)]
pub struct AuthTokens {
    pub token: String,
    pub expires_in: u64,
    pub user: users::Model,
}

pub struct AuthService {
    db: DatabaseConnection,
    jwt_service: Arc<JWTService>,
    client_url: String,
}

impl AuthService {
    pub fn new(
        db: DatabaseConnection,
        jwt_service: Arc<JWTService>,
        application: &ApplicationConfig,
    ) -> Self {
        Self {
            db,
            jwt_service,
            client_url: application.client_url.clone(),
        }
    }

    /// Create a new account with the baseline (unsubscribed) state
    #[instrument(skip(self, request))]
    pub async fn signup(&self, request: SignupRequest) -> Result<users::Model> {
        let email_taken = users::Entity::find()
            .filter(users::Column::Email.eq(&request.email))
            .one(&self.db)
            .await?
            .is_some();
        if email_taken {
            return Err(ApiError::BadRequest("Email is taken".to_string()));
        }

        let username_taken = users::Entity::find()
            .filter(users::Column::Username.eq(&request.username))
            .one(&self.db)
            .await?
            .is_some();
        if username_taken {
            return Err(ApiError::BadRequest("Username is taken".to_string()));
        }

        let password_hash = bcrypt::hash(&request.password, bcrypt::DEFAULT_COST)
            .map_err(|e| ApiError::Internal(anyhow!("Failed to hash password: {}", e)))?;

        let now = OffsetDateTime::now_utc();
        let profile_url = format!(
            "{}/profile/{}",
            self.client_url,
            request.username.to_lowercase()
        );

        let user = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            username: Set(request.username),
            email: Set(request.email),
            password_hash: Set(password_hash),
            profile_url: Set(profile_url),
            subscription_status: Set(SubscriptionStatus::None),
            subscription_plan: Set(SubscriptionPlan::Free),
            provider_customer_id: Set(None),
            provider_subscription_id: Set(None),
            current_period_end: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let user = user.insert(&self.db).await?;

        info!("Created account: user={}, username={}", user.id, user.username);

        Ok(user)
    }

    /// Verify credentials and issue an access token
    #[instrument(skip(self, password))]
    pub async fn signin(&self, email: &str, password: &str) -> Result<AuthTokens> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ApiError::BadRequest(
                    "User with that email does not exist. Please sign up.".to_string(),
                )
            })?;

        let password_matches = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| ApiError::Internal(anyhow!("Failed to verify password: {}", e)))?;
        if !password_matches {
            return Err(ApiError::BadRequest(
                "Email and password do not match.".to_string(),
            ));
        }

        let token = self.jwt_service.generate_token(user.id)?;

        Ok(AuthTokens {
            token,
            expires_in: self.jwt_service.expires_in_seconds(),
            user,
        })
    }

    /// Look up an account by id
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
    }
}
