use crate::{config::AuthConfig, error::Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user_id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

pub struct JWTService {
    config: Arc<AuthConfig>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JWTService {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Access token expiration in seconds
    pub fn expires_in_seconds(&self) -> u64 {
        self.config.access_token_expiration_minutes * 60
    }

    /// Generate a JWT access token for a user
    pub fn generate_token(&self, user_id: Uuid) -> Result<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let exp = now + self.expires_in_seconds() as i64;

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| crate::error::ApiError::Internal(e.into()))?;

        Ok(token)
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    crate::error::ApiError::ExpiredToken
                }
                _ => crate::error::ApiError::InvalidToken(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    /// Extract user_id from claims
    pub fn user_id_from_claims(claims: &Claims) -> Result<Uuid> {
        Uuid::parse_str(&claims.sub)
            .map_err(|e| crate::error::ApiError::InvalidToken(format!("Invalid user_id: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Arc<AuthConfig> {
        Arc::new(AuthConfig {
            jwt_secret: "test-secret-key-with-minimum-32-characters-required".to_string(),
            access_token_expiration_minutes: 15,
        })
    }

    #[test]
    fn test_generate_and_validate_token() {
        let service = JWTService::new(test_config());
        let user_id = Uuid::new_v4();

        // Generate token
        let token = service.generate_token(user_id).unwrap();
        assert!(!token.is_empty());

        // Validate token
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());

        // Extract user_id
        let extracted_user_id = JWTService::user_id_from_claims(&claims).unwrap();
        assert_eq!(extracted_user_id, user_id);
    }

    #[test]
    fn test_invalid_token() {
        let service = JWTService::new(test_config());
        let result = service.validate_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let service = JWTService::new(test_config());
        let other = JWTService::new(Arc::new(AuthConfig {
            jwt_secret: "a-completely-different-secret-of-sufficient-size".to_string(),
            access_token_expiration_minutes: 15,
        }));

        let token = other.generate_token(Uuid::new_v4()).unwrap();
        assert!(service.validate_token(&token).is_err());
    }
}
