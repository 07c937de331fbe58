use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_duration: Duration,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            access_token_duration: Duration::hours(1),
        }
    }

    pub fn with_access_ttl_secs(mut self, secs: i64) -> Self {
        self.access_token_duration = Duration::seconds(secs);
        self
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_token_duration.num_seconds()
    }

    pub fn generate_access_token(&self, user_id: Uuid, username: &str) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            exp: (now + self.access_token_duration).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Auth(format!("Failed to generate access token: {}", e)))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_generation_and_verification() {
        let jwt_service = JwtService::new("test-secret");
        let user_id = Uuid::new_v4();

        let token = jwt_service.generate_access_token(user_id, "alice").unwrap();
        let claims = jwt_service.verify_access_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_rejects_foreign_and_expired_tokens() {
        let issuer = JwtService::new("secret-a");
        let token = issuer.generate_access_token(Uuid::new_v4(), "alice").unwrap();
        assert!(JwtService::new("secret-b").verify_access_token(&token).is_err());

        // Default validation allows 60s of leeway.
        let expired = JwtService::new("secret-a").with_access_ttl_secs(-120);
        let token = expired.generate_access_token(Uuid::new_v4(), "alice").unwrap();
        assert!(expired.verify_access_token(&token).is_err());
    }
}
