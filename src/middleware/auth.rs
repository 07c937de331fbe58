use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::{
    auth::JwtService,
    database::queries::UserQueries,
    errors::AppError,
    handlers::AppState,
    models::UserIdentity,
};

/// Resolves `Authorization: Bearer <token>` into the caller's identity.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserIdentity);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Auth("Authentication required".to_string()))?;

        let jwt_service = JwtService::new(&state.config.jwt_secret);
        let claims = jwt_service
            .verify_access_token(token)
            .map_err(|_| AppError::Auth("Invalid or expired token".to_string()))?;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Auth("Invalid token".to_string()))?;

        // Tokens outlive accounts; make sure the user still exists.
        let user = UserQueries::find_by_id(state.database.pool(), user_id)
            .await?
            .ok_or_else(|| AppError::Auth("User not found".to_string()))?;

        Ok(AuthenticatedUser(UserIdentity::from(&user)))
    }
}
