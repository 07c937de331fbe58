use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::json;

use crate::{
    auth::{JwtService, PasswordService},
    database::queries::UserQueries,
    errors::{AppError, Result},
    handlers::AppState,
    models::{AuthResponse, CreateUserRequest, LoginRequest, User, UserResponse},
};

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let username = request.username.trim();
    PasswordService::validate_username(username)?;
    PasswordService::validate_password_strength(&request.password)?;

    let cost = state.config.password_hash_cost;
    let password = request.password;
    let password_hash = tokio::task::spawn_blocking(move || {
        PasswordService::hash_password_with_cost(&password, cost)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    // The unique index on username decides races between registrations.
    let user = UserQueries::create_user(state.database.pool(), username, &password_hash).await?;
    tracing::info!("Registered user {}", user.username);

    let response = issue_tokens(&state, user)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful",
            "data": response
        })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>> {
    let user = UserQueries::find_by_username(state.database.pool(), request.username.trim())
        .await?
        .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

    let password = request.password;
    let password_hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || {
        PasswordService::verify_password(&password, &password_hash)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    if !valid {
        tracing::warn!("Failed login for {}", user.username);
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    let response = issue_tokens(&state, user)?;

    Ok(Json(json!({
        "message": "Login successful",
        "data": response
    })))
}

pub async fn logout(
    State(_state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    // Tokens are stateless; the client discards its copy.
    Ok(Json(json!({
        "message": "Logged out successfully"
    })))
}

fn issue_tokens(state: &AppState, user: User) -> Result<AuthResponse> {
    let jwt_service = JwtService::new(&state.config.jwt_secret)
        .with_access_ttl_secs(state.config.access_token_ttl_secs);
    let access_token = jwt_service.generate_access_token(user.id, &user.username)?;

    Ok(AuthResponse {
        access_token,
        token_type: "Bearer",
        expires_in: jwt_service.access_ttl_secs(),
        user: UserResponse::from(user),
    })
}
