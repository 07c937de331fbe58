use axum::{extract::State, response::Json};

use crate::{
    errors::Result,
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::Usage,
};

pub async fn get_usage(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<Usage>> {
    let usage = state.store.usage(&user).await?;
    Ok(Json(usage))
}
