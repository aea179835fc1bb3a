mod store;

pub use store::*;

use crate::error::{store_error, AppError, AppResult};
use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use shared::{CreateUserParams, User, UserList};

use crate::AppState;

/// Upper bound on rows returned by the listing endpoint.
pub const LIST_LIMIT: i64 = 100;

#[debug_handler]
#[tracing::instrument(skip(state))]
pub async fn create_user(
    State(state): State<AppState>,
    params: Result<Json<CreateUserParams>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let params = match params {
        Ok(Json(params)) => params,
        Err(rejection) => {
            tracing::debug!("Unreadable body: {}", rejection.body_text());
            CreateUserParams::default()
        }
    };
    let (name, email) = required_fields(params)?;

    let user = state
        .users
        .insert(&name, &email)
        .await
        .map_err(store_error("Failed to create user"))?;

    Ok((StatusCode::CREATED, Json(user)))
}

fn required_fields(params: CreateUserParams) -> AppResult<(String, String)> {
    match (params.name, params.email) {
        (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => Ok((name, email)),
        _ => Err(AppError::Validation(
            "Name and email are required".to_string(),
        )),
    }
}

#[debug_handler]
#[tracing::instrument(skip(state))]
pub async fn get_users(State(state): State<AppState>) -> AppResult<Json<UserList>> {
    let users = state
        .users
        .list_recent(LIST_LIMIT)
        .await
        .map_err(store_error("Failed to fetch users"))?;

    Ok(Json(users.into()))
}

#[debug_handler]
#[tracing::instrument(skip(state))]
pub async fn get_user_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    let not_found = || AppError::NotFound("User not found".to_string());

    // ids are SERIAL, anything that is not an i32 cannot match a row
    let id: i32 = id.parse().map_err(|_| not_found())?;

    let user = state
        .users
        .find(id)
        .await
        .map_err(store_error("Failed to fetch user"))?;

    user.map(Json).ok_or_else(not_found)
}
