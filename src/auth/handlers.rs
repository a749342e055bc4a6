use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, MessageResponse, SignupRequest, UserResponse},
        error::AuthError,
        extractors::{BearerToken, JsonBody},
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let session = state.auth.signup(payload).await?;
    Ok(Json(AuthResponse::new(
        "User created successfully",
        session.user,
        session.token,
    )))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let session = state.auth.login(payload).await?;
    Ok(Json(AuthResponse::new(
        "Login successful",
        session.user,
        session.token,
    )))
}

#[instrument(skip(state, token))]
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.logout(&token).await?;
    Ok(Json(MessageResponse {
        status: "success",
        message: "Logged out",
    }))
}

#[instrument(skip(state, token))]
pub async fn get_me(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<UserResponse>, AuthError> {
    let user = state.auth.current_user(&token).await?;
    Ok(Json(UserResponse {
        status: "success",
        message: "user fetched",
        user: user.into(),
    }))
}
