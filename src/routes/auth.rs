use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum_login::AuthSession;
use secrecy::ExposeSecret;
use tracing::{info, instrument};
use validator::Validate;

use crate::errors::AppError;
use crate::models::auth::{AuthResponse, LoginPayload, RegisterPayload};
use crate::models::users::User;
use crate::state::AppState;

use crate::auth::user_store::Backend as AuthBackend;
type CurrentAuthSession = AuthSession<AuthBackend>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
}

fn auth_response(user: &User) -> AuthResponse {
    AuthResponse {
        user_id: user.id,
        email: user.email.clone(),
        role: user.role,
    }
}

#[instrument(skip(state, payload), err)]
pub async fn register_handler(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    if payload.password.expose_secret().len() < 8 {
        return Err(AppError::ValidationError(
            "password must be at least 8 characters".to_string(),
        ));
    }

    let conn = state
        .pool
        .get()
        .await
        .map_err(|e| AppError::DbPoolError(e.to_string()))?;
    let user = conn
        .interact(move |conn| crate::auth::create_user(conn, payload))
        .await
        .map_err(AppError::from)?
        .map_err(AppError::from)?;

    info!(user_id = %user.id, "User registration successful.");
    Ok((StatusCode::CREATED, Json(auth_response(&user))))
}

#[instrument(skip(auth_session, payload), err)]
pub async fn login_handler(
    mut auth_session: CurrentAuthSession,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, AppError> {
    let user = match auth_session.authenticate(payload).await {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AppError::InvalidCredentials),
        Err(e) => return Err(AppError::AuthError(e.to_string())),
    };

    auth_session
        .login(&user)
        .await
        .map_err(|e| AppError::AuthError(e.to_string()))?;

    info!(user_id = %user.id, "Login successful.");
    Ok(Json(auth_response(&user)))
}

#[instrument(skip(auth_session), err)]
pub async fn logout_handler(
    mut auth_session: CurrentAuthSession,
) -> Result<impl IntoResponse, AppError> {
    auth_session
        .logout()
        .await
        .map_err(|e| AppError::AuthError(e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(auth_session), err)]
pub async fn me_handler(auth_session: CurrentAuthSession) -> Result<impl IntoResponse, AppError> {
    let user = auth_session
        .user
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;
    Ok(Json(auth_response(&user)))
}
