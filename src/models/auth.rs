use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::users::UserRole;

/// Payload for POST /api/auth/register.
#[derive(Deserialize, Debug, Validate)]
pub struct RegisterPayload {
    #[validate(email)]
    pub email: String,
    pub password: SecretString,
    pub role: UserRole,
}

/// Payload for POST /api/auth/login.
#[derive(Deserialize, Debug)]
pub struct LoginPayload {
    pub email: String,
    pub password: SecretString,
}

/// Response body for successful register/login/me calls.
#[derive(Serialize, Debug, Clone)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}
