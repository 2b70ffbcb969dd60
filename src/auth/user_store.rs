// src/auth/user_store.rs
use async_trait::async_trait;
use axum_login::{AuthnBackend, UserId};
use std::fmt::{self, Debug};
use tracing::{debug, error, info, instrument, warn};

use crate::PgPool;
use crate::auth::AuthError;
use crate::models::auth::LoginPayload;
use crate::models::users::User;

// Manually implement Debug because the pool doesn't implement it.
#[derive(Clone)]
pub struct Backend {
    pool: PgPool,
}

impl Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("pool", &"<PgPool>").finish()
    }
}

impl Backend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthnBackend for Backend {
    type User = User;
    type Credentials = LoginPayload;
    type Error = AuthError;

    #[instrument(skip(self, creds), err)]
    async fn authenticate(
        &self,
        creds: Self::Credentials,
    ) -> Result<Option<Self::User>, Self::Error> {
        let email = creds.email.clone();

        let verify_result = self
            .pool
            .get()
            .await
            .map_err(AuthError::PoolError)?
            .interact(move |conn| crate::auth::verify_credentials(conn, &creds.email, &creds.password))
            .await
            .map_err(AuthError::from)?;

        match verify_result {
            Ok(user) => {
                info!(email = %email, user_id = %user.id, "Authentication successful.");
                Ok(Some(user))
            }
            Err(AuthError::WrongCredentials) => {
                warn!(email = %email, "Authentication failed (Wrong Credentials).");
                Ok(None)
            }
            Err(AuthError::UserNotFound) => {
                warn!(email = %email, "Authentication failed (User Not Found).");
                Ok(None)
            }
            Err(e) => {
                error!(email = %email, error = ?e, "Authentication failed (Other Error).");
                Err(e)
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>, Self::Error> {
        let id: uuid::Uuid = *user_id;

        let get_result = self
            .pool
            .get()
            .await
            .map_err(AuthError::PoolError)?
            .interact(move |conn| crate::auth::get_user(conn, id))
            .await
            .map_err(AuthError::from)?;

        match get_result {
            Ok(user) => Ok(Some(user)),
            Err(AuthError::UserNotFound) => {
                // User not found is not an error for get_user, return None.
                debug!(user_id = %id, "Get user: not found.");
                Ok(None)
            }
            Err(e) => {
                error!(user_id = %id, error = ?e, "Get user failed.");
                Err(e)
            }
        }
    }
}
