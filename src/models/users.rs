use crate::schema::users;
use axum_login::AuthUser;
use chrono::{DateTime, Utc};
use diesel::Insertable;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor roles and the capabilities they carry: students submit drawings,
/// facilitators assign them, psychologists review them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, diesel_derive_enum::DbEnum,
)]
#[ExistingTypePath = "crate::schema::sql_types::UserRole"]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[db_rename = "student"]
    Student,
    #[db_rename = "facilitator"]
    Facilitator,
    #[db_rename = "psychologist"]
    Psychologist,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Facilitator => "facilitator",
            Self::Psychologist => "psychologist",
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, skip_deserializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl AuthUser for User {
    type Id = Uuid;

    fn id(&self) -> Self::Id {
        self.id
    }

    fn session_auth_hash(&self) -> &[u8] {
        // Use the password hash to ensure sessions are invalidated on password change.
        self.password_hash.as_bytes()
    }
}

/// Represents data needed to create a new user.
#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

/// The user shape embedded in API responses (listings, auth responses).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}
