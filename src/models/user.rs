// src/models/user.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::jwt::Claims;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_ADMIN: &str = "admin";

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// Optional display name shown on results.
    pub name: Option<String>,

    /// User role: 'student' or 'admin'.
    pub role: String,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// Who is taking a test. Built from verified token claims and passed
/// explicitly into every session entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i64,
    pub user_name: String,
}

impl TryFrom<&Claims> for Identity {
    type Error = std::num::ParseIntError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: claims.sub.parse()?,
            user_name: claims.name.clone(),
        })
    }
}

/// Input for inserting a user; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub role: String,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Username length must be between 3 and 50 characters."
    ))]
    pub username: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(max = 100))]
    pub name: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}
