use common::UserId;
use domain::{UserRole, UserStatus};
use serde::Deserialize;
use validator::Validate;

/// Command to register a user.
#[derive(Clone, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: UserRole,
}

impl CreateUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            phone: String::new(),
            password: password.into(),
            first_name: String::new(),
            last_name: String::new(),
            role: UserRole::Customer,
        }
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = first.into();
        self.last_name = last.into();
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = role;
        self
    }
}

// Keeps the plain password out of logs.
impl std::fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UpdateUserStatus {
    pub user_id: UserId,
    pub status: UserStatus,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeleteUser {
    pub user_id: UserId,
}

#[derive(Clone, Deserialize)]
pub struct VerifyCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for VerifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
