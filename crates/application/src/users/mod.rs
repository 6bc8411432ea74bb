//! Users module: registration, status, credentials.

mod commands;
mod password;
mod service;

pub use commands::{CreateUser, DeleteUser, UpdateUserStatus, VerifyCredentials};
pub use password::{BcryptHasher, PasswordHasher};
pub use service::UserService;
