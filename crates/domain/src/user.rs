//! User accounts.

use common::{FieldKind, FieldSpec, FieldValue, UserId};
use persistence::{Document, DomainEvent, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("Username is required")]
    UsernameRequired,

    #[error("Email is required")]
    EmailRequired,

    #[error("User is already {status}")]
    StatusUnchanged { status: UserStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UserRole {
    #[default]
    Customer,
    Manager,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "Customer",
            UserRole::Manager => "Manager",
            UserRole::Admin => "Admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "Active",
            UserStatus::Inactive => "Inactive",
            UserStatus::Suspended => "Suspended",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Name {
    pub first: String,
    pub last: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEvent {
    UserRegistered {
        user_id: UserId,
    },
    UserStatusChanged {
        user_id: UserId,
        from: UserStatus,
        to: UserStatus,
    },
    UserDeleted {
        user_id: UserId,
    },
}

impl DomainEvent for UserEvent {
    const EVENT_TYPES: &'static [&'static str] =
        &["UserRegistered", "UserStatusChanged", "UserDeleted"];

    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "UserRegistered",
            UserEvent::UserStatusChanged { .. } => "UserStatusChanged",
            UserEvent::UserDeleted { .. } => "UserDeleted",
        }
    }
}

/// A registered user. The password is only ever held as an opaque hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    #[serde(default)]
    version: Version,
    username: String,
    email: String,
    phone: String,
    password_hash: String,
    name: Name,
    role: UserRole,
    status: UserStatus,
    #[serde(skip)]
    pending: Vec<UserEvent>,
}

impl User {
    pub fn register(
        username: &str,
        email: &str,
        phone: &str,
        password_hash: String,
        name: Name,
        role: UserRole,
    ) -> Result<Self, UserError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(UserError::UsernameRequired);
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(UserError::EmailRequired);
        }
        let id = UserId::new();
        Ok(Self {
            id,
            version: Version::initial(),
            username: username.to_string(),
            email: email.to_lowercase(),
            phone: phone.trim().to_string(),
            password_hash,
            name,
            role,
            status: UserStatus::Active,
            pending: vec![UserEvent::UserRegistered { user_id: id }],
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn change_status(&mut self, status: UserStatus) -> Result<(), UserError> {
        if self.status == status {
            return Err(UserError::StatusUnchanged { status });
        }
        let from = self.status;
        self.status = status;
        self.pending.push(UserEvent::UserStatusChanged {
            user_id: self.id,
            from,
            to: status,
        });
        Ok(())
    }

    /// Marks the user for deletion. The caller stages its removal.
    pub fn delete(&mut self) {
        self.pending.push(UserEvent::UserDeleted { user_id: self.id });
    }
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Uuid),
    FieldSpec::new("username", FieldKind::Text),
    FieldSpec::new("email", FieldKind::Text),
    FieldSpec::new("role", FieldKind::Text),
    FieldSpec::new("status", FieldKind::Text),
];

impl Document for User {
    type Id = UserId;
    type Event = UserEvent;

    fn document_type() -> &'static str {
        "User"
    }

    fn collection() -> &'static str {
        "users"
    }

    fn schema() -> &'static [FieldSpec] {
        SCHEMA
    }

    fn id(&self) -> UserId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.as_uuid().into()),
            "username" => Some(self.username.clone().into()),
            "email" => Some(self.email.clone().into()),
            "role" => Some(self.role.as_str().into()),
            "status" => Some(self.status.as_str().into()),
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<UserEvent> {
        std::mem::take(&mut self.pending)
    }

    fn index_terms(&self) -> Vec<String> {
        vec![format!("email:{}", self.email)]
    }

    /// Usernames are unique, compared case-insensitively.
    fn unique_key(&self) -> Option<String> {
        Some(format!("username:{}", self.username.to_lowercase()))
    }
}
