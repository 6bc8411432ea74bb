use std::sync::Arc;

use async_trait::async_trait;
use common::{Filter, ListQuery, Page, UserId};
use domain::{Name, User};
use persistence::{Document, Repository};
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::{CreateUser, DeleteUser, PasswordHasher, UpdateUserStatus, VerifyCredentials};
use crate::facade::UsersFacade;
use crate::{ApplicationError, Result, saved};

/// Service for managing users.
#[derive(Clone)]
pub struct UserService {
    users: Repository<User>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(users: Repository<User>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { users, hasher }
    }

    /// Registers a user. Usernames and emails must be unused.
    #[tracing::instrument(skip(self, cancel), fields(username = %cmd.username))]
    pub async fn create_user(&self, cmd: CreateUser, cancel: &CancellationToken) -> Result<User> {
        cmd.validate()?;

        let email = cmd.email.trim().to_lowercase();
        let taken = self
            .users
            .find_one(
                ListQuery::new().filter(Filter::term(format!("email:{email}"))),
                cancel,
            )
            .await?;
        if taken.is_some() {
            return Err(ApplicationError::Conflict(format!(
                "Email {email} is already registered"
            )));
        }

        let password_hash = self.hasher.hash(&cmd.password)?;
        let user = User::register(
            &cmd.username,
            &email,
            &cmd.phone,
            password_hash,
            Name {
                first: cmd.first_name,
                last: cmd.last_name,
            },
            cmd.role,
        )?;

        let mut uow = self.users.begin();
        uow.add(user);
        let user = saved(uow.commit(cancel).await?)?;
        tracing::info!(user_id = %user.id(), "user registered");
        Ok(user)
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn update_user_status(
        &self,
        cmd: UpdateUserStatus,
        cancel: &CancellationToken,
    ) -> Result<User> {
        let mut user = self.load(cmd.user_id, cancel).await?;
        user.change_status(cmd.status)?;

        let mut uow = self.users.begin();
        uow.update(user);
        saved(uow.commit(cancel).await?)
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_user(&self, cmd: DeleteUser, cancel: &CancellationToken) -> Result<()> {
        let mut user = self.load(cmd.user_id, cancel).await?;
        user.delete();

        let mut uow = self.users.begin();
        uow.remove(user);
        uow.commit(cancel).await?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: UserId, cancel: &CancellationToken) -> Result<User> {
        self.load(user_id, cancel).await
    }

    pub async fn list_users(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Page<User>> {
        Ok(self.users.list(query, cancel).await?)
    }

    /// Returns the user when the username exists, the account is active and
    /// the password matches.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn verify_credentials(
        &self,
        cmd: VerifyCredentials,
        cancel: &CancellationToken,
    ) -> Result<Option<User>> {
        let user = self
            .users
            .find_one(
                ListQuery::new().filter(Filter::eq("username", cmd.username.trim())),
                cancel,
            )
            .await?;
        let Some(user) = user else {
            return Ok(None);
        };
        if !user.is_active() || !self.hasher.verify(&cmd.password, user.password_hash())? {
            return Ok(None);
        }
        Ok(Some(user))
    }

    async fn load(&self, user_id: UserId, cancel: &CancellationToken) -> Result<User> {
        self.users
            .get(user_id, cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("User", user_id))
    }
}

#[async_trait]
impl UsersFacade for UserService {
    async fn user_exists(&self, user_id: UserId, cancel: &CancellationToken) -> Result<bool> {
        Ok(self.users.get(user_id, cancel).await?.is_some())
    }
}
