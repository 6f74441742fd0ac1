use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        claims::TokenContext,
        jwt::{TokenError, TokenIssuer},
        password::{PasswordError, PasswordHasher},
    },
    users::{
        model::{NewUser, User, UserSummary, UserUpdate},
        repo::{RepoError, UserRepository},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("encrypt password err: {0}")]
    Hashing(#[source] PasswordError),
    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: RepoError,
    },
    /// Repository failure passed through without added context.
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error("password compare err: {0}")]
    Authentication(#[source] PasswordError),
    #[error("user not allow")]
    AccountDisabled,
    #[error("gen token sign err: {0}")]
    Token(#[source] TokenError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::Persistence { source, .. } | ServiceError::Repository(source) => {
                source.is_not_found()
            }
            _ => false,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn persistence(context: impl Into<String>) -> impl FnOnce(RepoError) -> ServiceError {
    let context = context.into();
    move |source| ServiceError::Persistence { context, source }
}

/// Account operations between the HTTP layer and the user repository.
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenIssuer>,
    // compared against on unknown emails so login timing does not reveal accounts
    dummy_hash: Option<String>,
}

impl UserService {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        let dummy_hash = hasher.encrypt(&Uuid::new_v4().to_string()).ok();
        Self {
            repo,
            hasher,
            tokens,
            dummy_hash,
        }
    }

    fn new_user(&self, email: &str, password: &str) -> ServiceResult<NewUser> {
        let hash = self.hasher.encrypt(password).map_err(ServiceError::Hashing)?;
        Ok(NewUser {
            uuid: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            password: hash,
            name: None,
            status: None,
        })
    }

    #[instrument(skip(self, password))]
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        name: &str,
        status: i64,
    ) -> ServiceResult<()> {
        let mut user = self.new_user(email, password)?;
        user.name = Some(name.to_owned());
        user.status = Some(status);
        let id = self.repo.create(user).await.map_err(persistence("create user"))?;
        info!(user_id = id, "user created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> ServiceResult<()> {
        self.repo
            .delete(id)
            .await
            .map_err(persistence("delete user fail"))?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> ServiceResult<()> {
        let user = self.new_user(email, password)?;
        let id = self.repo.create(user).await.map_err(persistence("create user"))?;
        info!(user_id = id, "user registered");
        Ok(())
    }

    /// Checks the credentials and returns a signed session token.
    #[instrument(skip(self, password))]
    pub async fn email_login(&self, email: &str, password: &str) -> ServiceResult<String> {
        let user = match self.get_user_by_email(email).await {
            Ok(user) => user,
            Err(e) => {
                if let (true, Some(hash)) = (e.is_not_found(), &self.dummy_hash) {
                    let _ = self.hasher.compare(hash, password);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.hasher.compare(&user.password, password) {
            warn!(user_id = user.id, "login invalid password");
            return Err(ServiceError::Authentication(e));
        }

        if !user.is_active() {
            warn!(user_id = user.id, "login rejected for disabled user");
            return Err(ServiceError::AccountDisabled);
        }

        let token = self
            .tokens
            .sign(&TokenContext::from(&user), "")
            .map_err(ServiceError::Token)?;
        info!(user_id = user.id, "user logged in");
        Ok(token)
    }

    #[instrument(skip(self, update))]
    pub async fn update_user(&self, id: i64, update: UserUpdate) -> ServiceResult<()> {
        self.repo.update(id, update).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: i64) -> ServiceResult<User> {
        self.repo
            .get_user_by_id(id)
            .await
            .map_err(persistence(format!("get user info err from db by id: {id}")))
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_phone(&self, phone: i64) -> ServiceResult<User> {
        self.repo
            .get_user_by_phone(phone)
            .await
            .map_err(persistence(format!("get user info err from db by phone: {phone}")))
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_email(&self, email: &str) -> ServiceResult<User> {
        self.repo
            .get_user_by_email(email)
            .await
            .map_err(persistence(format!("get user info err from db by email: {email}")))
    }

    /// Creates `email` as an active admin unless it exists, then sets the admin flag.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(&self, email: &str, password: &str) -> ServiceResult<()> {
        let id = match self.get_user_by_email(email).await {
            Ok(user) if user.is_admin => return Ok(()),
            Ok(user) => user.id,
            Err(e) if e.is_not_found() => {
                self.create(email, password, "admin", 1).await?;
                self.get_user_by_email(email).await?.id
            }
            Err(e) => return Err(e),
        };
        self.update_user(
            id,
            UserUpdate {
                is_admin: Some(true),
                ..Default::default()
            },
        )
        .await?;
        info!(user_id = id, "admin account ensured");
        Ok(())
    }

    pub async fn get_user_list(&self) -> ServiceResult<Vec<UserSummary>> {
        Ok(self.repo.get_user_list().await?)
    }

    /// Releases the repository. Call once, after in-flight requests have drained.
    pub async fn close(&self) {
        self.repo.close().await;
        info!("user repository closed");
    }
}
