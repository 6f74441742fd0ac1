use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::users::model::{NewUser, User, UserSummary, UserUpdate};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl RepoError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepoError::NotFound)
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Database(other),
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence port for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> RepoResult<i64>;
    async fn delete(&self, id: i64) -> RepoResult<()>;
    async fn update(&self, id: i64, update: UserUpdate) -> RepoResult<()>;
    async fn get_user_by_id(&self, id: i64) -> RepoResult<User>;
    async fn get_user_by_phone(&self, phone: i64) -> RepoResult<User>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn get_user_list(&self) -> RepoResult<Vec<UserSummary>>;
    async fn close(&self);
}

const USER_COLUMNS: &str = "id, uuid, name, username, email, phone, avatar, password, \
                            status, is_admin, created_at, updated_at";

/// Postgres-backed repository.
#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn select_where(column: &str) -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1")
}

#[async_trait]
impl UserRepository for PgUserRepo {
    async fn create(&self, user: NewUser) -> RepoResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (uuid, email, password, name, status)
            VALUES ($1, $2, $3, COALESCE($4, ''), COALESCE($5, 1))
            RETURNING id
            "#,
        )
        .bind(&user.uuid)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.name)
        .bind(user.status)
        .fetch_one(&self.db)
        .await?;
        debug!(user_id = id, uuid = %user.uuid, "user row inserted");
        Ok(id)
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn update(&self, id: i64, update: UserUpdate) -> RepoResult<()> {
        let res = sqlx::query(
            r#"
            UPDATE users SET
                name       = COALESCE($2, name),
                username   = COALESCE($3, username),
                email      = COALESCE($4, email),
                phone      = COALESCE($5, phone),
                avatar     = COALESCE($6, avatar),
                status     = COALESCE($7, status),
                is_admin   = COALESCE($8, is_admin),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.name)
        .bind(update.username)
        .bind(update.email)
        .bind(update.phone)
        .bind(update.avatar)
        .bind(update.status)
        .bind(update.is_admin)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn get_user_by_id(&self, id: i64) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(&select_where("id"))
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_user_by_phone(&self, phone: i64) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(&select_where("phone"))
            .bind(phone)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
        let user = sqlx::query_as::<_, User>(&select_where("email"))
            .bind(email)
            .fetch_one(&self.db)
            .await?;
        Ok(user)
    }

    async fn get_user_list(&self) -> RepoResult<Vec<UserSummary>> {
        let rows = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT id, name, email, status, is_admin, created_at
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn close(&self) {
        self.db.close().await;
    }
}
