use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::users::{
    model::{NewUser, User, UserSummary, UserUpdate, DEFAULT_STATUS},
    repo::{RepoError, RepoResult, UserRepository},
};

#[derive(Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, User>,
    closed: bool,
}

impl Table {
    /// Mirrors a closed `PgPool`: every call after `close` fails.
    fn ensure_open(&self) -> RepoResult<()> {
        if self.closed {
            return Err(RepoError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

/// In-process repository with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct InMemoryUserRepo {
    table: RwLock<Table>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_by<F>(table: &Table, pred: F) -> RepoResult<User>
where
    F: Fn(&User) -> bool,
{
    table
        .rows
        .values()
        .find(|&u| pred(u))
        .cloned()
        .ok_or(RepoError::NotFound)
}

#[async_trait]
impl UserRepository for InMemoryUserRepo {
    async fn create(&self, user: NewUser) -> RepoResult<i64> {
        let mut table = self.table.write().await;
        table.ensure_open()?;
        if table.rows.values().any(|u| u.email == user.email || u.uuid == user.uuid) {
            return Err(RepoError::Conflict);
        }
        table.next_id += 1;
        let id = table.next_id;
        let now = OffsetDateTime::now_utc();
        table.rows.insert(
            id,
            User {
                id,
                uuid: user.uuid,
                name: user.name.unwrap_or_default(),
                username: String::new(),
                email: user.email,
                phone: None,
                avatar: String::new(),
                password: user.password,
                status: user.status.unwrap_or(DEFAULT_STATUS),
                is_admin: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let mut table = self.table.write().await;
        table.ensure_open()?;
        table.rows.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> RepoResult<()> {
        let mut table = self.table.write().await;
        table.ensure_open()?;
        if let Some(email) = &update.email {
            if table.rows.values().any(|u| u.id != id && &u.email == email) {
                return Err(RepoError::Conflict);
            }
        }
        if let Some(phone) = update.phone {
            if table.rows.values().any(|u| u.id != id && u.phone == Some(phone)) {
                return Err(RepoError::Conflict);
            }
        }
        let user = table.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(v) = update.name {
            user.name = v;
        }
        if let Some(v) = update.username {
            user.username = v;
        }
        if let Some(v) = update.email {
            user.email = v;
        }
        if let Some(v) = update.phone {
            user.phone = Some(v);
        }
        if let Some(v) = update.avatar {
            user.avatar = v;
        }
        if let Some(v) = update.status {
            user.status = v;
        }
        if let Some(v) = update.is_admin {
            user.is_admin = v;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn get_user_by_id(&self, id: i64) -> RepoResult<User> {
        let table = self.table.read().await;
        table.ensure_open()?;
        table.rows.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_user_by_phone(&self, phone: i64) -> RepoResult<User> {
        let table = self.table.read().await;
        table.ensure_open()?;
        find_by(&table, |u| u.phone == Some(phone))
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
        let table = self.table.read().await;
        table.ensure_open()?;
        find_by(&table, |u| u.email == email)
    }

    async fn get_user_list(&self) -> RepoResult<Vec<UserSummary>> {
        let table = self.table.read().await;
        table.ensure_open()?;
        Ok(table.rows.values().map(UserSummary::from).collect())
    }

    async fn close(&self) {
        let mut table = self.table.write().await;
        table.rows.clear();
        table.closed = true;
    }
}
