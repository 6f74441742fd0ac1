use std::sync::Arc;

use anyhow::Context;

use axum::extract::FromRef;

use crate::{
    auth::{jwt::JwtKeys, password::Argon2Hasher},
    config::{AppConfig, Store},
    users::{
        memory::InMemoryUserRepo,
        repo::{PgUserRepo, UserRepository},
        service::UserService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserService>,
    pub keys: JwtKeys,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let repo: Arc<dyn UserRepository> = match config.store {
            Store::Postgres => {
                let db = crate::db::connect(&config).await?;
                crate::db::migrate(&db).await;
                Arc::new(PgUserRepo::new(db))
            }
            Store::Memory => {
                tracing::warn!("using in-memory user store; accounts are lost on exit");
                Arc::new(InMemoryUserRepo::new())
            }
        };
        let state = Self::from_parts(config, repo);
        if let Some(seed) = &state.config.admin {
            state
                .users
                .ensure_admin(&seed.email, &seed.password)
                .await
                .context("seed admin account")?;
        }
        Ok(state)
    }

    pub fn from_parts(config: AppConfig, repo: Arc<dyn UserRepository>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let users = Arc::new(UserService::new(
            repo,
            Arc::new(Argon2Hasher),
            Arc::new(keys.clone()),
        ));
        Self {
            config: Arc::new(config),
            users,
            keys,
        }
    }

    /// State backed by the in-memory repository.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(AppConfig::for_tests(), Arc::new(InMemoryUserRepo::new()))
    }
}
