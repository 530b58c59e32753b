use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{
    jwt::JwtKeys,
    memory::InMemoryUserStore,
    password::{PasswordError, PasswordHasher},
    repo::{PgUserStore, UserStore},
};
use crate::config::{AppConfig, StoreKind};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub hasher: PasswordHasher,
    pub keys: JwtKeys,
    /// Hash verified against when a login names an unknown user, so both
    /// failure paths pay the same Argon2 cost.
    pub decoy_hash: Arc<str>,
}

impl AppState {
    /// Connects the configured store, runs migrations for Postgres and builds the keys.
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match config.store {
            StoreKind::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres store")?;
                let db = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;

                if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                    tracing::warn!(error = %e, "migration failed; continuing");
                }
                Arc::new(PgUserStore::new(db))
            }
            StoreKind::Memory => {
                tracing::warn!("using in-memory user store; accounts are lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };

        let keys = JwtKeys::from_config(&config.jwt);
        Self::from_parts(store, PasswordHasher::new(), keys)
            .context("hash decoy password")
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        keys: JwtKeys,
    ) -> Result<Self, PasswordError> {
        let decoy_hash = hasher.hash("decoy-password-never-matches")?.into();
        Ok(Self {
            store,
            hasher,
            keys,
            decoy_hash,
        })
    }

    /// State over an empty in-memory store, for handler tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::for_tests();
        let keys = JwtKeys::from_config(&config.jwt);
        Self::from_parts(
            Arc::new(InMemoryUserStore::new()),
            PasswordHasher::new(),
            keys,
        )
        .expect("decoy hash")
    }
}
