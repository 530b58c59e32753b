use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

pub const USERNAME_CONSTRAINT: &str = "users_username_key";
pub const PHONE_CONSTRAINT: &str = "users_phone_key";

/// Unique field that rejected an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateField {
    Username,
    Phone,
    /// The backend did not say which index fired.
    Unknown,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key on {0:?}")]
    Duplicate(DuplicateField),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Maps a unique-constraint name reported by the database onto the field it guards.
    pub fn duplicate_from_constraint(constraint: Option<&str>) -> Self {
        let field = match constraint {
            Some(USERNAME_CONSTRAINT) => DuplicateField::Username,
            Some(PHONE_CONSTRAINT) => DuplicateField::Phone,
            _ => DuplicateField::Unknown,
        };
        StoreError::Duplicate(field)
    }
}

/// Persistence for user records. Implementations must enforce uniqueness of
/// `username` and `phone` atomically on `create`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    /// Find a user by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, phone, name, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, phone, name, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    /// Create a new user with an already hashed password.
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let res = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_hash, phone, name)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password_hash, phone, name, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.phone)
        .bind(&user.name)
        .fetch_one(&self.db)
        .await;

        match res {
            Ok(u) => Ok(u),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::duplicate_from_constraint(db_err.constraint()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
