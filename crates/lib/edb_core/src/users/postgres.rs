//! PostgreSQL user store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::{NewUser, UserStore, new_public_id, new_user_id};
use crate::auth::AuthError;
use crate::auth::password::hash_password;
use crate::auth::roles::default_roles;
use crate::models::auth::{AuthUser, EMAIL_NOT_VERIFIED};

/// (id, public_id, username, email, password_hash, email_verified_at, roles, name, updated_at)
type UserRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    Vec<String>,
    String,
    i64,
);

const USER_COLUMNS: &str = "u.id::text, u.public_id, u.username, u.email, u.password_hash, \
     u.email_verified_at, u.roles, u.name, u.updated_at";

fn into_user(row: UserRow) -> AuthUser {
    let (id, public_id, username, email, password_hash, email_verified_at, roles, name, updated_at) =
        row;
    AuthUser {
        id,
        public_id,
        username,
        email,
        password_hash,
        email_verified_at,
        roles,
        name,
        updated_at,
    }
}

/// Maps unique-constraint violations to [`AuthError::AccountExists`].
fn conflict(e: sqlx::Error) -> AuthError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AuthError::AccountExists,
        _ => AuthError::DbError(e),
    }
}

/// Ids that are not UUIDs cannot name a user.
fn parse_id(id: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(id).map_err(|_| AuthError::UserNotFound)
}

/// Runs the embedded migrations under `edb_core/migrations/`.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, predicate: &str, value: &str) -> Result<AuthUser, AuthError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE {predicate}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(into_user).ok_or(AuthError::UserNotFound)
    }

    async fn insert(
        &self,
        username: &str,
        email: &str,
        password_hash: Option<&str>,
        email_verified_at: i64,
        name: &str,
    ) -> Result<AuthUser, AuthError> {
        let now = Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO users AS u (id, public_id, username, email, password_hash, \
             email_verified_at, roles, name, created_at, updated_at) \
             VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(new_user_id())
            .bind(new_public_id())
            .bind(username)
            .bind(email.to_lowercase())
            .bind(password_hash)
            .bind(email_verified_at)
            .bind(default_roles())
            .bind(name)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict)?;
        Ok(into_user(row))
    }

    /// Runs an `UPDATE users u SET <assignments>` that also bumps `updated_at`.
    /// `$1` is the user id and `$2` the timestamp; further binds follow.
    async fn update(
        &self,
        id: &str,
        assignments: &str,
        binds: &[&str],
    ) -> Result<AuthUser, AuthError> {
        let id = parse_id(id)?;
        let sql = format!(
            "UPDATE users u SET {assignments}, updated_at = $2 WHERE u.id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let mut query = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(Utc::now().timestamp());
        for value in binds {
            query = query.bind(*value);
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(conflict)?;
        row.map(into_user).ok_or(AuthError::UserNotFound)
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: &str) -> Result<AuthUser, AuthError> {
        let id = parse_id(id)?;
        self.find_where("u.id = $1::uuid", &id.to_string()).await
    }

    async fn find_by_public_id(&self, public_id: &str) -> Result<AuthUser, AuthError> {
        self.find_where("u.public_id = $1", public_id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<AuthUser, AuthError> {
        self.find_where("lower(u.username) = lower($1)", username)
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<AuthUser, AuthError> {
        self.find_where("lower(u.email) = lower($1)", email).await
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<AuthUser, AuthError> {
        self.find_where(
            "u.id = (SELECT k.user_id FROM api_keys k WHERE k.key = $1)",
            api_key,
        )
        .await
    }

    async fn create_from_signup(&self, new: &NewUser) -> Result<AuthUser, AuthError> {
        let password_hash = if new.password.is_empty() {
            None
        } else {
            Some(hash_password(&new.password)?)
        };
        let user = self
            .insert(
                &new.username,
                &new.email,
                password_hash.as_deref(),
                EMAIL_NOT_VERIFIED,
                &new.name,
            )
            .await?;
        info!(user_id = %user.id, "created user from signup");
        Ok(user)
    }

    async fn create_from_oauth2(&self, name: &str, email: &str) -> Result<AuthUser, AuthError> {
        match self.find_by_email(email).await {
            Err(AuthError::UserNotFound) => {}
            other => return other,
        }
        let now = Utc::now().timestamp();
        match self.insert(email, email, None, now, name).await {
            Ok(user) => {
                info!(user_id = %user.id, "created user from external identity");
                Ok(user)
            }
            // Lost a race with a concurrent sign-in for the same address.
            Err(AuthError::AccountExists) => self.find_by_email(email).await,
            Err(e) => Err(e),
        }
    }

    async fn set_email_verified(&self, id: &str) -> Result<AuthUser, AuthError> {
        self.update(id, "email_verified_at = $2", &[]).await
    }

    async fn set_password(&self, id: &str, password: &str) -> Result<AuthUser, AuthError> {
        let hash = if password.is_empty() {
            String::new()
        } else {
            hash_password(password)?
        };
        self.update(id, "password_hash = NULLIF($3, '')", &[hash.as_str()])
            .await
    }

    async fn set_email(&self, id: &str, email: &str) -> Result<AuthUser, AuthError> {
        let email = email.to_lowercase();
        self.update(id, "email = $3", &[email.as_str()]).await
    }

    async fn set_user_info(
        &self,
        id: &str,
        username: &str,
        name: &str,
    ) -> Result<AuthUser, AuthError> {
        self.update(id, "username = $3, name = $4", &[username, name])
            .await
    }

    async fn set_roles(&self, id: &str, roles: &[String]) -> Result<AuthUser, AuthError> {
        let id = parse_id(id)?;
        let sql = format!(
            "UPDATE users u SET roles = $3, updated_at = $2 WHERE u.id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(Utc::now().timestamp())
            .bind(roles)
            .fetch_optional(&self.pool)
            .await?;
        row.map(into_user).ok_or(AuthError::UserNotFound)
    }

    async fn users(&self, offset: u64, records: u64) -> Result<Vec<AuthUser>, AuthError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.id LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(i64::try_from(records).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_user).collect())
    }

    async fn count(&self) -> Result<u64, AuthError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn delete_by_public_id(&self, public_id: &str) -> Result<(), AuthError> {
        let deleted = sqlx::query("DELETE FROM users WHERE public_id = $1")
            .bind(public_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AuthError::UserNotFound);
        }
        info!(public_id, "deleted user");
        Ok(())
    }
}
