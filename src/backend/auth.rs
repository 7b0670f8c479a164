use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Session, User, to_millis};

use super::{Auth, SqliteBackend};

const MIN_PASSWORD_LEN: usize = 6;

/// Failures the user gets to see; everything else is an operator problem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("an account with this email already exists")]
    EmailTaken,
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(AuthError::InvalidEmail),
    }
}

fn hash_password(password: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    format!("{}${}", URL_SAFE_NO_PAD.encode(salt), URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, _)) = stored.split_once('$') else {
        return false;
    };
    let Ok(salt) = URL_SAFE_NO_PAD.decode(salt) else {
        return false;
    };
    hash_password(password, &salt) == stored
}

fn new_access_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

impl SqliteBackend {
    async fn session_for(&self, access_token: &str) -> anyhow::Result<Option<Session>> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT users.id,users.email FROM sessions JOIN users ON users.id=sessions.user_id \
             WHERE sessions.access_token=?",
        )
        .bind(access_token)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(|(id, email)| {
            Ok(Session {
                access_token: access_token.to_owned(),
                user: User { id: Uuid::parse_str(&id)?, email },
            })
        })
        .transpose()
    }
}

#[async_trait]
impl Auth for SqliteBackend {
    async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let id = Uuid::now_v7();
        let salt: [u8; 16] = rand::random();
        let result = sqlx::query(
            "INSERT INTO users (id,email,password_hash,created_at) VALUES (?,?,?,?) \
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(&email)
        .bind(hash_password(password, &salt))
        .bind(to_millis(OffsetDateTime::now_utc()))
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::EmailTaken);
        }

        info!(%id, %email, "user signed up");
        Ok(User { id, email })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id,password_hash FROM users WHERE email=?")
                .bind(&email)
                .fetch_optional(&self.db_pool)
                .await?;

        let Some((id, password_hash)) = row else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &password_hash) {
            warn!(%email, "rejected sign-in");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = new_access_token();
        sqlx::query("INSERT INTO sessions (access_token,user_id,created_at) VALUES (?,?,?)")
            .bind(&access_token)
            .bind(&id)
            .bind(to_millis(OffsetDateTime::now_utc()))
            .execute(&self.db_pool)
            .await?;

        let user = User { id: Uuid::parse_str(&id).map_err(anyhow::Error::from)?, email };
        info!(user_id = %user.id, "user signed in");
        Ok(Session { access_token, user })
    }

    async fn sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sessions WHERE access_token=?")
            .bind(access_token)
            .execute(&self.db_pool)
            .await?;

        let channel = self
            .auth_channels
            .lock()
            .map_err(|_| anyhow::anyhow!("auth channel registry poisoned"))?
            .remove(access_token);
        if let Some(tx) = channel {
            tx.send_replace(None);
        }
        Ok(())
    }

    async fn get_user(&self, access_token: &str) -> anyhow::Result<Option<User>> {
        Ok(self.session_for(access_token).await?.map(|session| session.user))
    }

    async fn on_auth_state_change(
        &self,
        access_token: &str,
    ) -> anyhow::Result<watch::Receiver<Option<Session>>> {
        let current = self.session_for(access_token).await?;
        let Some(current) = current else {
            // unknown token: signed out from the start, nothing will ever change
            return Ok(watch::channel(None).1);
        };

        let mut channels = self
            .auth_channels
            .lock()
            .map_err(|_| anyhow::anyhow!("auth channel registry poisoned"))?;
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let tx = channels
            .entry(access_token.to_owned())
            .or_insert_with(|| watch::channel(Some(current)).0);
        Ok(tx.subscribe())
    }
}
