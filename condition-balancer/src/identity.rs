use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use common_types::AnonymousIdentity;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

pub const TOKEN_PREFIX: &str = "anon_";
const TOKEN_LENGTH: usize = 40;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("no bearer token in request")]
    MissingToken,
    #[error("bearer token is not valid")]
    InvalidToken,
    #[error("identity store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for IdentityError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => IdentityError::InvalidToken,
            _ => {
                tracing::error!("identity store error: {}", e);
                IdentityError::Unavailable(e.to_string())
            }
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub id: Uuid,
}

/// Issues opaque anonymous identities and resolves bearer tokens back to them.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<AnonymousIdentity, IdentityError>;

    async fn authenticate(&self, token: &str) -> Result<Participant, IdentityError>;
}

pub fn generate_token() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    format!("{TOKEN_PREFIX}{random}")
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Pulls the token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, IdentityError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(IdentityError::MissingToken)?
        .to_str()
        .map_err(|_| IdentityError::InvalidToken)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(IdentityError::InvalidToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(IdentityError::InvalidToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(IdentityError::MissingToken);
    }
    Ok(token)
}

pub struct PgIdentityProvider {
    pool: PgPool,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    #[instrument(skip_all)]
    async fn sign_in_anonymously(&self) -> Result<AnonymousIdentity, IdentityError> {
        let participant_id = Uuid::now_v7();
        let token = generate_token();

        sqlx::query("INSERT INTO participants (id, token_hash) VALUES ($1, $2)")
            .bind(participant_id)
            .bind(hash_token(&token))
            .execute(&self.pool)
            .await?;

        Ok(AnonymousIdentity {
            participant_id,
            token,
        })
    }

    #[instrument(skip_all)]
    async fn authenticate(&self, token: &str) -> Result<Participant, IdentityError> {
        let id: Uuid = sqlx::query_scalar("SELECT id FROM participants WHERE token_hash = $1")
            .bind(hash_token(token))
            .fetch_one(&self.pool)
            .await?;

        Ok(Participant { id })
    }
}

/// Keeps token hashes in process memory. Identities die with the process.
#[derive(Clone, Default)]
pub struct MemoryIdentityProvider {
    participants: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in_anonymously(&self) -> Result<AnonymousIdentity, IdentityError> {
        let participant_id = Uuid::now_v7();
        let token = generate_token();

        self.participants
            .write()
            .map_err(|_| IdentityError::Unavailable("poisoned identity lock".to_string()))?
            .insert(hash_token(&token), participant_id);

        Ok(AnonymousIdentity {
            participant_id,
            token,
        })
    }

    async fn authenticate(&self, token: &str) -> Result<Participant, IdentityError> {
        let participants = self
            .participants
            .read()
            .map_err(|_| IdentityError::Unavailable("poisoned identity lock".to_string()))?;

        participants
            .get(&hash_token(token))
            .map(|id| Participant { id: *id })
            .ok_or(IdentityError::InvalidToken)
    }
}
