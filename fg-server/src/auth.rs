use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use rusqlite::{params, Connection};
use sha2::Digest;

use crate::database::{query_rows, Database};
use crate::errors::{WebError, WebResult};
use crate::models::{sqlite_current_timestamp, User};

/// Opaque bearer tokens. Only the SHA-256 of a token is stored.
pub struct AuthToken;

impl AuthToken {
    /// Mint a new token for a user, returning the only copy of the plaintext.
    pub fn issue(conn: &Connection, user_id: i64) -> rusqlite::Result<String> {
        let secret: [u8; 20] = rand::random();
        let token = hex::encode(secret);
        conn.execute(
            "INSERT INTO auth_tokens (token_hash, user_id, created_on) VALUES (?, ?, ?)",
            params![hash_token(&token), user_id, sqlite_current_timestamp()],
        )?;
        Ok(token)
    }

    /// Find whoever holds this token, if anyone.
    pub fn lookup(conn: &Connection, token: &str) -> rusqlite::Result<Option<User>> {
        Ok(query_rows(
            conn,
            "SELECT users.* FROM users
            JOIN auth_tokens ON auth_tokens.user_id = users.id
            WHERE auth_tokens.token_hash = ?",
            params![hash_token(token)],
        )?
        .pop())
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(sha2::Sha256::digest(token.as_bytes()))
}

/// Whoever is making the request. A request with no credentials is anonymous,
/// but a request with bad credentials is rejected outright.
#[derive(Debug, Clone)]
pub enum Actor {
    Anonymous,
    User(User),
}

impl Actor {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Actor::Anonymous => None,
            Actor::User(user) => Some(user.id),
        }
    }
}

/// An authenticated caller. Rejects anonymous requests.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn parse_authorization(parts: &Parts) -> WebResult<Option<&str>> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| WebError::Unauthenticated("Invalid authorization header"))?;
    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(WebError::Unauthenticated("Invalid authorization header"))?;
    if !(scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer")) {
        return Err(WebError::Unauthenticated("Unsupported authorization scheme"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(WebError::Unauthenticated("Invalid authorization header"));
    }
    Ok(Some(token))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    Database: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = parse_authorization(parts)? else {
            return Ok(Actor::Anonymous);
        };
        let db = Database::from_ref(state);
        let conn = db.pool.get()?;
        match AuthToken::lookup(&conn, token)? {
            Some(user) => Ok(Actor::User(user)),
            None => Err(WebError::Unauthenticated("Invalid token")),
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    Database: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Actor::from_request_parts(parts, state).await? {
            Actor::User(user) => Ok(CurrentUser(user)),
            Actor::Anonymous => Err(WebError::Unauthenticated(
                "Authentication credentials were not provided",
            )),
        }
    }
}
