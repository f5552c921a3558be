use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::domain::{CourierId, OfficeId, Role, User, UserId};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

/// The authenticated caller, as recovered from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
    pub office_id: Option<OfficeId>,
    pub courier_id: Option<CourierId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    office_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    courier_id: Option<String>,
    iat: i64,
    exp: i64,
}

pub fn mint_token(cfg: &SessionConfig, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: user.id.0.clone(),
        role: user.role,
        office_id: user.office_id.as_ref().map(|id| id.0.clone()),
        courier_id: user.courier_id.as_ref().map(|id| id.0.clone()),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
}

/// Checks signature and expiry.
pub fn verify_token(cfg: &SessionConfig, token: &str) -> Result<Session, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )?;
    let claims = data.claims;
    Ok(Session {
        user_id: UserId(claims.sub),
        role: claims.role,
        office_id: claims.office_id.map(OfficeId),
        courier_id: claims.courier_id.map(CourierId),
    })
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
