use shared::{
    domain::UserProfile,
    error::{ApiError, ErrorCode},
    protocol::{LoginRequest, LoginResponse},
};
use storage::{
    seed::{self, SeedReport, DEMO_PASSWORD},
    Repositories,
};
use tracing::{debug, info, warn};

use crate::{
    credentials::{hash_password_with, verify_password, DEFAULT_ITERATIONS},
    internal, required,
    session::{mint_token, verify_token},
    ApiContext, Session,
};

/// Exchanges a username and password for a signed session token.
pub async fn login(ctx: &ApiContext, request: LoginRequest) -> Result<LoginResponse, ApiError> {
    required(&request.username, "username")?;
    required(&request.password, "password")?;

    let username = request.username.trim();
    let user = ctx
        .repos
        .users
        .find_user_by_username(username)
        .await
        .map_err(internal)?;

    let Some(user) = user.filter(|user| verify_password(&request.password, &user.password_hash))
    else {
        warn!(username, "login rejected");
        return Err(ApiError::new(
            ErrorCode::InvalidCredentials,
            "invalid username or password",
        ));
    };

    if user.role.requires_office() && user.office_id.is_none() {
        warn!(user_id = %user.id, role = user.role.as_str(), "login rejected: no office");
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "account is not linked to an office",
        ));
    }

    let token = mint_token(&ctx.sessions, &user).map_err(|err| internal(err.into()))?;
    info!(user_id = %user.id, role = user.role.as_str(), "user logged in");
    Ok(LoginResponse {
        user: user.profile(),
        token,
    })
}

/// Resolves a bearer token into the caller's session.
pub fn authenticate(ctx: &ApiContext, token: &str) -> Result<Session, ApiError> {
    verify_token(&ctx.sessions, token).map_err(|err| {
        debug!(error = %err, "session token rejected");
        ApiError::new(ErrorCode::Unauthorized, "missing or invalid session token")
    })
}

pub async fn profile(ctx: &ApiContext, session: &Session) -> Result<UserProfile, ApiError> {
    let user = ctx
        .repos
        .users
        .get_user(&session.user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "account no longer exists"))?;
    Ok(user.profile())
}

/// Loads the demo hubs, couriers, accounts and parcel. Every account's
/// password is [`DEMO_PASSWORD`].
pub async fn seed_demo_data(repos: &Repositories) -> anyhow::Result<SeedReport> {
    seed_demo_data_with(repos, DEFAULT_ITERATIONS).await
}

pub async fn seed_demo_data_with(
    repos: &Repositories,
    iterations: u32,
) -> anyhow::Result<SeedReport> {
    let hash = hash_password_with(DEMO_PASSWORD, iterations)?;
    let report = seed::load(repos, &seed::demo_data(&hash)).await?;
    info!(inserted = report.inserted, skipped = report.skipped, "demo data seeded");
    Ok(report)
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
