use shared::{
    domain::{OfficeId, Role},
    error::{ApiError, ErrorCode},
};
use storage::{storage_error, Repositories, StorageError};
use tracing::{error, warn};

pub mod analytics;
pub mod auth;
pub mod credentials;
pub mod directory;
pub mod locks;
pub mod packages;
pub mod session;

pub use analytics::daily_metrics;
pub use auth::{authenticate, login, profile, seed_demo_data, seed_demo_data_with};
pub use directory::{
    create_courier, create_office, get_office, list_couriers, list_couriers_by_office,
    list_offices,
};
pub use packages::{
    allowed_next, approve_package, assign_courier, create_package, list_by_courier,
    list_by_customer, list_by_office, list_pending_approval, track, update_status,
};
pub use session::{Session, SessionConfig};

use locks::{IdempotencyKeys, PackageLocks};

#[derive(Clone)]
pub struct ApiContext {
    pub repos: Repositories,
    pub sessions: SessionConfig,
    pub locks: PackageLocks,
    pub idempotency: IdempotencyKeys,
}

impl ApiContext {
    pub fn new(repos: Repositories, sessions: SessionConfig) -> Self {
        Self {
            repos,
            sessions,
            locks: PackageLocks::default(),
            idempotency: IdempotencyKeys::default(),
        }
    }
}

fn ensure_role(session: &Session, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&session.role) {
        return Ok(());
    }
    warn!(user_id = %session.user_id, role = session.role.as_str(), "role not permitted");
    Err(ApiError::new(
        ErrorCode::Forbidden,
        format!("role {} may not perform this operation", session.role.as_str()),
    ))
}

/// Admins act on every office; office managers only on their own.
fn ensure_office_scope(session: &Session, office_id: &OfficeId) -> Result<(), ApiError> {
    match session.role {
        Role::Admin => Ok(()),
        Role::OfficeManager if session.office_id.as_ref() == Some(office_id) => Ok(()),
        _ => {
            warn!(user_id = %session.user_id, %office_id, "office outside session scope");
            Err(ApiError::new(
                ErrorCode::Forbidden,
                format!("not permitted to act for office '{office_id}'"),
            ))
        }
    }
}

fn required(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("{field} is required"),
        ));
    }
    Ok(())
}

fn storage_failure(err: anyhow::Error) -> ApiError {
    match storage_error(&err) {
        Some(StorageError::NotFound { .. }) => ApiError::new(ErrorCode::NotFound, err.to_string()),
        Some(StorageError::Duplicate { .. }) => ApiError::new(ErrorCode::Conflict, err.to_string()),
        None => internal(err),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    error!(error = %err, "internal failure");
    ApiError::new(ErrorCode::Internal, err.to_string())
}
