//! Offices and the courier roster.

use chrono::Utc;
use shared::{
    domain::{Courier, CourierId, Office, OfficeId, Role},
    error::{ApiError, ErrorCode},
    protocol::{CreateCourierRequest, CreateOfficeRequest},
};
use tracing::info;

use crate::{ensure_office_scope, ensure_role, internal, required, storage_failure, ApiContext, Session};

pub async fn list_offices(ctx: &ApiContext, _session: &Session) -> Result<Vec<Office>, ApiError> {
    ctx.repos.offices.list_offices().await.map_err(internal)
}

pub async fn get_office(
    ctx: &ApiContext,
    _session: &Session,
    id: &OfficeId,
) -> Result<Office, ApiError> {
    ctx.repos
        .offices
        .get_office(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("office '{id}' not found")))
}

/// Registers a hub. The id is slugified from the explicit id when one is
/// given, otherwise from the name.
pub async fn create_office(
    ctx: &ApiContext,
    session: &Session,
    request: CreateOfficeRequest,
) -> Result<Office, ApiError> {
    ensure_role(session, &[Role::Admin])?;
    required(&request.name, "office name")?;

    let id = request
        .id
        .map(|id| OfficeId::slugify(id.as_str()))
        .filter(|id| !id.as_str().is_empty())
        .unwrap_or_else(|| OfficeId::slugify(&request.name));
    let id = if id.as_str().is_empty() {
        OfficeId::new(format!("office-{}", Utc::now().timestamp_millis()))
    } else {
        id
    };

    let office = Office {
        id,
        name: request.name.trim().to_string(),
        address: request.address.trim().to_string(),
        phone: request.phone.trim().to_string(),
    };
    ctx.repos
        .offices
        .insert_office(&office)
        .await
        .map_err(storage_failure)?;

    info!(office_id = %office.id, "office created");
    Ok(office)
}

pub async fn list_couriers(ctx: &ApiContext, session: &Session) -> Result<Vec<Courier>, ApiError> {
    ensure_role(session, &[Role::Admin])?;
    ctx.repos.couriers.list_couriers(None).await.map_err(internal)
}

pub async fn list_couriers_by_office(
    ctx: &ApiContext,
    session: &Session,
    office_id: &OfficeId,
) -> Result<Vec<Courier>, ApiError> {
    ensure_role(session, &[Role::OfficeManager, Role::Admin])?;
    ensure_office_scope(session, office_id)?;
    get_office(ctx, session, office_id).await?;
    ctx.repos
        .couriers
        .list_couriers(Some(office_id))
        .await
        .map_err(internal)
}

/// Adds a courier to an office roster. Managers only staff their own office.
pub async fn create_courier(
    ctx: &ApiContext,
    session: &Session,
    request: CreateCourierRequest,
) -> Result<Courier, ApiError> {
    ensure_role(session, &[Role::OfficeManager, Role::Admin])?;
    ensure_office_scope(session, &request.office_id)?;
    required(&request.name, "courier name")?;

    let known = ctx
        .repos
        .offices
        .get_office(&request.office_id)
        .await
        .map_err(internal)?;
    if known.is_none() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("unknown office '{}'", request.office_id),
        ));
    }

    let courier = Courier {
        id: CourierId::generate(),
        name: request.name.trim().to_string(),
        phone: request.phone.trim().to_string(),
        office_id: request.office_id,
    };
    ctx.repos
        .couriers
        .insert_courier(&courier)
        .await
        .map_err(storage_failure)?;

    info!(courier_id = %courier.id, office_id = %courier.office_id, "courier added");
    Ok(courier)
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
