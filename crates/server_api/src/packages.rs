use chrono::{DateTime, Utc};
use shared::{
    domain::{CourierId, Office, OfficeId, Package, PackageId, PackageStatus, Role},
    error::{ApiError, ErrorCode},
    lifecycle::{allowed_transitions, timeline},
    protocol::{CreatePackageRequest, TrackingView, TransitionsResponse, UpdateStatusRequest},
};
use storage::{storage_error, PackageFilter, StorageError};
use tracing::info;

use crate::{
    ensure_office_scope, ensure_role, internal, required, storage_failure, ApiContext, Session,
};

const TRACKING_NUMBER_ATTEMPTS: i64 = 5;

/// Public lookup by the customer-facing tracking number.
pub async fn track(ctx: &ApiContext, tracking_number: &str) -> Result<TrackingView, ApiError> {
    let package = ctx
        .repos
        .packages
        .find_by_tracking_number(tracking_number)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "package not found"))?;
    let timeline = timeline(package.status);
    Ok(TrackingView { package, timeline })
}

pub async fn list_by_customer(ctx: &ApiContext, session: &Session) -> Result<Vec<Package>, ApiError> {
    ensure_role(session, &[Role::Customer])?;
    ctx.repos
        .packages
        .list_packages(&PackageFilter::Customer(session.user_id.clone()))
        .await
        .map_err(internal)
}

/// Approved packages handled by `office_id`.
pub async fn list_by_office(
    ctx: &ApiContext,
    session: &Session,
    office_id: &OfficeId,
) -> Result<Vec<Package>, ApiError> {
    ensure_role(session, &[Role::OfficeManager, Role::Admin])?;
    ensure_office_scope(session, office_id)?;
    load_office(ctx, office_id).await?;

    let mut packages = ctx
        .repos
        .packages
        .list_packages(&PackageFilter::Office(office_id.clone()))
        .await
        .map_err(internal)?;
    packages.retain(Package::is_visible_to_offices);
    Ok(packages)
}

pub async fn list_by_courier(ctx: &ApiContext, session: &Session) -> Result<Vec<Package>, ApiError> {
    ensure_role(session, &[Role::Courier])?;
    let courier_id = session.courier_id.clone().ok_or_else(|| {
        ApiError::new(
            ErrorCode::Forbidden,
            "courier account is not linked to a roster entry",
        )
    })?;
    ctx.repos
        .packages
        .list_packages(&PackageFilter::Courier(courier_id))
        .await
        .map_err(internal)
}

pub async fn list_pending_approval(
    ctx: &ApiContext,
    session: &Session,
) -> Result<Vec<Package>, ApiError> {
    ensure_role(session, &[Role::Admin])?;
    ctx.repos
        .packages
        .list_packages(&PackageFilter::AwaitingApproval)
        .await
        .map_err(internal)
}

/// Registers a package awaiting admin approval. A repeated `idempotency_key`
/// from the same user returns the package created the first time.
pub async fn create_package(
    ctx: &ApiContext,
    session: &Session,
    request: CreatePackageRequest,
    idempotency_key: Option<&str>,
) -> Result<Package, ApiError> {
    ensure_role(session, &[Role::Customer, Role::Admin])?;
    validate_new_package(&request)?;
    if let Some(office_id) = &request.office_id {
        find_office(ctx, office_id).await?.ok_or_else(|| {
            ApiError::new(
                ErrorCode::Validation,
                format!("unknown office '{office_id}'"),
            )
        })?;
    }

    let Some(key) = idempotency_key.map(str::trim).filter(|key| !key.is_empty()) else {
        return insert_new_package(ctx, session, request).await;
    };

    let mut keys = ctx.idempotency.lock().await;
    if let Some(existing) = keys.get(&session.user_id, key) {
        info!(package_id = %existing, "idempotent create replayed");
        return load_package(ctx, &existing).await;
    }
    let package = insert_new_package(ctx, session, request).await?;
    keys.remember(&session.user_id, key, package.id.clone());
    Ok(package)
}

fn validate_new_package(request: &CreatePackageRequest) -> Result<(), ApiError> {
    required(&request.sender.name, "sender name")?;
    required(&request.sender.address, "sender address")?;
    required(&request.receiver.name, "receiver name")?;
    required(&request.receiver.address, "receiver address")?;
    if !(request.weight.is_finite() && request.weight > 0.0) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "weight must be a positive number",
        ));
    }
    if !request.dimensions.is_positive() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "dimensions must be positive numbers",
        ));
    }
    Ok(())
}

async fn insert_new_package(
    ctx: &ApiContext,
    session: &Session,
    request: CreatePackageRequest,
) -> Result<Package, ApiError> {
    let now = Utc::now();
    let current_location = request
        .current_location
        .filter(|location| !location.trim().is_empty())
        .unwrap_or_else(|| request.sender.address.clone());
    let customer_id = (session.role == Role::Customer).then(|| session.user_id.clone());

    let mut package = Package {
        id: PackageId::generate(),
        tracking_number: tracking_number(now, 0),
        sender: request.sender,
        receiver: request.receiver,
        weight: request.weight,
        dimensions: request.dimensions,
        status: PackageStatus::Pending,
        current_location,
        created_at: now,
        updated_at: now,
        assigned_courier: None,
        remarks: request.remarks.filter(|remarks| !remarks.trim().is_empty()),
        admin_approved: false,
        customer_id,
        office_id: request.office_id,
    };

    for attempt in 0..TRACKING_NUMBER_ATTEMPTS {
        package.tracking_number = tracking_number(now, attempt);
        match ctx.repos.packages.insert_package(&package).await {
            Ok(()) => {
                info!(
                    package_id = %package.id,
                    tracking_number = %package.tracking_number,
                    "package created"
                );
                return Ok(package);
            }
            Err(err) if matches!(storage_error(&err), Some(StorageError::Duplicate { .. })) => {
                package.id = PackageId::generate();
            }
            Err(err) => return Err(internal(err)),
        }
    }

    Err(ApiError::new(
        ErrorCode::Conflict,
        "could not allocate a unique tracking number",
    ))
}

fn tracking_number(now: DateTime<Utc>, attempt: i64) -> String {
    format!("TN{}", now.timestamp_millis() + attempt)
}

/// Moves a package along the lifecycle table. Reaching `AT_HUB` with an
/// office hands the package over to that office.
pub async fn update_status(
    ctx: &ApiContext,
    session: &Session,
    id: &PackageId,
    request: UpdateStatusRequest,
) -> Result<Package, ApiError> {
    ensure_role(session, &[Role::OfficeManager, Role::Courier, Role::Admin])?;
    let _guard = ctx.locks.lock(id).await;
    let mut package = load_package(ctx, id).await?;

    let arrival_office = match (&request.office_id, request.status) {
        (Some(office_id), PackageStatus::AtHub) => Some(load_office(ctx, office_id).await?),
        _ => None,
    };
    ensure_handles(session, &package, arrival_office.as_ref())?;

    if !package.status.can_transition_to(request.status) {
        let reason = if package.is_awaiting_approval() {
            "package is awaiting admin approval".to_string()
        } else {
            format!(
                "cannot move package from {} to {}",
                package.status, request.status
            )
        };
        return Err(ApiError::new(ErrorCode::InvalidTransition, reason));
    }

    let previous = package.status;
    package.status = request.status;
    if let Some(office) = arrival_office {
        if package.office_id.as_ref() != Some(&office.id) {
            package.assigned_courier = None;
        }
        package.office_id = Some(office.id);
        package.current_location = office.name;
    }
    if let Some(remarks) = request.remarks.filter(|remarks| !remarks.trim().is_empty()) {
        package.remarks = Some(remarks);
    }
    package.touch(Utc::now());
    save_package(ctx, &package).await?;

    info!(
        package_id = %package.id,
        from = %previous,
        to = %package.status,
        user_id = %session.user_id,
        "package status updated"
    );
    Ok(package)
}

/// Whether `session` may act on `package`. Managers act on packages of their
/// office, and may take in a package travelling between hubs by recording its
/// arrival at their office; couriers act on packages assigned to them.
fn ensure_handles(
    session: &Session,
    package: &Package,
    arrival_office: Option<&Office>,
) -> Result<(), ApiError> {
    let permitted = match session.role {
        Role::Admin => true,
        Role::OfficeManager => {
            let own = session.office_id.as_ref();
            let hand_off = package.status == PackageStatus::InTransit
                && package.assigned_courier.is_none()
                && arrival_office.map(|office| &office.id) == own;
            own.is_some() && (package.office_id.as_ref() == own || hand_off)
        }
        Role::Courier => {
            session.courier_id.is_some()
                && package.assigned_courier.as_ref() == session.courier_id.as_ref()
        }
        Role::Customer => false,
    };
    if permitted {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::Forbidden,
            format!("package '{}' is not handled by this account", package.id),
        ))
    }
}

/// Releases a pending package into the lifecycle. Re-approving a
/// `REGISTERED` package is accepted; anything further along is not rewound.
pub async fn approve_package(
    ctx: &ApiContext,
    session: &Session,
    id: &PackageId,
) -> Result<Package, ApiError> {
    ensure_role(session, &[Role::Admin])?;
    let _guard = ctx.locks.lock(id).await;
    let mut package = load_package(ctx, id).await?;

    if !matches!(
        package.status,
        PackageStatus::Pending | PackageStatus::Registered
    ) {
        return Err(ApiError::new(
            ErrorCode::InvalidTransition,
            format!("package is already {}", package.status),
        ));
    }

    package.admin_approved = true;
    package.status = PackageStatus::Registered;
    package.touch(Utc::now());
    save_package(ctx, &package).await?;

    info!(package_id = %package.id, user_id = %session.user_id, "package approved");
    Ok(package)
}

/// Hands an approved package waiting at a hub to a courier of that hub.
pub async fn assign_courier(
    ctx: &ApiContext,
    session: &Session,
    id: &PackageId,
    courier_id: &CourierId,
) -> Result<Package, ApiError> {
    ensure_role(session, &[Role::OfficeManager, Role::Admin])?;
    let _guard = ctx.locks.lock(id).await;
    let mut package = load_package(ctx, id).await?;
    ensure_handles(session, &package, None)?;

    if !package.admin_approved || package.status != PackageStatus::AtHub {
        return Err(ApiError::new(
            ErrorCode::Conflict,
            format!(
                "couriers are assigned to approved packages at a hub; package is {}",
                package.status
            ),
        ));
    }

    let courier = ctx
        .repos
        .couriers
        .get_courier(courier_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                format!("courier '{courier_id}' not found"),
            )
        })?;
    if package.office_id.as_ref() != Some(&courier.office_id) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!(
                "courier '{}' belongs to office '{}', not the package's office",
                courier.id, courier.office_id
            ),
        ));
    }

    package.assigned_courier = Some(courier.id);
    package.touch(Utc::now());
    save_package(ctx, &package).await?;

    info!(package_id = %package.id, %courier_id, "courier assigned");
    Ok(package)
}

/// The status choices a dashboard offers for a package.
pub async fn allowed_next(
    ctx: &ApiContext,
    session: &Session,
    id: &PackageId,
) -> Result<TransitionsResponse, ApiError> {
    ensure_role(session, &[Role::OfficeManager, Role::Courier, Role::Admin])?;
    let package = load_package(ctx, id).await?;
    ensure_handles(session, &package, None)?;
    if package.is_awaiting_approval() && session.role != Role::Admin {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "package is awaiting admin approval",
        ));
    }
    Ok(TransitionsResponse {
        current: package.status,
        allowed: allowed_transitions(package.status).to_vec(),
    })
}

async fn load_package(ctx: &ApiContext, id: &PackageId) -> Result<Package, ApiError> {
    ctx.repos
        .packages
        .get_package(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("package '{id}' not found")))
}

async fn save_package(ctx: &ApiContext, package: &Package) -> Result<(), ApiError> {
    ctx.repos
        .packages
        .update_package(package)
        .await
        .map_err(storage_failure)
}

async fn find_office(ctx: &ApiContext, id: &OfficeId) -> Result<Option<Office>, ApiError> {
    ctx.repos.offices.get_office(id).await.map_err(internal)
}

async fn load_office(ctx: &ApiContext, id: &OfficeId) -> Result<Office, ApiError> {
    find_office(ctx, id)
        .await?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("office '{id}' not found")))
}

#[cfg(test)]
#[path = "tests/packages_tests.rs"]
mod tests;
