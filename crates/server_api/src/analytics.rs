use shared::{
    domain::{Package, PackageStatus, Role},
    error::ApiError,
    protocol::DailyMetrics,
};
use storage::PackageFilter;

use crate::{ensure_role, internal, ApiContext, Session};

/// Dashboard counters over every stored package.
pub async fn daily_metrics(ctx: &ApiContext, session: &Session) -> Result<DailyMetrics, ApiError> {
    ensure_role(session, &[Role::Admin])?;
    let packages = ctx
        .repos
        .packages
        .list_packages(&PackageFilter::All)
        .await
        .map_err(internal)?;
    Ok(summarize(&packages))
}

fn summarize(packages: &[Package]) -> DailyMetrics {
    let mut delivered = 0usize;
    let mut delivery_hours = 0.0;
    let mut approval_pending = 0usize;

    for package in packages {
        if package.is_awaiting_approval() {
            approval_pending += 1;
        }
        if package.status == PackageStatus::Delivered {
            delivered += 1;
            let elapsed = package.updated_at - package.created_at;
            delivery_hours += elapsed.num_seconds() as f64 / 3600.0;
        }
    }

    DailyMetrics {
        packages_created: packages.len(),
        packages_delivered: delivered,
        packages_approval_pending: approval_pending,
        average_delivery_time_hours: (delivered > 0).then(|| delivery_hours / delivered as f64),
    }
}
