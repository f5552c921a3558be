use serde::{Deserialize, Serialize};

use crate::{
    domain::{Contact, CourierId, Dimensions, OfficeId, Package, PackageStatus, UserProfile},
    lifecycle::TimelineStep,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePackageRequest {
    pub sender: Contact,
    pub receiver: Contact,
    pub weight: f64,
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_id: Option<OfficeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PackageStatus,
    /// Office the package arrived at; only honoured for `AT_HUB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_id: Option<OfficeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignCourierRequest {
    pub courier_id: CourierId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateOfficeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<OfficeId>,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    pub office_id: OfficeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingView {
    pub package: Package,
    pub timeline: Vec<TimelineStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionsResponse {
    pub current: PackageStatus,
    pub allowed: Vec<PackageStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub packages_created: usize,
    pub packages_delivered: usize,
    pub packages_approval_pending: usize,
    /// Mean created-to-delivered time in hours; absent until something is delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_delivery_time_hours: Option<f64>,
}
