use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(PackageId);
id_newtype!(UserId);
id_newtype!(OfficeId);
id_newtype!(CourierId);

impl PackageId {
    pub fn generate() -> Self {
        Self(format!("pkg_{}", Uuid::new_v4().simple()))
    }
}

impl CourierId {
    pub fn generate() -> Self {
        Self(format!("courier_{}", Uuid::new_v4().simple()))
    }
}

impl OfficeId {
    /// Lower-cases the name and joins its ASCII alphanumeric runs with `-`,
    /// which keeps the id usable as a single URL path segment.
    pub fn slugify(name: &str) -> Self {
        let slug = name
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>()
            .join("-");
        Self(slug)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    OfficeManager,
    Admin,
    Courier,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::OfficeManager => "OFFICE_MANAGER",
            Role::Admin => "ADMIN",
            Role::Courier => "COURIER",
        }
    }

    /// Office managers and couriers act on behalf of exactly one office.
    pub fn requires_office(self) -> bool {
        matches!(self, Role::OfficeManager | Role::Courier)
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Role::Customer),
            "OFFICE_MANAGER" => Ok(Role::OfficeManager),
            "ADMIN" => Ok(Role::Admin),
            "COURIER" => Ok(Role::Courier),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageStatus {
    Pending,
    Registered,
    InTransit,
    AtHub,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl PackageStatus {
    pub const ALL: [PackageStatus; 7] = [
        PackageStatus::Pending,
        PackageStatus::Registered,
        PackageStatus::InTransit,
        PackageStatus::AtHub,
        PackageStatus::OutForDelivery,
        PackageStatus::Delivered,
        PackageStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PackageStatus::Pending => "PENDING",
            PackageStatus::Registered => "REGISTERED",
            PackageStatus::InTransit => "IN_TRANSIT",
            PackageStatus::AtHub => "AT_HUB",
            PackageStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            PackageStatus::Delivered => "DELIVERED",
            PackageStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub fn is_positive(&self) -> bool {
        [self.length, self.width, self.height]
            .iter()
            .all(|side| side.is_finite() && *side > 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub tracking_number: String,
    pub sender: Contact,
    pub receiver: Contact,
    pub weight: f64,
    pub dimensions: Dimensions,
    pub status: PackageStatus,
    pub current_location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_courier: Option<CourierId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub admin_approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_id: Option<OfficeId>,
}

impl Package {
    pub fn is_awaiting_approval(&self) -> bool {
        self.status == PackageStatus::Pending && !self.admin_approved
    }

    /// Visible to office views once approved and out of `PENDING`.
    pub fn is_visible_to_offices(&self) -> bool {
        self.admin_approved && self.status != PackageStatus::Pending
    }

    /// Refreshes `updated_at`, never moving it behind `created_at` or backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.updated_at).max(self.created_at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Courier {
    pub id: CourierId,
    pub name: String,
    pub phone: String,
    pub office_id: OfficeId,
}

/// Stored account, including the password hash. Never serialized to clients;
/// see [`UserProfile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role: Role,
    pub office_id: Option<OfficeId>,
    pub courier_id: Option<CourierId>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            office_id: self.office_id.clone(),
            courier_id: self.courier_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_id: Option<OfficeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<CourierId>,
}
