use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shared::domain::{
    Courier, CourierId, Office, OfficeId, Package, PackageId, User, UserId,
};

pub mod memory;
pub mod seed;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Typed failures the access layer maps onto API error codes. Everything
/// else a repository returns is treated as an internal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },
    #[error("{entity} '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },
}

impl StorageError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Self::Duplicate {
            entity,
            key: key.into(),
        }
    }
}

/// Which packages a listing should return. Backends may push the filter down
/// into their query; the memory store evaluates [`PackageFilter::matches`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageFilter {
    All,
    Customer(UserId),
    Office(OfficeId),
    Courier(CourierId),
    AwaitingApproval,
}

impl PackageFilter {
    pub fn matches(&self, package: &Package) -> bool {
        match self {
            PackageFilter::All => true,
            PackageFilter::Customer(user_id) => package.customer_id.as_ref() == Some(user_id),
            PackageFilter::Office(office_id) => package.office_id.as_ref() == Some(office_id),
            PackageFilter::Courier(courier_id) => {
                package.assigned_courier.as_ref() == Some(courier_id)
            }
            PackageFilter::AwaitingApproval => package.is_awaiting_approval(),
        }
    }
}

#[async_trait]
pub trait PackageRepository: Send + Sync {
    async fn get_package(&self, id: &PackageId) -> Result<Option<Package>>;
    async fn find_by_tracking_number(&self, tracking_number: &str) -> Result<Option<Package>>;
    /// Packages in insertion order.
    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>>;
    /// Fails with [`StorageError::Duplicate`] when the id or tracking number is taken.
    async fn insert_package(&self, package: &Package) -> Result<()>;
    /// Replaces the mutable fields of an existing package. The tracking number
    /// and creation time are never rewritten.
    async fn update_package(&self, package: &Package) -> Result<()>;
}

#[async_trait]
pub trait OfficeRepository: Send + Sync {
    async fn get_office(&self, id: &OfficeId) -> Result<Option<Office>>;
    async fn list_offices(&self) -> Result<Vec<Office>>;
    async fn insert_office(&self, office: &Office) -> Result<()>;
}

#[async_trait]
pub trait CourierRepository: Send + Sync {
    async fn get_courier(&self, id: &CourierId) -> Result<Option<Courier>>;
    /// All couriers, or only the roster of `office_id` when given.
    async fn list_couriers(&self, office_id: Option<&OfficeId>) -> Result<Vec<Courier>>;
    async fn insert_courier(&self, courier: &Courier) -> Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<()>;
}

/// Every repository a backend provides.
pub trait Store: PackageRepository + OfficeRepository + CourierRepository + UserRepository {}

impl<T> Store for T where T: PackageRepository + OfficeRepository + CourierRepository + UserRepository
{}

/// Handles the access layer is built on. Cloning is cheap.
#[derive(Clone)]
pub struct Repositories {
    pub packages: Arc<dyn PackageRepository>,
    pub offices: Arc<dyn OfficeRepository>,
    pub couriers: Arc<dyn CourierRepository>,
    pub users: Arc<dyn UserRepository>,
}

impl Repositories {
    pub fn from_store<S: Store + 'static>(store: S) -> Self {
        let store = Arc::new(store);
        Self {
            packages: store.clone(),
            offices: store.clone(),
            couriers: store.clone(),
            users: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(MemoryStore::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Opens the configured backend. `database_url` is ignored for `Memory`.
pub async fn open(backend: StorageBackend, database_url: &str) -> Result<Repositories> {
    match backend {
        StorageBackend::Memory => Ok(Repositories::in_memory()),
        StorageBackend::Sqlite => Ok(Repositories::from_store(
            SqliteStore::new(database_url).await?,
        )),
    }
}

/// Recovers a [`StorageError`] from a repository failure, if it carries one.
pub fn storage_error(err: &anyhow::Error) -> Option<&StorageError> {
    err.downcast_ref::<StorageError>()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
