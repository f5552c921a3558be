use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use shared::domain::{Courier, CourierId, Office, OfficeId, Package, PackageId, User, UserId};

use crate::{
    CourierRepository, OfficeRepository, PackageFilter, PackageRepository, StorageError,
    UserRepository,
};

/// Process-local store; contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

#[derive(Default)]
struct Collections {
    packages: Vec<Package>,
    offices: Vec<Office>,
    couriers: Vec<Courier>,
    users: Vec<User>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackageRepository for MemoryStore {
    async fn get_package(&self, id: &PackageId) -> Result<Option<Package>> {
        let guard = self.inner.read().await;
        Ok(guard.packages.iter().find(|p| &p.id == id).cloned())
    }

    async fn find_by_tracking_number(&self, tracking_number: &str) -> Result<Option<Package>> {
        let guard = self.inner.read().await;
        Ok(guard
            .packages
            .iter()
            .find(|p| p.tracking_number == tracking_number)
            .cloned())
    }

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        let guard = self.inner.read().await;
        Ok(guard
            .packages
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn insert_package(&self, package: &Package) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.packages.iter().any(|p| p.id == package.id) {
            return Err(StorageError::duplicate("package", package.id.as_str()).into());
        }
        if guard
            .packages
            .iter()
            .any(|p| p.tracking_number == package.tracking_number)
        {
            return Err(StorageError::duplicate("tracking number", &package.tracking_number).into());
        }
        guard.packages.push(package.clone());
        Ok(())
    }

    async fn update_package(&self, package: &Package) -> Result<()> {
        let mut guard = self.inner.write().await;
        let stored = guard
            .packages
            .iter_mut()
            .find(|p| p.id == package.id)
            .ok_or_else(|| StorageError::not_found("package", package.id.as_str()))?;

        let tracking_number = std::mem::take(&mut stored.tracking_number);
        let created_at = stored.created_at;
        *stored = package.clone();
        stored.tracking_number = tracking_number;
        stored.created_at = created_at;
        Ok(())
    }
}

#[async_trait]
impl OfficeRepository for MemoryStore {
    async fn get_office(&self, id: &OfficeId) -> Result<Option<Office>> {
        let guard = self.inner.read().await;
        Ok(guard.offices.iter().find(|o| &o.id == id).cloned())
    }

    async fn list_offices(&self) -> Result<Vec<Office>> {
        Ok(self.inner.read().await.offices.clone())
    }

    async fn insert_office(&self, office: &Office) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.offices.iter().any(|o| o.id == office.id) {
            return Err(StorageError::duplicate("office", office.id.as_str()).into());
        }
        guard.offices.push(office.clone());
        Ok(())
    }
}

#[async_trait]
impl CourierRepository for MemoryStore {
    async fn get_courier(&self, id: &CourierId) -> Result<Option<Courier>> {
        let guard = self.inner.read().await;
        Ok(guard.couriers.iter().find(|c| &c.id == id).cloned())
    }

    async fn list_couriers(&self, office_id: Option<&OfficeId>) -> Result<Vec<Courier>> {
        let guard = self.inner.read().await;
        Ok(guard
            .couriers
            .iter()
            .filter(|c| office_id.map_or(true, |office_id| &c.office_id == office_id))
            .cloned()
            .collect())
    }

    async fn insert_courier(&self, courier: &Courier) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.couriers.iter().any(|c| c.id == courier.id) {
            return Err(StorageError::duplicate("courier", courier.id.as_str()).into());
        }
        guard.couriers.push(courier.clone());
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let guard = self.inner.read().await;
        Ok(guard.users.iter().find(|u| &u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let guard = self.inner.read().await;
        Ok(guard.users.iter().find(|u| u.username == username).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut guard = self.inner.write().await;
        if guard.users.iter().any(|u| u.id == user.id) {
            return Err(StorageError::duplicate("user", user.id.as_str()).into());
        }
        if guard.users.iter().any(|u| u.username == user.username) {
            return Err(StorageError::duplicate("username", &user.username).into());
        }
        guard.users.push(user.clone());
        Ok(())
    }
}
