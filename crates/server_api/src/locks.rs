use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use shared::domain::{PackageId, UserId};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

/// How long a client may replay an idempotent create.
pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One async mutex per package id so read-validate-write sequences on the
/// same package never interleave.
#[derive(Clone, Default)]
pub struct PackageLocks {
    inner: Arc<Mutex<HashMap<PackageId, Arc<Mutex<()>>>>>,
}

impl PackageLocks {
    pub async fn lock(&self, id: &PackageId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.inner.lock().await;
            // Entries nobody holds or waits on only cost memory.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(id.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

type IdempotencySlot = (UserId, String);

/// Packages already created per (user, idempotency key), forgotten after
/// the ttl.
#[derive(Clone)]
pub struct IdempotencyKeys {
    inner: Arc<Mutex<HashMap<IdempotencySlot, (PackageId, Instant)>>>,
    ttl: Duration,
}

impl Default for IdempotencyKeys {
    fn default() -> Self {
        Self::with_ttl(IDEMPOTENCY_TTL)
    }
}

impl IdempotencyKeys {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            ttl,
        }
    }

    /// Held for the whole create so concurrent retries with one key serialize.
    pub async fn lock(&self) -> IdempotencyGuard<'_> {
        IdempotencyGuard {
            entries: self.inner.lock().await,
            ttl: self.ttl,
        }
    }
}

pub struct IdempotencyGuard<'a> {
    entries: MutexGuard<'a, HashMap<IdempotencySlot, (PackageId, Instant)>>,
    ttl: Duration,
}

impl IdempotencyGuard<'_> {
    pub fn get(&self, user_id: &UserId, key: &str) -> Option<PackageId> {
        let slot = (user_id.clone(), key.to_string());
        self.entries
            .get(&slot)
            .filter(|(_, stored_at)| stored_at.elapsed() < self.ttl)
            .map(|(package_id, _)| package_id.clone())
    }

    /// Records a create and drops every expired key.
    pub fn remember(&mut self, user_id: &UserId, key: &str, package_id: PackageId) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
        self.entries.insert(
            (user_id.clone(), key.to_string()),
            (package_id, Instant::now()),
        );
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}
