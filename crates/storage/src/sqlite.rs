use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};

use shared::domain::{
    Contact, Courier, CourierId, Dimensions, Office, OfficeId, Package, PackageId, PackageStatus,
    Role, User, UserId,
};

use crate::{
    CourierRepository, OfficeRepository, PackageFilter, PackageRepository, StorageError,
    UserRepository,
};

const PACKAGE_COLUMNS: &str = "id, tracking_number, sender_name, sender_address, sender_phone, \
     receiver_name, receiver_address, receiver_phone, weight, length, width, height, status, \
     current_location, created_at, updated_at, assigned_courier, remarks, admin_approved, \
     customer_id, office_id";

const USER_COLUMNS: &str = "id, username, password_hash, email, role, office_id, courier_id";

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = pool_options(database_url)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

/// Every connection to `sqlite::memory:` opens its own empty database, so a
/// memory pool holds exactly one connection for its whole life.
fn pool_options(database_url: &str) -> SqlitePoolOptions {
    if database_url.starts_with("sqlite::memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
}

fn unique_violation(err: sqlx::Error, entity: &'static str, key: &str) -> anyhow::Error {
    let is_unique = err
        .as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation());
    if is_unique {
        StorageError::duplicate(entity, key).into()
    } else {
        err.into()
    }
}

fn package_from_row(row: &SqliteRow) -> Result<Package> {
    let status: String = row.try_get("status")?;
    Ok(Package {
        id: PackageId(row.try_get("id")?),
        tracking_number: row.try_get("tracking_number")?,
        sender: Contact {
            name: row.try_get("sender_name")?,
            address: row.try_get("sender_address")?,
            phone: row.try_get("sender_phone")?,
        },
        receiver: Contact {
            name: row.try_get("receiver_name")?,
            address: row.try_get("receiver_address")?,
            phone: row.try_get("receiver_phone")?,
        },
        weight: row.try_get("weight")?,
        dimensions: Dimensions {
            length: row.try_get("length")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
        },
        status: status.parse::<PackageStatus>()?,
        current_location: row.try_get("current_location")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        assigned_courier: row.try_get::<Option<String>, _>("assigned_courier")?.map(CourierId),
        remarks: row.try_get("remarks")?,
        admin_approved: row.try_get("admin_approved")?,
        customer_id: row.try_get::<Option<String>, _>("customer_id")?.map(UserId),
        office_id: row.try_get::<Option<String>, _>("office_id")?.map(OfficeId),
    })
}

fn office_from_row(row: &SqliteRow) -> Result<Office> {
    Ok(Office {
        id: OfficeId(row.try_get("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
    })
}

fn courier_from_row(row: &SqliteRow) -> Result<Courier> {
    Ok(Courier {
        id: CourierId(row.try_get("id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        office_id: OfficeId(row.try_get("office_id")?),
    })
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        email: row.try_get("email")?,
        role: role.parse::<Role>()?,
        office_id: row.try_get::<Option<String>, _>("office_id")?.map(OfficeId),
        courier_id: row.try_get::<Option<String>, _>("courier_id")?.map(CourierId),
    })
}

#[async_trait]
impl PackageRepository for SqliteStore {
    async fn get_package(&self, id: &PackageId) -> Result<Option<Package>> {
        let row = sqlx::query(&format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(package_from_row).transpose()
    }

    async fn find_by_tracking_number(&self, tracking_number: &str) -> Result<Option<Package>> {
        let row = sqlx::query(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM packages WHERE tracking_number = ?"
        ))
        .bind(tracking_number)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(package_from_row).transpose()
    }

    async fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>> {
        let (clause, value) = match filter {
            PackageFilter::All => ("", None),
            PackageFilter::Customer(user_id) => ("WHERE customer_id = ?", Some(user_id.as_str())),
            PackageFilter::Office(office_id) => ("WHERE office_id = ?", Some(office_id.as_str())),
            PackageFilter::Courier(courier_id) => {
                ("WHERE assigned_courier = ?", Some(courier_id.as_str()))
            }
            PackageFilter::AwaitingApproval => {
                ("WHERE status = 'PENDING' AND admin_approved = 0", None)
            }
        };
        let sql = format!("SELECT {PACKAGE_COLUMNS} FROM packages {clause} ORDER BY rowid");
        let mut query = sqlx::query(&sql);
        if let Some(value) = value {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(package_from_row).collect()
    }

    async fn insert_package(&self, package: &Package) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO packages ({PACKAGE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(package.id.as_str())
        .bind(&package.tracking_number)
        .bind(&package.sender.name)
        .bind(&package.sender.address)
        .bind(&package.sender.phone)
        .bind(&package.receiver.name)
        .bind(&package.receiver.address)
        .bind(&package.receiver.phone)
        .bind(package.weight)
        .bind(package.dimensions.length)
        .bind(package.dimensions.width)
        .bind(package.dimensions.height)
        .bind(package.status.as_str())
        .bind(&package.current_location)
        .bind(package.created_at)
        .bind(package.updated_at)
        .bind(package.assigned_courier.as_ref().map(CourierId::as_str))
        .bind(package.remarks.as_deref())
        .bind(package.admin_approved)
        .bind(package.customer_id.as_ref().map(UserId::as_str))
        .bind(package.office_id.as_ref().map(OfficeId::as_str))
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "package", &package.tracking_number))?;
        Ok(())
    }

    async fn update_package(&self, package: &Package) -> Result<()> {
        let result = sqlx::query(
            "UPDATE packages SET
                sender_name = ?, sender_address = ?, sender_phone = ?,
                receiver_name = ?, receiver_address = ?, receiver_phone = ?,
                weight = ?, length = ?, width = ?, height = ?,
                status = ?, current_location = ?, updated_at = ?,
                assigned_courier = ?, remarks = ?, admin_approved = ?,
                customer_id = ?, office_id = ?
             WHERE id = ?",
        )
        .bind(&package.sender.name)
        .bind(&package.sender.address)
        .bind(&package.sender.phone)
        .bind(&package.receiver.name)
        .bind(&package.receiver.address)
        .bind(&package.receiver.phone)
        .bind(package.weight)
        .bind(package.dimensions.length)
        .bind(package.dimensions.width)
        .bind(package.dimensions.height)
        .bind(package.status.as_str())
        .bind(&package.current_location)
        .bind(package.updated_at)
        .bind(package.assigned_courier.as_ref().map(CourierId::as_str))
        .bind(package.remarks.as_deref())
        .bind(package.admin_approved)
        .bind(package.customer_id.as_ref().map(UserId::as_str))
        .bind(package.office_id.as_ref().map(OfficeId::as_str))
        .bind(package.id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("package", package.id.as_str()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl OfficeRepository for SqliteStore {
    async fn get_office(&self, id: &OfficeId) -> Result<Option<Office>> {
        let row = sqlx::query("SELECT id, name, address, phone FROM offices WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(office_from_row).transpose()
    }

    async fn list_offices(&self) -> Result<Vec<Office>> {
        let rows = sqlx::query("SELECT id, name, address, phone FROM offices ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(office_from_row).collect()
    }

    async fn insert_office(&self, office: &Office) -> Result<()> {
        sqlx::query("INSERT INTO offices (id, name, address, phone) VALUES (?, ?, ?, ?)")
            .bind(office.id.as_str())
            .bind(&office.name)
            .bind(&office.address)
            .bind(&office.phone)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "office", office.id.as_str()))?;
        Ok(())
    }
}

#[async_trait]
impl CourierRepository for SqliteStore {
    async fn get_courier(&self, id: &CourierId) -> Result<Option<Courier>> {
        let row = sqlx::query("SELECT id, name, phone, office_id FROM couriers WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(courier_from_row).transpose()
    }

    async fn list_couriers(&self, office_id: Option<&OfficeId>) -> Result<Vec<Courier>> {
        let rows = match office_id {
            Some(office_id) => {
                sqlx::query(
                    "SELECT id, name, phone, office_id FROM couriers WHERE office_id = ? ORDER BY rowid",
                )
                .bind(office_id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT id, name, phone, office_id FROM couriers ORDER BY rowid")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(courier_from_row).collect()
    }

    async fn insert_courier(&self, courier: &Courier) -> Result<()> {
        sqlx::query("INSERT INTO couriers (id, name, phone, office_id) VALUES (?, ?, ?, ?)")
            .bind(courier.id.as_str())
            .bind(&courier.name)
            .bind(&courier.phone)
            .bind(courier.office_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, "courier", courier.id.as_str()))?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(user.id.as_str())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.office_id.as_ref().map(OfficeId::as_str))
        .bind(user.courier_id.as_ref().map(CourierId::as_str))
        .execute(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "user", &user.username))?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/sqlite_tests.rs"]
mod tests;
