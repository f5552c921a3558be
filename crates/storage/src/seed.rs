//! Demo records the dashboard ships with: two hubs, two Mumbai couriers,
//! one account per role and a single parcel awaiting approval.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};

use shared::domain::{
    Contact, Courier, CourierId, Dimensions, Office, OfficeId, Package, PackageId, PackageStatus,
    Role, User, UserId,
};

use crate::{storage_error, Repositories, StorageError};

pub const DEMO_TRACKING_NUMBER: &str = "TN20240001";
pub const DEMO_PASSWORD: &str = "1234";

#[derive(Debug, Clone)]
pub struct DemoData {
    pub offices: Vec<Office>,
    pub couriers: Vec<Courier>,
    pub users: Vec<User>,
    pub packages: Vec<Package>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Builds the demo records. Every account gets `password_hash`, which callers
/// derive from [`DEMO_PASSWORD`].
pub fn demo_data(password_hash: &str) -> DemoData {
    let mumbai = OfficeId::from("mumbai-hub");
    let bangalore = OfficeId::from("bangalore-hub");

    let offices = vec![
        Office {
            id: mumbai.clone(),
            name: "Mumbai Hub".into(),
            address: "Andheri East, Mumbai, Maharashtra 400069".into(),
            phone: "+91 22 2345 6789".into(),
        },
        Office {
            id: bangalore.clone(),
            name: "Bangalore Hub".into(),
            address: "Whitefield, Bangalore, Karnataka 560066".into(),
            phone: "+91 80 2345 6789".into(),
        },
    ];

    let couriers = vec![
        Courier {
            id: CourierId::from("courier1"),
            name: "Raj Kumar".into(),
            phone: "+91 98765 43210".into(),
            office_id: mumbai.clone(),
        },
        Courier {
            id: CourierId::from("courier2"),
            name: "Priya Singh".into(),
            phone: "+91 98765 43211".into(),
            office_id: mumbai.clone(),
        },
    ];

    let user = |id: &str, username: &str, email: &str, role: Role, office: Option<&OfficeId>| User {
        id: UserId::from(id),
        username: username.into(),
        password_hash: password_hash.to_string(),
        email: email.into(),
        role,
        office_id: office.cloned(),
        courier_id: None,
    };

    let mut courier_account = user(
        "courier-user1",
        "raj_courier",
        "raj@couriertrack.com",
        Role::Courier,
        Some(&mumbai),
    );
    courier_account.courier_id = Some(CourierId::from("courier1"));

    let users = vec![
        user("admin1", "admin", "admin@couriertrack.com", Role::Admin, None),
        user(
            "manager1",
            "mumbai_manager",
            "mumbai@couriertrack.com",
            Role::OfficeManager,
            Some(&mumbai),
        ),
        user(
            "manager2",
            "bangalore_manager",
            "bangalore@couriertrack.com",
            Role::OfficeManager,
            Some(&bangalore),
        ),
        user("customer1", "john_customer", "john@example.com", Role::Customer, None),
        user("customer2", "jane_customer", "jane@example.com", Role::Customer, None),
        courier_account,
    ];

    let packages = vec![Package {
        id: PackageId::from("pkg1"),
        tracking_number: DEMO_TRACKING_NUMBER.into(),
        sender: Contact {
            name: "John Customer".into(),
            address: "Mumbai, Maharashtra".into(),
            phone: "+91 98765 43210".into(),
        },
        receiver: Contact {
            name: "Jane Doe".into(),
            address: "Bangalore, Karnataka".into(),
            phone: "+91 98765 43211".into(),
        },
        weight: 2.5,
        dimensions: Dimensions {
            length: 30.0,
            width: 20.0,
            height: 15.0,
        },
        status: PackageStatus::Pending,
        current_location: "Mumbai Hub".into(),
        created_at: utc(2024, 3, 15, 10),
        updated_at: utc(2024, 3, 15, 12),
        assigned_courier: None,
        remarks: None,
        admin_approved: false,
        customer_id: Some(UserId::from("customer1")),
        office_id: Some(mumbai),
    }];

    DemoData {
        offices,
        couriers,
        users,
        packages,
    }
}

fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Inserts `data`, skipping records that already exist so a persistent
/// database can be seeded repeatedly.
pub async fn load(repos: &Repositories, data: &DemoData) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    for office in &data.offices {
        report.record(repos.offices.insert_office(office).await)?;
    }
    for courier in &data.couriers {
        report.record(repos.couriers.insert_courier(courier).await)?;
    }
    for user in &data.users {
        report.record(repos.users.insert_user(user).await)?;
    }
    for package in &data.packages {
        report.record(repos.packages.insert_package(package).await)?;
    }
    Ok(report)
}

impl SeedReport {
    fn record(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.inserted += 1;
                Ok(())
            }
            Err(err) if matches!(storage_error(&err), Some(StorageError::Duplicate { .. })) => {
                self.skipped += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
