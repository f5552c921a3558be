use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::TrackingClient;
use server_api::{credentials::hash_password_with, seed_demo_data};
use storage::StorageBackend;

#[derive(Parser, Debug)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints a stored-format hash for a password.
    HashPassword {
        password: String,
        #[arg(long, default_value_t = server_api::credentials::DEFAULT_ITERATIONS)]
        iterations: u32,
    },
    /// Loads the demo offices, couriers, accounts and parcel into SQLite.
    Seed {
        #[arg(long, default_value = "sqlite://./data/tracking.db")]
        database_url: String,
    },
    /// Looks up a parcel on a running server.
    Track {
        tracking_number: String,
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server_url: String,
    },
    /// Prints the admin dashboard counters.
    Metrics {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server_url: String,
        #[arg(long, default_value = "admin")]
        username: String,
        #[arg(long)]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::HashPassword {
            password,
            iterations,
        } => {
            println!("{}", hash_password_with(&password, iterations)?);
        }
        Command::Seed { database_url } => {
            let repos = storage::open(StorageBackend::Sqlite, &database_url).await?;
            let report = seed_demo_data(&repos).await?;
            println!(
                "seeded {database_url}: inserted={} skipped={}",
                report.inserted, report.skipped
            );
        }
        Command::Track {
            tracking_number,
            server_url,
        } => {
            let client = TrackingClient::new(server_url);
            let view = client.track(&tracking_number).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        Command::Metrics {
            server_url,
            username,
            password,
        } => {
            let mut client = TrackingClient::new(server_url);
            client.login(&username, &password).await?;
            let metrics = client.daily_metrics().await?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}
