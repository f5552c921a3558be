use std::time::Duration;

use server_api::{seed_demo_data, ApiContext, SessionConfig};
use tracing::info;

use crate::config::Settings;

pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) request_timeout: Duration,
}

impl AppState {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let repos = storage::open(settings.storage, &settings.database_url).await?;
        if settings.seed_demo_data {
            seed_demo_data(&repos).await?;
        }
        info!(storage = ?settings.storage, "storage ready");

        let sessions = SessionConfig {
            secret: settings.jwt_secret.clone(),
            ttl_seconds: settings.session_ttl_seconds,
        };
        Ok(Self {
            api: ApiContext::new(repos, sessions),
            request_timeout: Duration::from_secs(settings.request_timeout_seconds),
        })
    }
}
