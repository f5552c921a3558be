//! Typed HTTP client for the package tracking server.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Courier, CourierId, Office, OfficeId, Package, PackageId, UserProfile},
    error::{ApiError, ApiException},
    protocol::{
        AssignCourierRequest, CreateCourierRequest, CreateOfficeRequest, CreatePackageRequest,
        DailyMetrics, LoginRequest, LoginResponse, TrackingView, TransitionsResponse,
        UpdateStatusRequest,
    },
};
use tracing::{info, warn};

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Failures reported by the server carry an [`ApiException`]; recover it with
/// `err.downcast_ref::<ApiException>()`.
pub struct TrackingClient {
    http: Client,
    server_url: String,
    token: Option<String>,
    pub profile: Option<UserProfile>,
}

impl TrackingClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            token: None,
            profile: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub async fn health(&self) -> Result<bool> {
        let res = self.http.get(self.url(&["healthz"])?).send().await?;
        Ok(res.status().is_success())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<UserProfile> {
        let res = self
            .http
            .post(self.url(&["auth", "login"])?)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: LoginResponse = decode(res).await?;
        info!(user_id = %body.user.id, role = body.user.role.as_str(), "logged in");
        self.token = Some(body.token);
        self.profile = Some(body.user.clone());
        Ok(body.user)
    }

    /// Tells the server and forgets the local token either way.
    pub async fn logout(&mut self) -> Result<()> {
        let outcome = self.end_session().await;
        self.token = None;
        self.profile = None;
        outcome
    }

    async fn end_session(&self) -> Result<()> {
        let request = self.authorized(self.http.post(self.url(&["auth", "logout"])?))?;
        check(request.send().await?).await.map(drop)
    }

    pub async fn fetch_profile(&self) -> Result<UserProfile> {
        self.get(&["auth", "profile"]).await
    }

    pub async fn track(&self, tracking_number: &str) -> Result<TrackingView> {
        let res = self
            .http
            .get(self.url(&["track", tracking_number])?)
            .send()
            .await?;
        decode(res).await
    }

    pub async fn my_packages(&self) -> Result<Vec<Package>> {
        self.get(&["packages", "mine"]).await
    }

    pub async fn assigned_packages(&self) -> Result<Vec<Package>> {
        self.get(&["packages", "assigned"]).await
    }

    pub async fn pending_packages(&self) -> Result<Vec<Package>> {
        self.get(&["packages", "pending"]).await
    }

    pub async fn create_package(
        &self,
        request: &CreatePackageRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Package> {
        let mut builder = self
            .authorized(self.http.post(self.url(&["packages"])?))?
            .json(request);
        if let Some(key) = idempotency_key {
            builder = builder.header(IDEMPOTENCY_KEY, key);
        }
        decode(builder.send().await?).await
    }

    pub async fn allowed_next(&self, id: &PackageId) -> Result<TransitionsResponse> {
        self.get(&["packages", id.as_str(), "transitions"]).await
    }

    pub async fn update_status(
        &self,
        id: &PackageId,
        request: &UpdateStatusRequest,
    ) -> Result<Package> {
        self.post(&["packages", id.as_str(), "status"], request).await
    }

    pub async fn approve_package(&self, id: &PackageId) -> Result<Package> {
        self.post(&["packages", id.as_str(), "approve"], &serde_json::json!({}))
            .await
    }

    pub async fn assign_courier(&self, id: &PackageId, courier_id: &CourierId) -> Result<Package> {
        let request = AssignCourierRequest {
            courier_id: courier_id.clone(),
        };
        self.post(&["packages", id.as_str(), "courier"], &request).await
    }

    pub async fn offices(&self) -> Result<Vec<Office>> {
        self.get(&["offices"]).await
    }

    pub async fn office(&self, id: &OfficeId) -> Result<Office> {
        self.get(&["offices", id.as_str()]).await
    }

    pub async fn create_office(&self, request: &CreateOfficeRequest) -> Result<Office> {
        self.post(&["offices"], request).await
    }

    pub async fn office_packages(&self, id: &OfficeId) -> Result<Vec<Package>> {
        self.get(&["offices", id.as_str(), "packages"]).await
    }

    pub async fn office_couriers(&self, id: &OfficeId) -> Result<Vec<Courier>> {
        self.get(&["offices", id.as_str(), "couriers"]).await
    }

    pub async fn couriers(&self) -> Result<Vec<Courier>> {
        self.get(&["couriers"]).await
    }

    pub async fn create_courier(&self, request: &CreateCourierRequest) -> Result<Courier> {
        self.post(&["couriers"], request).await
    }

    pub async fn daily_metrics(&self) -> Result<DailyMetrics> {
        self.get(&["analytics", "daily"]).await
    }

    /// Appends `segments` to the server url, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url '{}'", self.server_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("server url '{}' cannot take a path", self.server_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow!("not logged in"))?;
        Ok(builder.bearer_auth(token))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let res = self
            .authorized(self.http.get(self.url(segments)?))?
            .send()
            .await?;
        decode(res).await
    }

    async fn post<B, T>(&self, segments: &[&str], body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let res = self
            .authorized(self.http.post(self.url(segments)?))?
            .json(body)
            .send()
            .await?;
        decode(res).await
    }
}

async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => {
            warn!(%status, code = ?api_error.code, message = %api_error.message, "request rejected");
            Err(ApiException::from(api_error).into())
        }
        Err(_) => Err(anyhow!("server returned {status}: {body}")),
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> Result<T> {
    check(res)
        .await?
        .json::<T>()
        .await
        .context("failed to decode server response")
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
