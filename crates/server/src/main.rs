use std::{net::SocketAddr, sync::Arc};

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use server_api::{
    allowed_next, approve_package, assign_courier, authenticate, create_courier, create_office,
    create_package, daily_metrics, get_office, list_by_courier, list_by_customer, list_by_office,
    list_couriers, list_couriers_by_office, list_offices, list_pending_approval, login, profile,
    track, update_status, Session,
};
use shared::{
    domain::{Courier, Office, OfficeId, Package, PackageId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        AssignCourierRequest, CreateCourierRequest, CreateOfficeRequest, CreatePackageRequest,
        DailyMetrics, LoginRequest, LoginResponse, TrackingView, TransitionsResponse,
        UpdateStatusRequest,
    },
};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const MAX_BODY_BYTES: usize = 64 * 1024;
const IDEMPOTENCY_KEY: &str = "idempotency-key";

type HttpError = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<Json<T>, HttpError>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;
    let state = AppState::from_settings(&settings).await.map_err(|error| {
        error!(
            database_url = %settings.database_url,
            %error,
            "failed to prepare storage"
        );
        error
    })?;
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let request_timeout = state.request_timeout;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/login", post(http_login))
        .route("/auth/logout", post(http_logout))
        .route("/auth/profile", get(http_profile))
        .route("/track/:tracking_number", get(http_track))
        .route("/packages", post(http_create_package))
        .route("/packages/mine", get(http_my_packages))
        .route("/packages/assigned", get(http_assigned_packages))
        .route("/packages/pending", get(http_pending_packages))
        .route("/packages/:package_id/transitions", get(http_transitions))
        .route("/packages/:package_id/status", post(http_update_status))
        .route("/packages/:package_id/approve", post(http_approve))
        .route("/packages/:package_id/courier", post(http_assign_courier))
        .route("/offices", get(http_list_offices).post(http_create_office))
        .route("/offices/:office_id", get(http_get_office))
        .route("/offices/:office_id/packages", get(http_office_packages))
        .route("/offices/:office_id/couriers", get(http_office_couriers))
        .route("/couriers", get(http_list_couriers).post(http_create_courier))
        .route("/analytics/daily", get(http_daily_metrics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reject(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::Unauthorized | ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

/// Session of the caller, from `Authorization: Bearer <token>`.
struct Authenticated(Session);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                reject(ApiError::new(
                    ErrorCode::Unauthorized,
                    "missing bearer token",
                ))
            })?;
        authenticate(&state.api, token)
            .map(Authenticated)
            .map_err(reject)
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<LoginResponse> {
    login(&state.api, req).await.map(Json).map_err(reject)
}

/// Sessions are stateless tokens; the client discards its copy.
async fn http_logout(Authenticated(session): Authenticated) -> StatusCode {
    info!(user_id = %session.user_id, "user logged out");
    StatusCode::NO_CONTENT
}

async fn http_profile(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<UserProfile> {
    profile(&state.api, &session).await.map(Json).map_err(reject)
}

async fn http_track(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
) -> HttpResult<TrackingView> {
    track(&state.api, &tracking_number)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_package(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    headers: HeaderMap,
    Json(req): Json<CreatePackageRequest>,
) -> Result<(StatusCode, Json<Package>), HttpError> {
    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY)
        .and_then(|value| value.to_str().ok());
    let package = create_package(&state.api, &session, req, idempotency_key)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(package)))
}

async fn http_my_packages(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<Vec<Package>> {
    list_by_customer(&state.api, &session)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_assigned_packages(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<Vec<Package>> {
    list_by_courier(&state.api, &session)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_pending_packages(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<Vec<Package>> {
    list_pending_approval(&state.api, &session)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_transitions(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(package_id): Path<PackageId>,
) -> HttpResult<TransitionsResponse> {
    allowed_next(&state.api, &session, &package_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_status(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(package_id): Path<PackageId>,
    Json(req): Json<UpdateStatusRequest>,
) -> HttpResult<Package> {
    update_status(&state.api, &session, &package_id, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_approve(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(package_id): Path<PackageId>,
) -> HttpResult<Package> {
    approve_package(&state.api, &session, &package_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_assign_courier(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(package_id): Path<PackageId>,
    Json(req): Json<AssignCourierRequest>,
) -> HttpResult<Package> {
    assign_courier(&state.api, &session, &package_id, &req.courier_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_offices(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<Vec<Office>> {
    list_offices(&state.api, &session)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_office(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Json(req): Json<CreateOfficeRequest>,
) -> Result<(StatusCode, Json<Office>), HttpError> {
    let office = create_office(&state.api, &session, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(office)))
}

async fn http_get_office(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(office_id): Path<OfficeId>,
) -> HttpResult<Office> {
    get_office(&state.api, &session, &office_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_office_packages(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(office_id): Path<OfficeId>,
) -> HttpResult<Vec<Package>> {
    list_by_office(&state.api, &session, &office_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_office_couriers(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Path(office_id): Path<OfficeId>,
) -> HttpResult<Vec<Courier>> {
    list_couriers_by_office(&state.api, &session, &office_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_couriers(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<Vec<Courier>> {
    list_couriers(&state.api, &session)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_courier(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
    Json(req): Json<CreateCourierRequest>,
) -> Result<(StatusCode, Json<Courier>), HttpError> {
    let courier = create_courier(&state.api, &session, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(courier)))
}

async fn http_daily_metrics(
    State(state): State<Arc<AppState>>,
    Authenticated(session): Authenticated,
) -> HttpResult<DailyMetrics> {
    daily_metrics(&state.api, &session)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
