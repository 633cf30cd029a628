//! REST API layer (Axum).
//!
//! Public routes take submissions and serve published content; every
//! admin route sits behind [`admin_gate`]. All routes live under `/api`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::{SessionClaims, TokenIssuer, TokenKeys};
use crate::error::{ApiError, AuthError};
use crate::export::admissions_csv;
use crate::gate::{admin_gate, AccessGate};
use crate::models::{
    Admission, AdmissionForm, BankDetails, BankDetailsUpdate, ContactForm, ContactMessage, News,
    NewsDraft, NewsUpdate,
};
use crate::storage::Storage;

/// Shared app state for REST handlers
#[derive(Clone)]
pub struct AppState {
    storage: Storage,
    issuer: Arc<TokenIssuer>,
    gate: AccessGate,
}

impl AppState {
    pub fn new(storage: Storage, keys: Arc<TokenKeys>, bcrypt_cost: u32) -> Result<Self, AuthError> {
        Ok(Self {
            issuer: Arc::new(TokenIssuer::new(storage.clone(), keys.clone(), bcrypt_cost)?),
            gate: AccessGate::new(keys),
            storage,
        })
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

type Body<T> = Result<Json<T>, JsonRejection>;

/// Build the router. `allowed_origins` is `*` or a comma-separated list.
pub fn create_router(state: AppState, allowed_origins: &str) -> Router {
    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/admission", get(list_admissions_handler))
        .route("/admission/export/excel", get(export_admissions_handler))
        .route("/contact", get(list_messages_handler))
        .route("/news", post(create_news_handler))
        .route("/news/admin", get(list_all_news_handler))
        .route("/news/:id", put(update_news_handler).delete(delete_news_handler))
        .route("/bank", put(update_bank_handler))
        .route_layer(middleware::from_fn_with_state(state.gate.clone(), admin_gate));

    let api = Router::new()
        .route("/admin/login", post(login_handler))
        .route("/admission", post(submit_admission_handler))
        .route("/contact", post(submit_message_handler))
        .route("/news", get(list_news_handler))
        .route("/bank", get(bank_details_handler))
        .route("/health", get(health_handler))
        .merge(admin_routes);

    Router::new()
        .route("/", get(|| async { "API is running" }))
        .nest("/api", api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
}

/// CORS for the browser dashboard. `*` (or nothing) allows any origin.
/// Origins that are not valid header values are dropped with a warning;
/// when none survive, no cross-origin request is allowed.
pub fn cors_layer(allowed_origins: &str) -> CorsLayer {
    let configured: Vec<&str> = allowed_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let allow_origin = if configured.is_empty() || configured.contains(&"*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = configured
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        if origins.is_empty() {
            tracing::warn!("no valid CORS origin configured, cross-origin requests are refused");
        }
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([HeaderName::from_static("content-disposition")])
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    payload: Body<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = payload?;
    let token = state.issuer.login(&payload.username, &payload.password).await?;
    Ok(Json(LoginResponse { token }))
}

// --- Admissions ---

async fn submit_admission_handler(
    State(state): State<Arc<AppState>>,
    payload: Body<AdmissionForm>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(form) = payload?;
    form.validate()?;
    let admission = state.storage.insert_admission(form, Utc::now())?;
    tracing::info!(reference = %admission.unique_key, "admission submitted");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Admission submitted successfully!",
            "reference": admission.unique_key,
        })),
    ))
}

async fn list_admissions_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Admission>>, ApiError> {
    Ok(Json(state.storage.list_admissions()?))
}

async fn export_admissions_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<impl IntoResponse, ApiError> {
    let admissions = state.storage.list_admissions()?;
    if admissions.is_empty() {
        return Err(ApiError::NotFound("No admissions found to export."));
    }
    let csv = admissions_csv(&admissions)?;
    tracing::info!(admin = %claims.username, rows = admissions.len(), "admissions exported");

    let disposition = format!(
        "attachment; filename=\"admissions_{}.csv\"",
        Utc::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

// --- Contact messages ---

async fn submit_message_handler(
    State(state): State<Arc<AppState>>,
    payload: Body<ContactForm>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(form) = payload?;
    form.validate()?;
    let message = ContactMessage::from_form(form, Utc::now());
    state.storage.insert_message(&message)?;
    tracing::info!(id = %message.id, "contact message received");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Message received successfully!" })),
    ))
}

async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ContactMessage>>, ApiError> {
    Ok(Json(state.storage.list_messages()?))
}

// --- News ---

async fn list_news_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<News>>, ApiError> {
    Ok(Json(state.storage.list_news(false)?))
}

async fn list_all_news_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<News>>, ApiError> {
    Ok(Json(state.storage.list_news(true)?))
}

async fn create_news_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    payload: Body<NewsDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(draft) = payload?;
    draft.validate()?;
    let news = draft.into_news(Utc::now());
    state.storage.insert_news(&news)?;
    tracing::info!(admin = %claims.username, id = %news.id, "news created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "News created successfully", "news": news })),
    ))
}

async fn update_news_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
    payload: Body<NewsUpdate>,
) -> Result<Json<News>, ApiError> {
    let Json(update) = payload?;
    update.validate()?;
    let id = parse_news_id(&id)?;
    let news = state
        .storage
        .update_news(id, update)?
        .ok_or(ApiError::NotFound("News not found"))?;
    tracing::info!(admin = %claims.username, %id, "news updated");
    Ok(Json(news))
}

async fn delete_news_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_news_id(&id)?;
    if !state.storage.delete_news(id)? {
        return Err(ApiError::NotFound("News not found"));
    }
    tracing::info!(admin = %claims.username, %id, "news deleted");
    Ok(Json(json!({ "message": "News deleted successfully" })))
}

/// Malformed ids cannot name a post, so they read as not found.
fn parse_news_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound("News not found"))
}

// --- Bank details ---

async fn bank_details_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Option<BankDetails>>, ApiError> {
    Ok(Json(state.storage.bank_details()?))
}

async fn update_bank_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    payload: Body<BankDetailsUpdate>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = payload?;
    let bank = state.storage.update_bank_details(update, Utc::now())?;
    tracing::info!(admin = %claims.username, "bank details updated");
    Ok(Json(json!({ "message": "Bank details updated", "bank": bank })))
}
