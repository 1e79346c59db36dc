//! Administrative API for the firewall.
//!
//! JSON endpoints under `/admin/api` for inspecting statistics and managing
//! the policy and bans. Everything except health and login requires a bearer
//! token obtained from `POST /login`.

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Firewall;
use crate::models::PolicyConfig;
use crate::utils::get_current_timestamp;

pub use auth::{AdminSession, Credentials, SessionManager};

const DEFAULT_TOP_LIMIT: usize = 10;

pub struct AdminState {
    pub firewall: Arc<Firewall>,
    pub sessions: Arc<SessionManager>,
    pub credentials: Credentials,
}

/// Errors returned by the admin API
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin/api")
            .route("/health", web::get().to(health_check))
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/status", web::get().to(status))
            .route("/summary", web::get().to(summary))
            .route("/hourly-stats", web::get().to(hourly_stats))
            .route("/top-ips", web::get().to(top_ips))
            .route("/top-uas", web::get().to(top_user_agents))
            .route("/stats", web::delete().to(clear_stats))
            .route("/policy", web::get().to(get_policy))
            .route("/policy", web::put().to(update_policy))
            .route("/user-agents", web::put().to(update_user_agents))
            .route("/rate-limits", web::get().to(rate_limits))
            .route("/rate-limits", web::delete().to(clear_rate_limits))
            .route("/rate-limits/{ip}", web::delete().to(reset_rate_limit))
            .route("/bans", web::get().to(list_bans))
            .route("/bans/permanent", web::post().to(add_permanent_ban))
            .route("/bans/permanent/{ip}", web::delete().to(remove_permanent_ban))
            .route("/bans/temporary", web::post().to(add_temporary_ban))
            .route("/bans/temporary", web::delete().to(clear_temporary_bans))
            .route("/bans/temporary/{ip}", web::delete().to(remove_temporary_ban)),
    );
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserAgentsRequest {
    pub user_agents: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PermanentBanRequest {
    pub ip: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TemporaryBanRequest {
    pub ip: String,
    #[serde(default)]
    pub reason: String,
    pub minutes: u64,
}

#[derive(Serialize)]
struct BansResponse {
    permanent: Vec<String>,
    temporary: Vec<crate::models::TemporaryBan>,
}

#[derive(Serialize)]
struct ClearedResponse {
    cleared: usize,
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: get_current_timestamp(),
    })
}

async fn login(
    state: web::Data<AdminState>,
    req: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    if !state.credentials.verify(&req.username, &req.password) {
        warn!("Failed admin login for user: {}", req.username);
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.sessions.create();
    info!("Admin logged in: {}", req.username);
    Ok(HttpResponse::Ok().json(LoginResponse { token }))
}

async fn logout(state: web::Data<AdminState>, session: AdminSession) -> impl Responder {
    state.sessions.revoke(&session.token);
    HttpResponse::NoContent().finish()
}

async fn status(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    HttpResponse::Ok().json(state.firewall.status())
}

async fn summary(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    HttpResponse::Ok().json(state.firewall.analytics().summary())
}

async fn hourly_stats(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    HttpResponse::Ok().json(state.firewall.analytics().hourly_stats())
}

async fn top_ips(
    state: web::Data<AdminState>,
    _: AdminSession,
    query: web::Query<TopQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    HttpResponse::Ok().json(state.firewall.analytics().top_ips(limit))
}

async fn top_user_agents(
    state: web::Data<AdminState>,
    _: AdminSession,
    query: web::Query<TopQuery>,
) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    HttpResponse::Ok().json(state.firewall.analytics().top_user_agents(limit))
}

async fn clear_stats(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    state.firewall.clear_stats();
    HttpResponse::NoContent().finish()
}

async fn get_policy(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    HttpResponse::Ok().json(state.firewall.policy().as_ref())
}

async fn update_policy(
    state: web::Data<AdminState>,
    _: AdminSession,
    policy: web::Json<PolicyConfig>,
) -> impl Responder {
    state.firewall.update_policy(policy.into_inner());
    HttpResponse::Ok().json(state.firewall.policy().as_ref())
}

async fn update_user_agents(
    state: web::Data<AdminState>,
    _: AdminSession,
    req: web::Json<UserAgentsRequest>,
) -> impl Responder {
    state.firewall.set_allowed_user_agents(req.into_inner().user_agents);
    HttpResponse::Ok().json(&state.firewall.policy().allowed_user_agents)
}

async fn rate_limits(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    HttpResponse::Ok().json(state.firewall.rate_limit_snapshot())
}

async fn clear_rate_limits(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    let cleared = state.firewall.clear_request_history();
    HttpResponse::Ok().json(ClearedResponse { cleared })
}

async fn reset_rate_limit(
    state: web::Data<AdminState>,
    _: AdminSession,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let ip = path.into_inner();
    if state.firewall.reset_client(&ip) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound(ip))
    }
}

async fn list_bans(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    HttpResponse::Ok().json(BansResponse {
        permanent: state.firewall.policy().banned_ips.iter().cloned().collect(),
        temporary: state.firewall.temporary_bans(),
    })
}

async fn add_permanent_ban(
    state: web::Data<AdminState>,
    _: AdminSession,
    req: web::Json<PermanentBanRequest>,
) -> Result<HttpResponse, ApiError> {
    let ip = required_ip(&req.ip)?;
    if state.firewall.ban_permanently(ip) {
        Ok(HttpResponse::Created().finish())
    } else {
        Ok(HttpResponse::Ok().finish())
    }
}

async fn remove_permanent_ban(
    state: web::Data<AdminState>,
    _: AdminSession,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let ip = path.into_inner();
    if state.firewall.unban_permanently(&ip) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound(ip))
    }
}

async fn add_temporary_ban(
    state: web::Data<AdminState>,
    _: AdminSession,
    req: web::Json<TemporaryBanRequest>,
) -> Result<HttpResponse, ApiError> {
    let ip = required_ip(&req.ip)?;
    if req.minutes == 0 {
        return Err(ApiError::BadRequest("minutes must be positive".to_string()));
    }

    let reason = match req.reason.trim() {
        "" => "manual ban",
        reason => reason,
    };
    let duration = Duration::from_secs(req.minutes.saturating_mul(60));
    let ban = state.firewall.add_temporary_ban(ip, reason, duration);
    Ok(HttpResponse::Created().json(ban))
}

async fn remove_temporary_ban(
    state: web::Data<AdminState>,
    _: AdminSession,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let ip = path.into_inner();
    if state.firewall.remove_temporary_ban(&ip) {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(ApiError::NotFound(ip))
    }
}

async fn clear_temporary_bans(state: web::Data<AdminState>, _: AdminSession) -> impl Responder {
    let cleared = state.firewall.clear_temporary_bans();
    HttpResponse::Ok().json(ClearedResponse { cleared })
}

fn required_ip(ip: &str) -> Result<&str, ApiError> {
    match ip.trim() {
        "" => Err(ApiError::BadRequest("ip is required".to_string())),
        ip => Ok(ip),
    }
}
