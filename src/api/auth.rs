//! Admin sessions backed by random bearer tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use futures::future::{ready, Ready};
use log::{debug, info};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use uuid::Uuid;

use crate::api::{AdminState, ApiError};
use crate::models::AdminConfig;

pub const SESSION_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60 * 60);

// Ten years, well inside the range `Duration::hours` accepts.
const MAX_SESSION_TTL_HOURS: u64 = 87_600;

pub struct SessionManager {
    sessions: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn from_config(config: &AdminConfig) -> Self {
        let hours = config.session_ttl_hours.min(MAX_SESSION_TTL_HOURS);
        Self::new(Duration::hours(hours as i64))
    }

    /// Open a session and return its token
    pub fn create(&self) -> String {
        self.create_at(Utc::now())
    }

    pub fn create_at(&self, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.lock().insert(token.clone(), now + self.ttl);
        token
    }

    /// Check a token, extending its lifetime when it is still valid
    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(token) {
            Some(expires_at) if now < *expires_at => {
                *expires_at = now + self.ttl;
                true
            }
            Some(_) => {
                sessions.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, expires_at| now < *expires_at);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let sessions = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = sessions.cleanup_expired();
                if removed > 0 {
                    debug!("Removed {} expired admin sessions", removed);
                }
            }
        })
    }
}

/// Username and password accepted by the login endpoint
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn from_config(config: &AdminConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone().filter(|password| !password.is_empty()),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        match &self.password {
            Some(expected) => username == self.username && password == expected,
            None => {
                info!("Admin login refused: no password configured");
                false
            }
        }
    }
}

/// Extractor for handlers that need a valid bearer token
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub token: String,
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl FromRequest for AdminSession {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AdminState>>() else {
            return ready(Err(ApiError::Unauthorized));
        };

        let result = match bearer_token(req) {
            Some(token) if state.sessions.validate(token) => Ok(AdminSession {
                token: token.to_string(),
            }),
            _ => Err(ApiError::Unauthorized),
        };
        ready(result)
    }
}
