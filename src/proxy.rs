//! Pass-through proxy guarded by the firewall.
//!
//! Every request is turned into a [`FirewallRequest`] and run through
//! [`Firewall::handle`]. Blocked requests are answered with 403 here; the rest
//! are relayed to the upstream with hop-by-hop headers stripped.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use log::error;
use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::form_urlencoded;

use crate::core::Firewall;
use crate::models::{FirewallRequest, UpstreamConfig};
use crate::utils::resolve_client_ip;

const ACCESS_DENIED: &str = "Access Denied";

const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Errors raised while relaying an allowed request
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("Unsupported method: {0}")]
    Method(String),
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::BadGateway().body("Bad Gateway")
    }
}

pub struct ProxyState {
    pub firewall: Arc<Firewall>,
    client: reqwest::Client,
    upstream: String,
}

impl ProxyState {
    pub fn new(firewall: Arc<Firewall>, upstream: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(upstream.timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            firewall,
            client,
            upstream: upstream.url.trim_end_matches('/').to_string(),
        })
    }
}

/// Route every path and method through the firewall, buffering bodies of up
/// to `max_body_bytes`
pub fn config(max_body_bytes: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::PayloadConfig::new(max_body_bytes))
            .default_service(web::to(forward));
    }
}

/// Extract the attributes the firewall inspects from an incoming request
pub fn firewall_request(req: &HttpRequest, body: &[u8]) -> FirewallRequest {
    let header_value = |name: HeaderName| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    };

    let client_ip = resolve_client_ip(
        header_value(HeaderName::from_static("x-forwarded-for")),
        header_value(HeaderName::from_static("x-real-ip")),
        req.peer_addr().map(|addr| addr.ip()),
    );

    // Rules match the decoded path; forwarding keeps the raw one.
    let path = percent_decode_str(req.path()).decode_utf8_lossy();

    let mut request = FirewallRequest::new(client_ip, req.method().as_str(), path)
        .with_query(req.query_string())
        .with_user_agent(header_value(header::USER_AGENT).unwrap_or_default());

    let is_form = header_value(header::CONTENT_TYPE)
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if request.is_post_like() && is_form {
        let form = form_urlencoded::parse(body).into_owned().collect();
        request = request.with_form(form);
    }

    request
}

async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<ProxyState>,
) -> Result<HttpResponse, ProxyError> {
    let request = firewall_request(&req, &body);
    let decision = state.firewall.handle(&request);
    if decision.blocked {
        return Ok(HttpResponse::Forbidden().body(ACCESS_DENIED));
    }

    relay(&state, &req, body).await.map_err(|e| {
        error!("Failed to forward {} {}: {}", req.method(), req.path(), e);
        e
    })
}

async fn relay(state: &ProxyState, req: &HttpRequest, body: web::Bytes) -> Result<HttpResponse, ProxyError> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ProxyError::Method(req.method().to_string()))?;

    let target = match req.uri().path_and_query() {
        Some(path_and_query) => format!("{}{}", state.upstream, path_and_query),
        None => format!("{}{}", state.upstream, req.path()),
    };

    let mut upstream = state.client.request(method, target).body(body);
    for (name, value) in req.headers() {
        if is_hop_by_hop(name.as_str()) || *name == header::HOST || *name == header::CONTENT_LENGTH {
            continue;
        }
        upstream = upstream.header(name.as_str(), value.as_bytes());
    }

    let response = upstream.send().await?;

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);
    for (name, value) in response.headers() {
        if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.append_header((name, value));
        }
    }

    Ok(builder.body(response.bytes().await?))
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| name.eq_ignore_ascii_case(hop))
}
