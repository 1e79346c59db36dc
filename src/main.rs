//! Request firewall
//!
//! Entry point: loads settings and the persisted policy, then runs the
//! filtering proxy and the admin API side by side.

use std::net::SocketAddr;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{error, info};
use metrics_exporter_prometheus::PrometheusBuilder;

use request_firewall::api::{self, AdminState, Credentials, SessionManager};
use request_firewall::config::{self, JsonFileStore};
use request_firewall::core::{Firewall, LogEventSink};
use request_firewall::proxy::{self, ProxyState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting request firewall...");

    // Load configuration
    let settings = config::load_config().context("Failed to load configuration")?;

    // Load the persisted policy
    let store = Arc::new(JsonFileStore::new(&settings.policy_store.file));
    let firewall = Firewall::load(Arc::new(LogEventSink), store)
        .with_context(|| format!("Failed to load policy from {}", settings.policy_store.file))?;
    let firewall = Arc::new(firewall);

    if settings.metrics.enabled {
        let listen: SocketAddr = settings
            .metrics
            .listen
            .parse()
            .with_context(|| format!("Invalid metrics listen address {}", settings.metrics.listen))?;
        PrometheusBuilder::new()
            .with_http_listener(listen)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Metrics exporter listening on {}", listen);
    }

    let _maintenance = firewall.spawn_maintenance();

    let sessions = Arc::new(SessionManager::from_config(&settings.admin));
    let _session_cleanup = sessions.spawn_cleanup();

    let proxy_state = web::Data::new(
        ProxyState::new(Arc::clone(&firewall), &settings.upstream).context("Failed to build upstream client")?,
    );
    let admin_state = web::Data::new(AdminState {
        firewall: Arc::clone(&firewall),
        sessions,
        credentials: Credentials::from_config(&settings.admin),
    });

    info!(
        "Firewall listening on {}:{}, forwarding to {}",
        settings.server.host, settings.server.port, settings.upstream.url
    );
    let max_body_bytes = usize::try_from(settings.server.max_body_bytes).unwrap_or(usize::MAX);
    let proxy_server = HttpServer::new(move || {
        App::new()
            .app_data(proxy_state.clone())
            .configure(proxy::config(max_body_bytes))
    })
        .bind((settings.server.host.as_str(), settings.server.port))?
        .run();

    info!("Admin API listening on {}:{}", settings.admin.host, settings.admin.port);
    let admin_server = HttpServer::new(move || App::new().app_data(admin_state.clone()).configure(api::config))
        .bind((settings.admin.host.as_str(), settings.admin.port))?
        .run();

    futures::try_join!(proxy_server, admin_server)?;

    info!("Shutting down, saving policy");
    if let Err(e) = firewall.persist() {
        error!("Failed to save policy on shutdown: {}", e);
    }

    Ok(())
}
