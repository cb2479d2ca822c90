use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use signup_api::application::registration_service::RegistrationService;
use signup_api::data::registration_store::InMemoryRegistrationStore;
use signup_api::infrastructure::config::AppConfig;
use signup_api::infrastructure::logging::init_logging;
use signup_api::presentation::handlers::AppState;
use signup_api::presentation::middleware::RequestContextMiddleware;
use signup_api::presentation::routes::{ROUTE_SUMMARY, configure};
use std::sync::Arc;
use tracing::{error, info};

fn cors_for(origin: Option<&str>) -> Cors {
    match origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .max_age(3600),
        None => Cors::default(),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Invalid configuration: {e:#}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    init_logging(&config.log_level);
    info!(?config, "Configuration loaded");

    info!("Creating in-memory registration store");
    let store = Arc::new(InMemoryRegistrationStore::new());

    info!("Creating registration service");
    let state = web::Data::new(AppState {
        registrations: RegistrationService::new(store),
    });
    info!("Application state initialized");

    let server_config = config.clone();
    let server = HttpServer::new(move || {
        tracing::trace!("Creating new application instance");
        App::new()
            .app_data(state.clone())
            .wrap(RequestContextMiddleware)
            .wrap(cors_for(server_config.cors_origin.as_deref()))
            .configure(configure(&server_config.api_prefix))
    })
    .shutdown_timeout(config.shutdown_timeout.as_secs());

    let (host, port) = config.bind_address();
    info!(host = %host, port = port, "Binding server to address");
    let server = server.bind((host.as_str(), port)).map_err(|e| {
        error!(host = %host, port = port, error = %e, "Failed to bind server");
        e
    })?;

    info!(
        host = %host,
        port = port,
        prefix = %config.api_prefix,
        routes = ROUTE_SUMMARY,
        "Starting HTTP server"
    );
    let result = server.run().await;

    // Storage and service are dropped with the last worker.
    match &result {
        Ok(()) => info!("HTTP server stopped, registration store released"),
        Err(e) => error!(error = %e, "HTTP server terminated with error"),
    }
    result
}
