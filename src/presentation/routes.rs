use crate::presentation::handlers::{
    complete_registration, create_partial_user, health_check, json_config,
};
use actix_web::web;

pub const ROUTE_SUMMARY: &str =
    "GET /health, POST /partial-users, POST /complete-registration";

/// Registers the API under `prefix` (an empty prefix mounts at the root).
pub fn configure(prefix: &str) -> impl FnOnce(&mut web::ServiceConfig) + '_ {
    move |cfg| {
        cfg.service(
            web::scope(prefix)
                .app_data(json_config())
                .route("/health", web::get().to(health_check))
                .route("/partial-users", web::post().to(create_partial_user))
                .route("/complete-registration", web::post().to(complete_registration)),
        );
    }
}
