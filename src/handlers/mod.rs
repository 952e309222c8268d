//! HTTP routing.
//!
//! The four pipeline endpoints accept every method and let their middleware
//! chain answer anything that is not a JSON POST, so CORS preflights and the
//! 405 envelope come from the same place as successful responses.

pub mod api;
pub mod ui;

use actix_web::web;

use crate::health;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(ui::index))
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api/v1")
                .route("/transcribe", web::route().to(api::transcribe))
                .route("/extract", web::route().to(api::extract))
                .route("/diagnose", web::route().to(api::diagnose))
                .route("/consultation", web::route().to(api::consultation))
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics)),
        );
}
