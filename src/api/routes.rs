use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/addblock", web::post().to(handlers::add_block))
            .route("/dumpchain", web::get().to(handlers::dump_chain))
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/balance/{address}", web::get().to(handlers::get_balance))
            .route("/send", web::post().to(handlers::send))
    );
}
