use std::sync::Arc;

use actix_cors::Cors;
use actix_extensible_rate_limit::{
    backend::{SimpleInputFunctionBuilder, SimpleOutput},
    RateLimiter,
};
use actix_web::{web, App, HttpRequest, HttpServer, ResponseError};
use tracing::*;
use tracing_actix_web::TracingLogger;

use super::{
    error::Error,
    pages,
    rate_limit::{TokenBucket, RATE_INTERVAL},
};
use crate::store::catalog::Catalog;

fn query_error_handler(error: actix_web_validator::Error, _: &HttpRequest) -> actix_web::Error {
    warn!("Problem with query: {error}");
    Error::from(error).into()
}

// Start REST API server with the desired address
pub async fn run(
    server_address: &str,
    catalog: Arc<Catalog>,
    limiter: TokenBucket,
    rate_per_minute: u32,
) -> Result<(), std::io::Error> {
    let catalog = web::Data::from(catalog);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .send_wildcard()
                    .max_age(3600),
            )
            .wrap(TracingLogger::default())
            .app_data(catalog.clone())
            .configure(configure(limiter.clone(), rate_per_minute))
    })
    .bind(server_address)?
    .run()
    .await
}

/// Mounts the `/v1` API behind a per-client rate limiter. Expects
/// `Data<Catalog>` to be registered on the app.
pub fn configure(
    limiter: TokenBucket,
    rate_per_minute: u32,
) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(
            actix_web_validator::QueryConfig::default().error_handler(query_error_handler),
        )
        .service(
            web::scope("/v1")
                // Add a rate limiter to prevent flood
                .wrap(
                    RateLimiter::builder(
                        limiter,
                        SimpleInputFunctionBuilder::new(RATE_INTERVAL, u64::from(rate_per_minute))
                            .real_ip_key()
                            .build(),
                    )
                    .add_headers()
                    .request_denied_response(|_: &SimpleOutput| {
                        Error::TooManyRequests.error_response()
                    })
                    .build(),
                )
                .configure(configure_api_routes),
        );
    }
}

fn configure_api_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/info", web::get().to(pages::info))
        .route("/log", web::get().to(pages::log))
        .service(
            web::scope("/simulations/{simulation_id}")
                .route("/events", web::get().to(pages::events))
                .service(
                    web::scope("/metrics")
                        .route("/latency/votes", web::get().to(pages::vote_latencies))
                        .route("/latency/pairwise", web::get().to(pages::pairwise_latency))
                        .route(
                            "/latency/timeseries",
                            web::get().to(pages::latency_time_series),
                        )
                        .route("/latency/stats", web::get().to(pages::latency_stats))
                        .route(
                            "/latency/end_to_end",
                            web::get().to(pages::end_to_end_latency),
                        )
                        .route(
                            "/messages/success_rate",
                            web::get().to(pages::message_success_rate),
                        )
                        .route("/vote/statistics", web::get().to(pages::vote_statistics))
                        .route(
                            "/network/latency/stats",
                            web::get().to(pages::network_latency_stats),
                        )
                        .route(
                            "/network/latency/node-stats",
                            web::get().to(pages::network_node_stats),
                        )
                        .route(
                            "/network/latency/overview",
                            web::get().to(pages::network_overview),
                        ),
                ),
        );
}
