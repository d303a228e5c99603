use std::sync::{Arc, PoisonError};

use actix_web::{rt, web, HttpRequest, HttpResponse};
use actix_web_validator::Query;
use chrono::Utc;
use serde::Serialize;
use tracing::*;

use analyzer_api::v1::{
    server::{
        EventsQuery, Info, TimeWindowQuery, VoteLatencyQuery, DEFAULT_EVENTS_LIMIT, DEFAULT_PAGE,
        DEFAULT_PER_PAGE,
    },
    stats::PercentileKey,
};

use crate::{
    metrics::{
        aggregator,
        cursor::{paginate_events, EventPageRequest, PaginationCursor},
        overview, threshold,
        window::TimeWindow,
        with_timeout, EVENTS_TIMEOUT, METRICS_TIMEOUT,
    },
    server::error::{Error, Result},
    store::catalog::{Catalog, Simulation},
};

type SimulationPath = web::Path<String>;

pub fn new_info() -> Info {
    Info {
        name: env!("CARGO_PKG_NAME").into(),
        version: env!("CARGO_PKG_VERSION").into(),
        authors: env!("CARGO_PKG_AUTHORS").into(),
    }
}

fn json<T: Serialize>(value: &T) -> Result<HttpResponse> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|error| Error::Internal(format!("{error:?}")))?;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(json))
}

/// Validates the window first, so a bad query is refused before the lookup.
fn resolve(
    catalog: &Catalog,
    simulation_id: &str,
    query: &TimeWindowQuery,
) -> Result<(Arc<Simulation>, TimeWindow)> {
    let window = TimeWindow::resolve(query, Utc::now())?;
    let simulation = catalog.get(simulation_id)?;
    Ok((simulation, window))
}

/// Provide information about the running service
pub async fn info() -> Result<HttpResponse> {
    json(&new_info())
}

pub async fn events(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<EventsQuery>,
) -> Result<HttpResponse> {
    let query = query.into_inner();
    let cursor = PaginationCursor::parse("cursor", query.cursor.as_deref())?;
    let before = PaginationCursor::parse("before", query.before.as_deref())?;
    let (simulation, window) = resolve(&catalog, &path, &query.window())?;

    let request = EventPageRequest {
        window,
        cursor,
        before,
        limit: query.limit.unwrap_or(DEFAULT_EVENTS_LIMIT),
        segment: query.segment.unwrap_or(1),
        include_total_count: query.include_total_count,
    };

    let page = with_timeout(
        EVENTS_TIMEOUT,
        paginate_events(simulation.events.as_ref(), &request),
    )
    .await?;

    json(&page)
}

pub async fn vote_latencies(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<VoteLatencyQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query.window())?;
    let key = query.threshold.unwrap_or(PercentileKey::P95);

    let page = with_timeout(
        METRICS_TIMEOUT,
        threshold::vote_latencies(
            simulation.events.as_ref(),
            &window,
            key,
            query.page.unwrap_or(DEFAULT_PAGE),
            query.per_page.unwrap_or(DEFAULT_PER_PAGE),
        ),
    )
    .await?;

    json(&page)
}

pub async fn pairwise_latency(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<TimeWindowQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query)?;
    let pairs = with_timeout(
        METRICS_TIMEOUT,
        aggregator::pairwise_percentiles_in(simulation.events.as_ref(), &window),
    )
    .await?;

    json(&pairs)
}

pub async fn latency_time_series(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<TimeWindowQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query)?;
    let points = with_timeout(
        METRICS_TIMEOUT,
        aggregator::block_latency_time_series_in(simulation.events.as_ref(), &window),
    )
    .await?;

    json(&points)
}

pub async fn latency_stats(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<TimeWindowQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query)?;
    let stats = with_timeout(
        METRICS_TIMEOUT,
        aggregator::latency_stats(simulation.events.as_ref(), &window),
    )
    .await?;

    json(&stats)
}

pub async fn message_success_rate(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<TimeWindowQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query)?;
    let rates = with_timeout(
        METRICS_TIMEOUT,
        aggregator::message_success_rate(simulation.events.as_ref(), &window),
    )
    .await?;

    json(&rates)
}

pub async fn end_to_end_latency(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<TimeWindowQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query)?;
    let latencies = with_timeout(
        METRICS_TIMEOUT,
        aggregator::block_end_to_end_in(simulation.events.as_ref(), &window),
    )
    .await?;

    json(&latencies)
}

pub async fn vote_statistics(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
    query: Query<TimeWindowQuery>,
) -> Result<HttpResponse> {
    let (simulation, window) = resolve(&catalog, &path, &query)?;
    let statistics = with_timeout(
        METRICS_TIMEOUT,
        aggregator::vote_statistics_in(simulation.events.as_ref(), &window),
    )
    .await?;

    json(&statistics)
}

pub async fn network_latency_stats(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
) -> Result<HttpResponse> {
    let simulation = catalog.get(&path)?;
    json(&overview::network_latency_stats(&simulation.pair_summaries))
}

pub async fn network_node_stats(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
) -> Result<HttpResponse> {
    let simulation = catalog.get(&path)?;
    json(&simulation.node_stats)
}

pub async fn network_overview(
    catalog: web::Data<Catalog>,
    path: SimulationPath,
) -> Result<HttpResponse> {
    let simulation = catalog.get(&path)?;
    json(&overview::network_overview(&simulation.pair_summaries))
}

/// Replays the recent log history, then streams new lines until the client leaves.
pub async fn log(req: HttpRequest, stream: web::Payload) -> Result<HttpResponse> {
    let (response, mut session, _stream) =
        actix_ws::handle(&req, stream).map_err(|error| Error::Internal(format!("{error:?}")))?;

    rt::spawn(async move {
        let (mut receiver, history) = crate::logger::manager::HISTORY
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe();

        for message in history {
            if session.text(message).await.is_err() {
                return;
            }
        }

        while let Ok(message) = receiver.recv().await {
            if session.text(message).await.is_err() {
                debug!("Log websocket closed");
                return;
            }
        }
    });

    Ok(response)
}
