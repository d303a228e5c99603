use actix_web::{http::StatusCode, test, web, App};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use consensus_analyzer::{
    events::Event,
    server::{manager::configure, rate_limit::TokenBucket},
    store::catalog::{Catalog, Simulation},
};

const ID: &str = "65f1a2b3c4d5e6f708192a3b";
const UNKNOWN_ID: &str = "0123456789abcdef01234567";

fn iso(millis: i64) -> String {
    let base = DateTime::<Utc>::from_timestamp(1_714_557_600, 0).unwrap();
    (base + Duration::milliseconds(millis)).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn vote(event_type: &str, millis: i64, node: &str, peer: &str, height: i64) -> Event {
    let peer_field = if event_type == "sendVote" {
        "recipientPeerId"
    } else {
        "sourcePeerId"
    };
    Event::decode(json!({
        "type": event_type,
        "timestamp": iso(millis),
        "nodeId": node,
        peer_field: peer,
        "vote": { "height": height, "round": 0, "validatorIndex": 1, "type": "prevote" }
    }))
    .unwrap()
}

/// Node `a` sends one prevote per height to `b`, received 10, 20, 30 and 40ms later.
fn simulation() -> Simulation {
    let mut events = Vec::new();
    for height in 1..=4 {
        let sent = (height - 1) * 100;
        events.push(vote("sendVote", sent, "a", "b", height));
        events.push(vote("receiveVote", sent + height * 10, "b", "a", height));
    }
    events.push(
        Event::decode(json!({ "type": "p2pHasVote", "timestamp": iso(50), "nodeId": "a" })).unwrap(),
    );

    let summaries = serde_json::from_value(json!([
        {
            "nodePairKey": "a|b",
            "node1Id": "a",
            "node2Id": "b",
            "messageTypes": { "vote": { "count": 2, "p95LatencyMs": 100.0 } }
        },
        {
            "nodePairKey": "a|c",
            "node1Id": "a",
            "node2Id": "c",
            "messageTypes": { "vote": { "count": 1, "p95LatencyMs": 200.0 } }
        }
    ]))
    .unwrap();

    Simulation::new(ID, events, summaries, vec![json!({ "nodeId": "a", "peers": 2 })])
}

const CLIENT: &str = "10.1.2.3:40000";

macro_rules! app {
    () => {
        app!(100, 6000)
    };
    ($burst:expr, $per_minute:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(Catalog::from_simulations([simulation()])))
                .configure(configure(TokenBucket::new($burst), $per_minute)),
        )
        .await
    };
}

fn request(uri: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri(uri)
        .peer_addr(CLIENT.parse().unwrap())
}

/// Status and JSON body of a GET request.
macro_rules! get {
    ($app:expr, $uri:expr $(,)?) => {{
        let response = test::call_service(&$app, request(&$uri).to_request()).await;
        let status = response.status();
        let body = test::read_body(response).await;
        (
            status,
            serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null),
        )
    }};
}

fn window() -> String {
    format!("from={}&to={}", iso(0), iso(1_000))
}

#[actix_web::test]
async fn info_reports_the_service() {
    let app = app!();
    let (status, body) = get!(app, "/v1/info");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "consensus-analyzer");
}

#[actix_web::test]
async fn invalid_requests_are_rejected_with_json_errors() {
    let app = app!();

    let cases = [
        "/v1/simulations/not-an-id/events".to_string(),
        format!("/v1/simulations/{ID}/events?limit=0"),
        format!("/v1/simulations/{ID}/events?limit=50001"),
        format!("/v1/simulations/{ID}/events?segment=0"),
        format!("/v1/simulations/{ID}/events?cursor=yesterday"),
        format!("/v1/simulations/{ID}/events?from={}&to={}", iso(1_000), iso(0)),
        format!("/v1/simulations/{ID}/metrics/latency/votes?threshold=p75"),
        format!("/v1/simulations/{ID}/metrics/latency/votes?perPage=1001"),
        format!("/v1/simulations/{ID}/metrics/latency/stats?from=not-a-time"),
        // Query values are checked before the simulation is looked up
        format!("/v1/simulations/{UNKNOWN_ID}/events?cursor=yesterday"),
        format!("/v1/simulations/{UNKNOWN_ID}/events?before=2024-13-01"),
    ];

    for uri in cases {
        let (status, body) = get!(app, uri);
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string(), "{uri}: {body}");
    }
}

#[actix_web::test]
async fn unknown_simulation_is_not_found() {
    let app = app!();

    for path in ["events", "metrics/latency/stats", "metrics/network/latency/overview"] {
        let (status, body) = get!(app, format!("/v1/simulations/{UNKNOWN_ID}/{path}"));
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert!(body["error"].as_str().unwrap().contains(UNKNOWN_ID));
    }
}

#[actix_web::test]
async fn events_are_paged_with_cursors() {
    let app = app!();

    let mut uri = format!("/v1/simulations/{ID}/events?limit=3&includeTotalCount=true");
    let mut types = Vec::new();
    let mut pages = 0;
    loop {
        let (status, body) = get!(app, uri);
        assert_eq!(status, StatusCode::OK);
        if pages == 0 {
            assert_eq!(body["pagination"]["totalCount"], 8);
            assert_eq!(body["pagination"]["hasPrevious"], false);
        }
        pages += 1;

        for event in body["data"].as_array().unwrap() {
            types.push(event["type"].as_str().unwrap().to_string());
        }
        if !body["pagination"]["hasNext"].as_bool().unwrap() {
            break;
        }
        let cursor = body["pagination"]["nextCursor"].as_str().unwrap();
        uri = format!(
            "/v1/simulations/{ID}/events?limit=3&cursor={}",
            cursor.replace(':', "%3A")
        );
    }

    assert_eq!(pages, 3);
    assert_eq!(types.len(), 8);
    assert!(!types.iter().any(|event_type| event_type == "p2pHasVote"));
}

#[actix_web::test]
async fn vote_latencies_above_the_median() {
    let app = app!();

    let (status, body) = get!(
        app,
        format!(
            "/v1/simulations/{ID}/metrics/latency/votes?threshold=p50&perPage=1&{}",
            window()
        )
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["data"][0]["height"], 3);
    assert_eq!(body["data"][0]["latencyMs"], 30.0);
}

#[actix_web::test]
async fn metrics_are_computed_over_the_window() {
    let app = app!();

    let (status, body) = get!(
        app,
        format!("/v1/simulations/{ID}/metrics/messages/success_rate?{}", window())
    );
    assert_eq!(status, StatusCode::OK);
    let rates = body.as_array().unwrap();
    assert_eq!(rates.len(), 4);
    assert!(rates.iter().all(|rate| rate["successRate"] == 1.0));

    let (status, body) = get!(
        app,
        format!("/v1/simulations/{ID}/metrics/latency/pairwise?{}", window())
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["sender"], "a");
    assert_eq!(body[0]["p99Ms"], 40.0);

    // Outside the window nothing matches
    let (status, body) = get!(app, format!("/v1/simulations/{ID}/metrics/latency/stats"));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["histogram"], json!([]));
}

#[actix_web::test]
async fn network_overview_weights_by_count() {
    let app = app!();

    let (status, body) = get!(
        app,
        format!("/v1/simulations/{ID}/metrics/network/latency/overview")
    );
    assert_eq!(status, StatusCode::OK);

    let average = body["overallWeightedAvgP95LatencyMs"].as_f64().unwrap();
    assert!((average - 400.0 / 3.0).abs() < 1e-9, "{average}");
    assert_eq!(body["overallStats"]["count"], 3);
    assert_eq!(body["messageTypeWithHighestAvgP95"]["messageType"], "vote");
    assert_eq!(body["nodeWithHighestAvgP95"]["nodeId"], "c");

    let (status, body) = get!(
        app,
        format!("/v1/simulations/{ID}/metrics/network/latency/node-stats")
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "nodeId": "a", "peers": 2 }]));
}

#[actix_web::test]
async fn rate_limiter_rejects_bursts() {
    let app = app!(2, 1);

    for _ in 0..2 {
        let response = test::call_service(&app, request("/v1/info").to_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = test::call_service(&app, request("/v1/info").to_request()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "2");
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retry_after"], "60s");

    // Another client still gets through
    let other = test::TestRequest::get()
        .uri("/v1/info")
        .peer_addr("10.9.9.9:40000".parse().unwrap())
        .to_request();
    assert_eq!(test::call_service(&app, other).await.status(), StatusCode::OK);
}
