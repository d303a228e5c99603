use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentile selector for latency threshold queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentileKey {
    P50,
    #[default]
    P95,
    P99,
}

impl PercentileKey {
    pub fn fraction(&self) -> f64 {
        match self {
            Self::P50 => 0.50,
            Self::P95 => 0.95,
            Self::P99 => 0.99,
        }
    }
}

impl std::fmt::Display for PercentileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P50 => write!(f, "p50"),
            Self::P95 => write!(f, "p95"),
            Self::P99 => write!(f, "p99"),
        }
    }
}

/// One correlated vote send/receive pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteLatency {
    pub height: i64,
    pub round: i64,
    #[serde(rename = "type")]
    pub vote_type: String,
    pub validator_index: i64,
    pub sender: String,
    pub receiver: String,
    pub sent_time: DateTime<Utc>,
    pub received_time: DateTime<Utc>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairLatency {
    pub sender: String,
    pub receiver: String,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLatencyPoint {
    pub height: i64,
    pub sender: String,
    pub receiver: String,
    pub latency_ms: f64,
}

/// Histogram bucket over `[lower, upper)`; the last bucket includes `upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyHistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyJitter {
    pub sender: String,
    pub receiver: String,
    pub std_dev_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub histogram: Vec<LatencyHistogramBucket>,
    pub jitter: Vec<LatencyJitter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSuccessRate {
    pub height: i64,
    pub sender: String,
    pub receiver: String,
    pub sent_count: u64,
    pub recv_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConsensusLatency {
    pub height: i64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

/// Latency distribution of one `(sender, receiver, voteType)` group, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteStatistics {
    pub sender: String,
    pub receiver: String,
    pub vote_type: String,
    pub count: u64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    pub spike_perc: f64,
}
