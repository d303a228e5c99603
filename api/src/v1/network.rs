use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Precomputed latency of one message type between a node pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTypeLatency {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub p95_latency_ms: f64,
}

/// Externally supplied per node pair summary. Unknown fields are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePairLatencySummary {
    #[serde(default)]
    pub node_pair_key: String,
    #[serde(rename = "node1Id")]
    pub node1_id: String,
    #[serde(rename = "node2Id")]
    pub node2_id: String,
    #[serde(default)]
    pub message_types: BTreeMap<String, MessageTypeLatency>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallLatencyStats {
    pub count: u64,
    pub weighted_avg_p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTypeLatencyLeader {
    pub message_type: String,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLatencyLeader {
    pub node_id: String,
    pub latency_ms: f64,
}

/// Count-weighted p95 overview across every node pair summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLatencyOverview {
    pub overall_stats: OverallLatencyStats,
    pub overall_weighted_avg_p95_latency_ms: f64,
    pub message_type_with_highest_avg_p95: Option<MessageTypeLatencyLeader>,
    pub node_with_highest_avg_p95: Option<NodeLatencyLeader>,
    pub message_type_latency: BTreeMap<String, f64>,
    pub node_latency_contribution: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "nodePairKey": "a|b",
            "node1Id": "a",
            "node2Id": "b",
            "simulationId": "abc",
            "messageTypes": { "vote": { "count": 10, "p95LatencyMs": 100 } }
        });
        let summary: NodePairLatencySummary = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(summary.message_types["vote"].count, 10);
        assert_eq!(summary.message_types["vote"].p95_latency_ms, 100.0);
        assert_eq!(summary.extra["simulationId"], "abc");

        let back = serde_json::to_value(&summary).unwrap();
        assert_eq!(back["simulationId"], "abc");
        assert_eq!(back["node1Id"], "a");
    }
}
