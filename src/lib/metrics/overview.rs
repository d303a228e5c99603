use std::collections::BTreeMap;

use analyzer_api::v1::network::{
    MessageTypeLatencyLeader, NetworkLatencyOverview, NodeLatencyLeader, NodePairLatencySummary,
    OverallLatencyStats,
};
use tracing::*;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Weighted {
    weighted: f64,
    count: f64,
}

impl Weighted {
    fn add(&mut self, weighted: f64, count: f64) {
        self.weighted += weighted;
        self.count += count;
    }

    fn average(&self) -> Option<f64> {
        (self.count > 0.0).then(|| self.weighted / self.count)
    }
}

/// Averages per key, skipping zero-count groups.
fn averages(groups: BTreeMap<String, Weighted>) -> BTreeMap<String, f64> {
    groups
        .into_iter()
        .filter_map(|(key, group)| Some((key, group.average()?)))
        .collect()
}

/// Highest average; keys are visited in ascending order and only a strictly
/// greater value takes over, so ties go to the lexicographically first key.
fn leader(averages: &BTreeMap<String, f64>) -> Option<(String, f64)> {
    let mut best: Option<(&String, f64)> = None;
    for (key, &average) in averages {
        if best.map_or(true, |(_, current)| average > current) {
            best = Some((key, average));
        }
    }
    best.map(|(key, average)| (key.clone(), average))
}

/// Count-weighted p95 across every node pair summary and message type.
///
/// Each entry contributes `p95LatencyMs * count` globally, to its message type
/// and, split in halves, to both nodes of the pair.
#[instrument(level = "debug", skip_all, fields(summaries = summaries.len()))]
pub fn network_overview(summaries: &[NodePairLatencySummary]) -> NetworkLatencyOverview {
    let mut overall = Weighted::default();
    let mut overall_count = 0u64;
    let mut by_type: BTreeMap<String, Weighted> = BTreeMap::new();
    let mut by_node: BTreeMap<String, Weighted> = BTreeMap::new();

    for summary in summaries {
        for (message_type, latency) in &summary.message_types {
            let count = latency.count as f64;
            let weighted = latency.p95_latency_ms * count;

            overall.add(weighted, count);
            overall_count += latency.count;
            by_type
                .entry(message_type.clone())
                .or_default()
                .add(weighted, count);

            for node in [&summary.node1_id, &summary.node2_id] {
                by_node
                    .entry(node.clone())
                    .or_default()
                    .add(weighted / 2.0, count / 2.0);
            }
        }
    }

    let overall_average = overall.average().unwrap_or_default();
    let message_type_latency = averages(by_type);
    let node_latency_contribution = averages(by_node);

    NetworkLatencyOverview {
        overall_stats: OverallLatencyStats {
            count: overall_count,
            weighted_avg_p95_ms: overall_average,
        },
        overall_weighted_avg_p95_latency_ms: overall_average,
        message_type_with_highest_avg_p95: leader(&message_type_latency).map(
            |(message_type, latency_ms)| MessageTypeLatencyLeader {
                message_type,
                latency_ms,
            },
        ),
        node_with_highest_avg_p95: leader(&node_latency_contribution)
            .map(|(node_id, latency_ms)| NodeLatencyLeader { node_id, latency_ms }),
        message_type_latency,
        node_latency_contribution,
    }
}

/// Summaries ordered by `nodePairKey`.
pub fn network_latency_stats(summaries: &[NodePairLatencySummary]) -> Vec<NodePairLatencySummary> {
    let mut sorted = summaries.to_vec();
    sorted.sort_by(|a, b| a.node_pair_key.cmp(&b.node_pair_key));
    sorted
}

#[cfg(test)]
mod tests {
    use analyzer_api::v1::network::MessageTypeLatency;

    use super::*;

    fn summary(node1: &str, node2: &str, entries: &[(&str, u64, f64)]) -> NodePairLatencySummary {
        NodePairLatencySummary {
            node_pair_key: format!("{node1}|{node2}"),
            node1_id: node1.to_string(),
            node2_id: node2.to_string(),
            message_types: entries
                .iter()
                .map(|&(message_type, count, p95_latency_ms)| {
                    (
                        message_type.to_string(),
                        MessageTypeLatency {
                            count,
                            p95_latency_ms,
                        },
                    )
                })
                .collect(),
            extra: Default::default(),
        }
    }

    #[test]
    fn weighted_overview_of_two_pairs() {
        let overview = network_overview(&[
            summary("A", "B", &[("vote", 10, 100.0)]),
            summary("B", "C", &[("vote", 5, 200.0)]),
        ]);

        let expected = 2000.0 / 15.0;
        assert!((overview.overall_weighted_avg_p95_latency_ms - expected).abs() < 1e-9);
        assert_eq!(overview.overall_stats.count, 15);
        assert!((overview.node_latency_contribution["B"] - expected).abs() < 1e-9);
        assert_eq!(overview.node_latency_contribution["A"], 100.0);
        assert_eq!(overview.node_latency_contribution["C"], 200.0);

        let node = overview.node_with_highest_avg_p95.unwrap();
        assert_eq!((node.node_id.as_str(), node.latency_ms), ("C", 200.0));
        let message_type = overview.message_type_with_highest_avg_p95.unwrap();
        assert_eq!(message_type.message_type, "vote");
    }

    #[test]
    fn odd_counts_are_split_exactly() {
        let overview = network_overview(&[summary("A", "B", &[("vote", 3, 10.0)])]);
        assert_eq!(overview.node_latency_contribution["A"], 10.0);
        assert_eq!(overview.node_latency_contribution["B"], 10.0);
    }

    #[test]
    fn ties_go_to_the_first_key() {
        let overview = network_overview(&[
            summary("B", "A", &[("prevote", 4, 50.0), ("precommit", 2, 50.0)]),
        ]);

        let message_type = overview.message_type_with_highest_avg_p95.unwrap();
        assert_eq!(message_type.message_type, "precommit");
        assert_eq!(overview.node_with_highest_avg_p95.unwrap().node_id, "A");
    }

    #[test]
    fn zero_counts_are_skipped() {
        let overview = network_overview(&[summary("A", "B", &[("vote", 0, 500.0)])]);
        assert!(overview.message_type_latency.is_empty());
        assert!(overview.node_with_highest_avg_p95.is_none());
        assert_eq!(overview.overall_weighted_avg_p95_latency_ms, 0.0);
    }

    #[test]
    fn no_input_has_no_leaders() {
        let overview = network_overview(&[]);
        assert_eq!(overview, NetworkLatencyOverview::default());
        assert!(overview.message_type_with_highest_avg_p95.is_none());
    }

    #[test]
    fn stats_are_sorted_by_pair_key() {
        let sorted = network_latency_stats(&[
            summary("C", "D", &[]),
            summary("A", "B", &[]),
        ]);
        let keys: Vec<&str> = sorted.iter().map(|s| s.node_pair_key.as_str()).collect();
        assert_eq!(keys, vec!["A|B", "C|D"]);
    }
}
