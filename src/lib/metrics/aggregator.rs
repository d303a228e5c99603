use std::collections::BTreeMap;

use analyzer_api::v1::stats::{
    BlockConsensusLatency, BlockLatencyPoint, LatencyHistogramBucket, LatencyJitter, LatencyStats,
    MessageSuccessRate, PairLatency, VoteStatistics,
};
use tracing::*;

use super::{
    compute,
    correlation::{block_end_to_end_points, confirmed_vote_samples, BlockPoint, VoteSample},
    error::Result,
    stats::{group_reduce, percentile_sorted, reduce, Reduced, Reducer, HISTOGRAM_BUCKETS},
    window::TimeWindow,
};
use crate::{
    events::{Field, RECEIVE_VOTE, SEND_VOTE},
    store::{AggregateRow, RecordStore},
};

/// A latency at or above this multiple of the group's p95 is a spike.
pub const SPIKE_FACTOR: f64 = 2.0;

fn pair_latencies<'a>(
    samples: &'a [VoteSample],
) -> impl Iterator<Item = ((String, String), f64)> + 'a {
    samples.iter().filter_map(|sample| {
        let latency = sample.latency_ms()?;
        Some(((sample.sender.clone(), sample.receiver.clone()), latency))
    })
}

// ── Distribution ──

pub fn latency_histogram(samples: &[VoteSample]) -> Vec<LatencyHistogramBucket> {
    let mut latencies: Vec<f64> = samples.iter().filter_map(VoteSample::latency_ms).collect();
    match reduce(&mut latencies, &[Reducer::AutoHistogram(HISTOGRAM_BUCKETS)]).pop() {
        Some(Reduced::Histogram(buckets)) => buckets,
        _ => Vec::new(),
    }
}

/// Sample standard deviation per `(sender, receiver)`; pairs with a single sample are omitted.
pub fn latency_jitter(samples: &[VoteSample]) -> Vec<LatencyJitter> {
    group_reduce(pair_latencies(samples), &[Reducer::StdDevSample])
        .into_iter()
        .filter_map(|((sender, receiver), values)| {
            Some(LatencyJitter {
                sender,
                receiver,
                std_dev_ms: values.first()?.value()?,
            })
        })
        .collect()
}

pub fn pairwise_percentiles(samples: &[VoteSample]) -> Vec<PairLatency> {
    let reducers = [
        Reducer::Percentile(0.50),
        Reducer::Percentile(0.95),
        Reducer::Percentile(0.99),
    ];

    group_reduce(pair_latencies(samples), &reducers)
        .into_iter()
        .filter_map(|((sender, receiver), values)| {
            Some(PairLatency {
                sender,
                receiver,
                p50_ms: values.first()?.value()?,
                p95_ms: values.get(1)?.value()?,
                p99_ms: values.get(2)?.value()?,
            })
        })
        .collect()
}

/// Per `(sender, receiver, voteType)` latency summary, ordered by that key.
pub fn vote_statistics(samples: &[VoteSample]) -> Vec<VoteStatistics> {
    let mut groups: BTreeMap<(&str, &str, &str), Vec<f64>> = BTreeMap::new();
    for sample in samples {
        if let Some(latency) = sample.latency_ms() {
            groups
                .entry((
                    sample.sender.as_str(),
                    sample.receiver.as_str(),
                    sample.vote_type.as_str(),
                ))
                .or_default()
                .push(latency);
        }
    }

    groups
        .into_iter()
        .filter_map(|((sender, receiver, vote_type), mut latencies)| {
            latencies.sort_by(|a, b| a.total_cmp(b));
            let count = latencies.len();
            let p95 = percentile_sorted(&latencies, 0.95)?;
            let spikes = latencies
                .iter()
                .filter(|&&latency| latency >= SPIKE_FACTOR * p95)
                .count();

            Some(VoteStatistics {
                sender: sender.to_string(),
                receiver: receiver.to_string(),
                vote_type: vote_type.to_string(),
                count: count as u64,
                p50: percentile_sorted(&latencies, 0.50)?,
                p90: percentile_sorted(&latencies, 0.90)?,
                p95,
                p99: percentile_sorted(&latencies, 0.99)?,
                max: *latencies.last()?,
                spike_perc: 100.0 * spikes as f64 / count as f64,
            })
        })
        .collect()
}

/// One point per confirmed pair, ordered by height and then by send time.
pub fn block_latency_time_series(samples: &[VoteSample]) -> Vec<BlockLatencyPoint> {
    let mut points: Vec<BlockLatencyPoint> = samples
        .iter()
        .filter_map(|sample| {
            Some(BlockLatencyPoint {
                height: sample.height,
                sender: sample.sender.clone(),
                receiver: sample.receiver.clone(),
                latency_ms: sample.latency_ms()?,
            })
        })
        .collect();
    points.sort_by_key(|point| point.height);
    points
}

pub fn block_end_to_end_by_height(points: &[BlockPoint]) -> Vec<BlockConsensusLatency> {
    let rows = points.iter().map(|point| (point.height, point.latency_ms()));

    group_reduce(rows, &[Reducer::Percentile(0.50), Reducer::Percentile(0.95)])
        .into_iter()
        .filter_map(|(height, values)| {
            Some(BlockConsensusLatency {
                height,
                p50_ms: values.first()?.value()?,
                p95_ms: values.get(1)?.value()?,
            })
        })
        .collect()
}

// ── Store backed queries ──

#[instrument(level = "debug", skip(store))]
pub async fn latency_stats(store: &dyn RecordStore, window: &TimeWindow) -> Result<LatencyStats> {
    let samples = confirmed_vote_samples(store, window).await?;
    compute(move || LatencyStats {
        histogram: latency_histogram(&samples),
        jitter: latency_jitter(&samples),
    })
    .await
}

#[instrument(level = "debug", skip(store))]
pub async fn vote_statistics_in(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<VoteStatistics>> {
    let samples = confirmed_vote_samples(store, window).await?;
    compute(move || vote_statistics(&samples)).await
}

#[instrument(level = "debug", skip(store))]
pub async fn pairwise_percentiles_in(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<PairLatency>> {
    let samples = confirmed_vote_samples(store, window).await?;
    compute(move || pairwise_percentiles(&samples)).await
}

#[instrument(level = "debug", skip(store))]
pub async fn block_latency_time_series_in(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<BlockLatencyPoint>> {
    let samples = confirmed_vote_samples(store, window).await?;
    compute(move || block_latency_time_series(&samples)).await
}

#[instrument(level = "debug", skip(store))]
pub async fn block_end_to_end_in(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<BlockConsensusLatency>> {
    let points = block_end_to_end_points(store, window).await?;
    compute(move || block_end_to_end_by_height(&points)).await
}

type PairKey = (i64, String, String);

fn pair_counts(rows: Vec<AggregateRow>) -> impl Iterator<Item = (PairKey, u64)> {
    rows.into_iter().filter_map(|row| {
        let [height, sender, receiver] = row.key.as_slice() else {
            return None;
        };
        let key = (
            height.as_i64()?,
            sender.as_str()?.to_string(),
            receiver.as_str()?.to_string(),
        );
        Some((key, row.values.first()?.count()?))
    })
}

/// Sent and received vote counts per `(height, sender, receiver)`.
///
/// Sends count towards `nodeId -> recipientPeerId`, receives towards
/// `sourcePeerId -> nodeId`; unmatched sends count here even though the
/// correlation drops them.
#[instrument(level = "debug", skip(store))]
pub async fn message_success_rate(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<MessageSuccessRate>> {
    let sent = store
        .aggregate(
            &window.filter().with_types([SEND_VOTE]),
            &[Field::Height, Field::NodeId, Field::RecipientPeer],
            None,
            &[Reducer::Count],
        )
        .await?;
    let received = store
        .aggregate(
            &window.filter().with_types([RECEIVE_VOTE]),
            &[Field::Height, Field::SourcePeer, Field::NodeId],
            None,
            &[Reducer::Count],
        )
        .await?;

    let mut counts: BTreeMap<PairKey, (u64, u64)> = BTreeMap::new();
    for (key, count) in pair_counts(sent) {
        counts.entry(key).or_default().0 += count;
    }
    for (key, count) in pair_counts(received) {
        counts.entry(key).or_default().1 += count;
    }

    Ok(counts
        .into_iter()
        .map(
            |((height, sender, receiver), (sent_count, recv_count))| MessageSuccessRate {
                height,
                sender,
                receiver,
                sent_count,
                recv_count,
                success_rate: if sent_count == 0 {
                    0.0
                } else {
                    recv_count as f64 / sent_count as f64
                },
            },
        )
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::fixtures::{at, receive_vote, send_vote},
        metrics::correlation::correlate_votes,
        store::memory::MemoryStore,
    };

    fn window() -> TimeWindow {
        TimeWindow {
            from: at(0),
            to: at(100_000),
            explicit: true,
        }
    }

    fn scenario() -> Vec<VoteSample> {
        correlate_votes(&[
            send_vote(0, "a", "b", 1, 0, 0),
            send_vote(1, "a", "b", 1, 0, 1),
            send_vote(2, "a", "b", 1, 0, 2),
            receive_vote(3, "a", "b", 1, 0, 1),
            receive_vote(5, "a", "b", 1, 0, 0),
            receive_vote(10, "a", "b", 1, 0, 2),
        ])
        .0
    }

    #[test]
    fn vote_statistics_of_three_pairs() {
        let stats = vote_statistics(&scenario());
        assert_eq!(stats.len(), 1);

        let stats = &stats[0];
        assert_eq!(stats.count, 3);
        assert_eq!(stats.p50, 5.0);
        assert_eq!(stats.max, 8.0);
        assert_eq!(stats.spike_perc, 0.0);
        assert_eq!(stats.vote_type, "prevote");
    }

    #[test]
    fn spike_percentage_counts_values_twice_the_p95() {
        let mut events = Vec::new();
        // 99 fast samples and one slow one; p95 lands on a fast sample
        for idx in 0..100 {
            let latency = if idx == 99 { 50 } else { 10 };
            events.push(send_vote(idx * 100, "a", "b", 1, 0, idx));
            events.push(receive_vote(idx * 100 + latency, "a", "b", 1, 0, idx));
        }
        let (samples, _) = correlate_votes(&events);

        let stats = vote_statistics(&samples);
        assert_eq!(stats[0].p95, 10.0);
        assert_eq!(stats[0].spike_perc, 1.0);
        assert!((0.0..=100.0).contains(&stats[0].spike_perc));
    }

    #[test]
    fn jitter_omits_single_sample_pairs() {
        let (samples, _) = correlate_votes(&[
            send_vote(0, "a", "b", 1, 0, 0),
            receive_vote(4, "a", "b", 1, 0, 0),
            send_vote(0, "a", "c", 1, 0, 0),
            receive_vote(2, "a", "c", 1, 0, 0),
            send_vote(10, "a", "c", 2, 0, 0),
            receive_vote(16, "a", "c", 2, 0, 0),
        ]);

        let jitter = latency_jitter(&samples);
        assert_eq!(jitter.len(), 1);
        assert_eq!(jitter[0].receiver, "c");
        assert!((jitter[0].std_dev_ms - 8.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn histogram_covers_all_latencies() {
        let histogram = latency_histogram(&scenario());
        assert_eq!(histogram.len(), 3);
        assert_eq!(histogram[0].lower, 2.0);
        assert_eq!(histogram.last().unwrap().upper, 8.0);
        assert_eq!(histogram.iter().map(|bucket| bucket.count).sum::<u64>(), 3);

        assert!(latency_histogram(&[]).is_empty());
    }

    #[test]
    fn pairwise_percentiles_group_by_direction() {
        let (samples, _) = correlate_votes(&[
            send_vote(0, "a", "b", 1, 0, 0),
            receive_vote(4, "a", "b", 1, 0, 0),
            send_vote(0, "b", "a", 1, 0, 0),
            receive_vote(7, "b", "a", 1, 0, 0),
        ]);

        let pairs = pairwise_percentiles(&samples);
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].sender.as_str(), pairs[0].p95_ms), ("a", 4.0));
        assert_eq!((pairs[1].sender.as_str(), pairs[1].p99_ms), ("b", 7.0));
    }

    #[test]
    fn time_series_is_ordered_by_height() {
        let (samples, _) = correlate_votes(&[
            send_vote(0, "a", "b", 5, 0, 0),
            send_vote(1, "a", "b", 2, 0, 0),
            receive_vote(3, "a", "b", 5, 0, 0),
            receive_vote(4, "a", "b", 2, 0, 0),
        ]);

        let series = block_latency_time_series(&samples);
        let heights: Vec<i64> = series.iter().map(|point| point.height).collect();
        assert_eq!(heights, vec![2, 5]);
        assert_eq!(series[0].latency_ms, 3.0);
    }

    #[tokio::test]
    async fn success_rate_counts_unmatched_sends() {
        let store = MemoryStore::new(vec![
            send_vote(0, "a", "b", 1, 0, 0),
            send_vote(1, "a", "b", 1, 0, 1),
            receive_vote(5, "a", "b", 1, 0, 0),
            // A receive with no send in the window
            receive_vote(6, "c", "a", 2, 0, 0),
        ]);

        let rates = message_success_rate(&store, &window()).await.unwrap();
        assert_eq!(rates.len(), 2);

        assert_eq!((rates[0].sent_count, rates[0].recv_count), (2, 1));
        assert_eq!(rates[0].success_rate, 0.5);

        assert_eq!((rates[1].height, rates[1].sender.as_str()), (2, "c"));
        assert_eq!(rates[1].sent_count, 0);
        assert_eq!(rates[1].success_rate, 0.0);

        let samples = confirmed_vote_samples(&store, &window()).await.unwrap();
        assert_eq!(samples.len(), 1);
    }
}
