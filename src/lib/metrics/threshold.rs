use analyzer_api::v1::{
    events::{Page, PaginationMeta},
    stats::{PercentileKey, VoteLatency},
};
use tracing::*;

use super::{
    correlation::{confirmed_vote_samples, VoteSample},
    error::Result,
    stats::percentile_sorted,
    window::TimeWindow,
};
use crate::store::RecordStore;

/// Latency at the requested percentile of all confirmed samples.
pub fn latency_threshold(samples: &[VoteSample], key: PercentileKey) -> Option<f64> {
    let mut latencies: Vec<f64> = samples.iter().filter_map(VoteSample::latency_ms).collect();
    latencies.sort_by(|a, b| a.total_cmp(b));
    percentile_sorted(&latencies, key.fraction())
}

/// Samples at or above the threshold, by ascending send time.
pub fn above_threshold(samples: Vec<VoteSample>, key: PercentileKey) -> Vec<VoteSample> {
    let Some(threshold) = latency_threshold(&samples, key) else {
        return Vec::new();
    };

    let mut selected: Vec<VoteSample> = samples
        .into_iter()
        .filter(|sample| {
            sample
                .latency_ms()
                .is_some_and(|latency| latency >= threshold)
        })
        .collect();
    selected.sort_by_key(|sample| sample.sent_time);
    selected
}

#[instrument(level = "debug", skip(store))]
pub async fn vote_latencies(
    store: &dyn RecordStore,
    window: &TimeWindow,
    key: PercentileKey,
    page: usize,
    per_page: usize,
) -> Result<Page<VoteLatency, PaginationMeta>> {
    let samples = confirmed_vote_samples(store, window).await?;
    let selected = above_threshold(samples, key);

    let pagination = PaginationMeta::new(page, per_page, selected.len());
    let data = selected[pagination.range()]
        .iter()
        .filter_map(VoteSample::to_row)
        .collect();

    debug!(
        "{} vote latencies at or above {key} in window",
        pagination.total
    );

    Ok(Page { data, pagination })
}
