use std::collections::BTreeMap;

use analyzer_api::v1::stats::LatencyHistogramBucket;

pub const HISTOGRAM_BUCKETS: usize = 10;

/// Set-based reduction applied to every group of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reducer {
    Count,
    /// Fraction in `[0, 1]`.
    Percentile(f64),
    StdDevSample,
    Max,
    AutoHistogram(usize),
}

impl Reducer {
    pub fn needs_measure(&self) -> bool {
        !matches!(self, Self::Count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reduced {
    Count(u64),
    /// `None` when the reducer is undefined for the group (e.g. deviation of one value).
    Value(Option<f64>),
    Histogram(Vec<LatencyHistogramBucket>),
}

impl Reduced {
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(count) => Some(*count),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => *value,
            _ => None,
        }
    }
}

/// Nearest-rank percentile on already sorted values, index `round(p * (n - 1))`.
pub fn percentile_sorted(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let last = sorted.len() - 1;
    let idx = (fraction.clamp(0.0, 1.0) * last as f64).round() as usize;
    Some(sorted[idx.min(last)])
}

/// Bessel-corrected standard deviation, `None` below two samples.
pub fn std_dev_sample(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((sum_sq / (n - 1) as f64).sqrt())
}

/// Splits sorted values into at most `buckets` groups of roughly equal population.
///
/// Bucket `i` nominally ends at index `round((i + 1) * n / buckets)` and is then
/// extended while the next value equals its last one, so equal values never
/// straddle two buckets. A nominal end already swallowed by an extension drops
/// that bucket, which is the only way fewer than `buckets` groups come out.
/// `upper` of a bucket is the `lower` of the next; the last `upper` is the maximum.
pub fn auto_buckets(sorted: &[f64], buckets: usize) -> Vec<LatencyHistogramBucket> {
    let n = sorted.len();
    if n == 0 || buckets == 0 {
        return Vec::new();
    }

    let mut bounds: Vec<(usize, usize)> = Vec::with_capacity(buckets);
    let mut start = 0;
    for idx in 1..=buckets {
        // Half-up rounding of idx * n / buckets
        let nominal = (2 * idx * n + buckets) / (2 * buckets);
        if nominal <= start {
            continue;
        }

        let mut end = nominal.min(n);
        while end < n && sorted[end] == sorted[end - 1] {
            end += 1;
        }
        bounds.push((start, end));
        start = end;
        if start == n {
            break;
        }
    }

    bounds
        .iter()
        .enumerate()
        .map(|(idx, &(start, end))| LatencyHistogramBucket {
            lower: sorted[start],
            upper: bounds
                .get(idx + 1)
                .map_or(sorted[n - 1], |&(next_start, _)| sorted[next_start]),
            count: (end - start) as u64,
        })
        .collect()
}

/// Applies every reducer to one group of values.
pub fn reduce(values: &mut [f64], reducers: &[Reducer]) -> Vec<Reduced> {
    values.sort_by(|a, b| a.total_cmp(b));

    reducers
        .iter()
        .map(|reducer| match reducer {
            Reducer::Count => Reduced::Count(values.len() as u64),
            Reducer::Percentile(fraction) => Reduced::Value(percentile_sorted(values, *fraction)),
            Reducer::StdDevSample => Reduced::Value(std_dev_sample(values)),
            Reducer::Max => Reduced::Value(values.last().copied()),
            Reducer::AutoHistogram(buckets) => Reduced::Histogram(auto_buckets(values, *buckets)),
        })
        .collect()
}

/// Groups `(key, value)` rows and reduces each group, in ascending key order.
pub fn group_reduce<K: Ord>(
    rows: impl IntoIterator<Item = (K, f64)>,
    reducers: &[Reducer],
) -> Vec<(K, Vec<Reduced>)> {
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (key, value) in rows {
        groups.entry(key).or_default().push(value);
    }

    groups
        .into_iter()
        .map(|(key, mut values)| {
            let reduced = reduce(&mut values, reducers);
            (key, reduced)
        })
        .collect()
}
