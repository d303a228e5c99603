use std::ops::Bound;

use analyzer_api::v1::server::TimeWindowQuery;
use chrono::{DateTime, Duration, Utc};

use super::error::{Error, Result};
use crate::store::Filter;

/// Span used when a bound is missing.
pub fn default_span() -> Duration {
    Duration::minutes(1)
}

pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

/// Inclusive `[from, to]` query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Whether the caller gave at least one bound.
    pub explicit: bool,
}

impl TimeWindow {
    /// Fills missing or empty bounds relative to `now`: `to` defaults to `now`, `from` to `to - 1m`.
    pub fn resolve(query: &TimeWindowQuery, now: DateTime<Utc>) -> Result<Self> {
        let from = query
            .from
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(|value| parse_timestamp("from", value))
            .transpose()?;
        let to = query
            .to
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(|value| parse_timestamp("to", value))
            .transpose()?;

        let explicit = from.is_some() || to.is_some();
        let to = to.unwrap_or(now);
        let from = from.unwrap_or(to - default_span());

        if from > to {
            return Err(Error::InvalidWindow {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            });
        }

        Ok(Self { from, to, explicit })
    }

    pub fn filter(&self) -> Filter {
        Filter::default()
            .since(Bound::Included(self.from))
            .until(Bound::Included(self.to))
    }
}
