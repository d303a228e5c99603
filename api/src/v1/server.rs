use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::v1::stats::PercentileKey;

pub const DEFAULT_EVENTS_LIMIT: usize = 10_000;
pub const MAX_EVENTS_LIMIT: usize = 50_000;
pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PER_PAGE: usize = 100;
pub const MAX_PER_PAGE: usize = 1_000;

#[derive(Debug, Serialize, Deserialize)]
pub struct Info {
    pub name: String,
    pub version: String,
    pub authors: String,
}

/// Time window bounds, both RFC3339.
#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
pub struct TimeWindowQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[validate(range(min = 1, max = 50000))]
    pub limit: Option<usize>,
    /// Exclusive lower timestamp bound, as returned in `nextCursor`.
    pub cursor: Option<String>,
    /// Exclusive upper timestamp bound, as returned in `previousCursor`.
    pub before: Option<String>,
    /// 1-indexed page of `limit` events, applied after `cursor`/`before`.
    #[validate(range(min = 1))]
    pub segment: Option<usize>,
    #[serde(default)]
    pub include_total_count: bool,
}

impl EventsQuery {
    pub fn window(&self) -> TimeWindowQuery {
        TimeWindowQuery {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VoteLatencyQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<usize>,
    #[validate(range(min = 1, max = 1000))]
    pub per_page: Option<usize>,
    pub threshold: Option<PercentileKey>,
}

impl VoteLatencyQuery {
    pub fn window(&self) -> TimeWindowQuery {
        TimeWindowQuery {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_query_limit_bounds_are_enforced() {
        let mut query = EventsQuery {
            limit: Some(MAX_EVENTS_LIMIT),
            ..Default::default()
        };
        assert!(query.validate().is_ok());

        query.limit = Some(MAX_EVENTS_LIMIT + 1);
        assert!(query.validate().is_err());

        query.limit = Some(0);
        assert!(query.validate().is_err());
    }

    #[test]
    fn vote_latency_query_rejects_zero_page() {
        let query = VoteLatencyQuery {
            page: Some(0),
            ..Default::default()
        };
        assert!(query.validate().is_err());

        let query = VoteLatencyQuery {
            per_page: Some(MAX_PER_PAGE + 1),
            ..Default::default()
        };
        assert!(query.validate().is_err());
    }
}
