use std::ops::Bound;

use analyzer_api::v1::events::{CursorPaginationMeta, Page};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::*;

use super::{
    error::{Error, Result},
    window::TimeWindow,
};
use crate::{
    events::Event,
    store::{Filter, RecordStore, SortOrder},
};

/// Gossip bookkeeping messages hidden from the event listing.
pub const EXCLUDED_P2P_TYPES: [&str; 7] = [
    "p2pProposal",
    "p2pProposalPOL",
    "p2pNewRoundStep",
    "p2pHasVote",
    "p2pVoteSetMaj23",
    "p2pVoteSetBits",
    "p2pHasProposalBlockPart",
];

/// Opaque keyset boundary: an RFC3339 timestamp with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PaginationCursor(DateTime<Utc>);

impl PaginationCursor {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    pub fn encode(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn decode(field: &'static str, value: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(value)
            .map(|timestamp| Self(timestamp.with_timezone(&Utc)))
            .map_err(|_| Error::InvalidCursor {
                field,
                value: value.to_string(),
            })
    }

    /// Decodes an optional query value; an empty value counts as absent.
    pub fn parse(field: &'static str, value: Option<&str>) -> Result<Option<Self>> {
        value
            .filter(|value| !value.is_empty())
            .map(|value| Self::decode(field, value))
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPageRequest {
    pub window: TimeWindow,
    pub cursor: Option<PaginationCursor>,
    pub before: Option<PaginationCursor>,
    pub limit: usize,
    /// 1-indexed.
    pub segment: usize,
    pub include_total_count: bool,
}

/// Keyset pagination over the event stream, ascending by timestamp.
///
/// The window only constrains the listing when the caller gave a bound.
#[instrument(level = "debug", skip(store))]
pub async fn paginate_events(
    store: &dyn RecordStore,
    request: &EventPageRequest,
) -> Result<Page<Event, CursorPaginationMeta>> {
    let mut filter = Filter::default().without_types(EXCLUDED_P2P_TYPES);
    if request.window.explicit {
        filter = filter
            .since(Bound::Included(request.window.from))
            .until(Bound::Included(request.window.to));
    }
    if let Some(cursor) = request.cursor {
        filter = filter.since(Bound::Excluded(cursor.timestamp()));
    }
    if let Some(before) = request.before {
        filter = filter.until(Bound::Excluded(before.timestamp()));
    }

    let limit = request.limit.max(1);
    let skip = request.segment.saturating_sub(1).saturating_mul(limit);
    let mut data = store
        .scan(&filter, SortOrder::Ascending, skip, Some(limit + 1))
        .await?;

    let has_next = data.len() > limit;
    data.truncate(limit);

    let total_count = if request.include_total_count {
        Some(store.count(&filter).await?)
    } else {
        None
    };

    let pagination = CursorPaginationMeta {
        limit,
        has_next,
        has_previous: request.cursor.is_some(),
        next_cursor: data
            .last()
            .map(|event| PaginationCursor::new(event.timestamp).encode()),
        previous_cursor: data
            .first()
            .map(|event| PaginationCursor::new(event.timestamp).encode()),
        total_count,
    };

    debug!(
        "Returning {} events (has_next: {has_next}, skip: {skip})",
        data.len()
    );

    Ok(Page { data, pagination })
}
