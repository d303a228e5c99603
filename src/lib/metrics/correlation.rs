use std::collections::VecDeque;

use analyzer_api::v1::stats::VoteLatency;
use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashMap;
use tracing::*;

use super::{compute, error::Result, window::TimeWindow};
use crate::{
    events::{
        Event, EventKind, ENTERING_NEW_ROUND, RECEIVED_COMPLETE_PROPOSAL_BLOCK, RECEIVE_VOTE,
        SEND_VOTE,
    },
    store::{RecordStore, SortOrder},
};

pub fn delta_ms(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 1e6,
        None => delta.num_milliseconds() as f64,
    }
}

// ── Message level ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    Confirmed,
    Unconfirmed,
}

/// A vote send, with the matching receive when one was found in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSample {
    pub height: i64,
    pub round: i64,
    pub validator_index: i64,
    pub vote_type: String,
    pub sender: String,
    pub receiver: String,
    pub sent_time: DateTime<Utc>,
    pub received_time: Option<DateTime<Utc>>,
}

impl VoteSample {
    pub fn status(&self) -> SampleStatus {
        match self.received_time {
            Some(_) => SampleStatus::Confirmed,
            None => SampleStatus::Unconfirmed,
        }
    }

    pub fn latency(&self) -> Option<TimeDelta> {
        self.received_time
            .map(|received_time| received_time - self.sent_time)
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency().map(delta_ms)
    }

    pub fn to_row(&self) -> Option<VoteLatency> {
        Some(VoteLatency {
            height: self.height,
            round: self.round,
            vote_type: self.vote_type.clone(),
            validator_index: self.validator_index,
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            sent_time: self.sent_time,
            received_time: self.received_time?,
            latency_ms: self.latency_ms()?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinDiagnostics {
    pub sends: usize,
    pub receives: usize,
    pub matched: usize,
    pub unmatched_sends: usize,
    pub negative_latencies: usize,
}

impl JoinDiagnostics {
    pub fn log(&self, what: &str) {
        if self.negative_latencies > 0 {
            warn!(
                "{what}: {} of {} matched pairs have a negative latency",
                self.negative_latencies, self.matched
            );
        }
        debug!(
            "{what}: {} sends, {} receives, {} matched, {} unmatched sends",
            self.sends, self.receives, self.matched, self.unmatched_sends
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CorrelationKey<'a> {
    height: i64,
    round: i64,
    validator_index: i64,
    sender: &'a str,
    receiver: &'a str,
}

/// Pairs every send with a receive of the same correlation key.
///
/// Receives are indexed by key; a repeated key pairs sends and receives in
/// timestamp order and consumes each receive once. `events` must be sorted.
pub fn correlate_votes(events: &[Event]) -> (Vec<VoteSample>, JoinDiagnostics) {
    let mut diagnostics = JoinDiagnostics::default();
    let mut receives: FxHashMap<CorrelationKey, VecDeque<DateTime<Utc>>> = FxHashMap::default();

    for event in events {
        if let EventKind::ReceiveVote(message) = &event.kind {
            diagnostics.receives += 1;
            let key = CorrelationKey {
                height: message.vote.height,
                round: message.vote.round,
                validator_index: message.vote.validator_index,
                sender: &message.peer,
                receiver: &event.node_id,
            };
            receives.entry(key).or_default().push_back(event.timestamp);
        }
    }

    let mut samples = Vec::new();
    for event in events {
        let EventKind::SendVote(message) = &event.kind else {
            continue;
        };
        diagnostics.sends += 1;

        let key = CorrelationKey {
            height: message.vote.height,
            round: message.vote.round,
            validator_index: message.vote.validator_index,
            sender: &event.node_id,
            receiver: &message.peer,
        };
        let received_time = receives.get_mut(&key).and_then(VecDeque::pop_front);

        match received_time {
            Some(received_time) => {
                diagnostics.matched += 1;
                if received_time < event.timestamp {
                    diagnostics.negative_latencies += 1;
                }
            }
            None => diagnostics.unmatched_sends += 1,
        }

        samples.push(VoteSample {
            height: message.vote.height,
            round: message.vote.round,
            validator_index: message.vote.validator_index,
            vote_type: message.vote.vote_type.clone(),
            sender: event.node_id.clone(),
            receiver: message.peer.clone(),
            sent_time: event.timestamp,
            received_time,
        });
    }

    (samples, diagnostics)
}

/// Confirmed samples of the window, in send order.
#[instrument(level = "debug", skip(store))]
pub async fn confirmed_vote_samples(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<VoteSample>> {
    let filter = window.filter().with_types([SEND_VOTE, RECEIVE_VOTE]);
    let events = store.scan(&filter, SortOrder::Ascending, 0, None).await?;

    compute(move || {
        let (samples, diagnostics) = correlate_votes(&events);
        diagnostics.log("Vote correlation");

        samples
            .into_iter()
            .filter(|sample| sample.status() == SampleStatus::Confirmed)
            .collect()
    })
    .await
}

// ── Block level ──

/// A node entering a new round and a complete proposal block seen at the same height.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPoint {
    pub height: i64,
    pub new_round_time: DateTime<Utc>,
    pub complete_time: DateTime<Utc>,
}

impl BlockPoint {
    pub fn latency_ms(&self) -> f64 {
        delta_ms(self.complete_time - self.new_round_time)
    }
}

/// Cross joins new rounds with complete blocks per height, without deduplication.
pub fn join_block_phases(events: &[Event]) -> (Vec<BlockPoint>, JoinDiagnostics) {
    let mut diagnostics = JoinDiagnostics::default();
    let mut completes: FxHashMap<i64, Vec<DateTime<Utc>>> = FxHashMap::default();
    for event in events {
        if let EventKind::ReceivedCompleteProposalBlock { height, .. } = &event.kind {
            diagnostics.receives += 1;
            completes.entry(*height).or_default().push(event.timestamp);
        }
    }

    let mut points = Vec::new();
    for event in events {
        let EventKind::EnteringNewRound(position) = &event.kind else {
            continue;
        };
        diagnostics.sends += 1;

        let Some(complete_times) = completes.get(&position.height) else {
            diagnostics.unmatched_sends += 1;
            continue;
        };

        for &complete_time in complete_times {
            diagnostics.matched += 1;
            if complete_time < event.timestamp {
                diagnostics.negative_latencies += 1;
            }
            points.push(BlockPoint {
                height: position.height,
                new_round_time: event.timestamp,
                complete_time,
            });
        }
    }

    (points, diagnostics)
}

#[instrument(level = "debug", skip(store))]
pub async fn block_end_to_end_points(
    store: &dyn RecordStore,
    window: &TimeWindow,
) -> Result<Vec<BlockPoint>> {
    let filter = window
        .filter()
        .with_types([ENTERING_NEW_ROUND, RECEIVED_COMPLETE_PROPOSAL_BLOCK]);
    let events = store.scan(&filter, SortOrder::Ascending, 0, None).await?;

    compute(move || {
        let (points, diagnostics) = join_block_phases(&events);
        diagnostics.log("Block phase join");
        points
    })
    .await
}
