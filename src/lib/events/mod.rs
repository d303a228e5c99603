use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub const SEND_VOTE: &str = "sendVote";
pub const RECEIVE_VOTE: &str = "receiveVote";
pub const ENTERING_NEW_ROUND: &str = "enteringNewRound";
pub const RECEIVED_COMPLETE_PROPOSAL_BLOCK: &str = "receivedCompleteProposalBlock";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("Event is not a JSON object")]
    NotAnObject,
    #[error("Event {event_type:?} is missing field {field:?}")]
    MissingField {
        event_type: String,
        field: &'static str,
    },
    #[error("Event {event_type:?} has an invalid {field:?}: {value}")]
    InvalidField {
        event_type: String,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vote {
    pub height: i64,
    pub round: i64,
    pub validator_index: i64,
    pub vote_type: String,
}

/// A vote together with the remote peer: the recipient of a send, or the source of a receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteMessage {
    pub vote: Vote,
    pub peer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundPosition {
    pub height: i64,
    pub round: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoundStep {
    Propose,
    Prevote,
    Precommit,
    PrevoteWait,
    PrecommitWait,
    Commit,
    Wait,
}

impl RoundStep {
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            "proposeStep" => Some(Self::Propose),
            "enteringPrevoteStep" => Some(Self::Prevote),
            "enteringPrecommitStep" => Some(Self::Precommit),
            "enteringPrevoteWaitStep" => Some(Self::PrevoteWait),
            "enteringPrecommitWaitStep" => Some(Self::PrecommitWait),
            "enteringCommitStep" => Some(Self::Commit),
            "enteringWaitStep" => Some(Self::Wait),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    SendVote(VoteMessage),
    ReceiveVote(VoteMessage),
    EnteringNewRound(RoundPosition),
    ReceivedCompleteProposalBlock { height: i64, round: Option<i64> },
    RoundStep(RoundStep, RoundPosition),
    Generic,
}

/// One decoded tracer event. Serializes back to the raw object it was decoded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub kind: EventKind,
    raw: Map<String, Value>,
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

/// Queryable attribute of an event, used for grouping and measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Type,
    Timestamp,
    NodeId,
    Height,
    Round,
    ValidatorIndex,
    VoteType,
    SourcePeer,
    RecipientPeer,
}

/// Ordering follows document databases: null, then numbers, then strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Number(i64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl Event {
    pub fn decode(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(raw) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let event_type = match raw.get("type") {
            Some(Value::String(event_type)) => event_type.clone(),
            _ => {
                return Err(DecodeError::MissingField {
                    event_type: String::new(),
                    field: "type",
                })
            }
        };

        let timestamp = raw
            .get("timestamp")
            .ok_or_else(|| missing(&event_type, "timestamp"))
            .and_then(|value| {
                decode_timestamp(value).ok_or_else(|| DecodeError::InvalidField {
                    event_type: event_type.clone(),
                    field: "timestamp",
                    value: value.to_string(),
                })
            })?;

        let node_id = raw
            .get("nodeId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        let kind = decode_kind(&event_type, &raw)?;

        Ok(Self {
            event_type,
            timestamp,
            node_id,
            kind,
            raw,
        })
    }

    pub fn vote_message(&self) -> Option<&VoteMessage> {
        match &self.kind {
            EventKind::SendVote(message) | EventKind::ReceiveVote(message) => Some(message),
            _ => None,
        }
    }

    /// Height of the event, from the vote for vote events.
    pub fn height(&self) -> Option<i64> {
        match &self.kind {
            EventKind::SendVote(message) | EventKind::ReceiveVote(message) => {
                Some(message.vote.height)
            }
            EventKind::EnteringNewRound(position) | EventKind::RoundStep(_, position) => {
                Some(position.height)
            }
            EventKind::ReceivedCompleteProposalBlock { height, .. } => Some(*height),
            EventKind::Generic => self.raw.get("height").and_then(decode_integer),
        }
    }

    pub fn round(&self) -> Option<i64> {
        match &self.kind {
            EventKind::SendVote(message) | EventKind::ReceiveVote(message) => {
                Some(message.vote.round)
            }
            EventKind::EnteringNewRound(position) | EventKind::RoundStep(_, position) => {
                Some(position.round)
            }
            EventKind::ReceivedCompleteProposalBlock { round, .. } => *round,
            EventKind::Generic => self.raw.get("round").and_then(decode_integer),
        }
    }

    pub fn field(&self, field: Field) -> FieldValue {
        let text = |value: &str| FieldValue::Text(value.to_string());
        let number = |value: Option<i64>| value.map_or(FieldValue::Null, FieldValue::Number);

        match field {
            Field::Type => text(&self.event_type),
            Field::Timestamp => number(self.timestamp.timestamp_nanos_opt()),
            Field::NodeId => text(&self.node_id),
            Field::Height => number(self.height()),
            Field::Round => number(self.round()),
            Field::ValidatorIndex => number(
                self.vote_message()
                    .map(|message| message.vote.validator_index),
            ),
            Field::VoteType => self
                .vote_message()
                .map_or(FieldValue::Null, |message| text(&message.vote.vote_type)),
            Field::SourcePeer => match &self.kind {
                EventKind::ReceiveVote(message) => text(&message.peer),
                _ => FieldValue::Null,
            },
            Field::RecipientPeer => match &self.kind {
                EventKind::SendVote(message) => text(&message.peer),
                _ => FieldValue::Null,
            },
        }
    }
}

fn missing(event_type: &str, field: &'static str) -> DecodeError {
    DecodeError::MissingField {
        event_type: event_type.to_string(),
        field,
    }
}

fn decode_kind(event_type: &str, raw: &Map<String, Value>) -> Result<EventKind, DecodeError> {
    let integer = |field: &'static str| -> Result<i64, DecodeError> {
        raw.get(field)
            .ok_or_else(|| missing(event_type, field))
            .and_then(|value| {
                decode_integer(value).ok_or_else(|| DecodeError::InvalidField {
                    event_type: event_type.to_string(),
                    field,
                    value: value.to_string(),
                })
            })
    };

    let position = || -> Result<RoundPosition, DecodeError> {
        Ok(RoundPosition {
            height: integer("height")?,
            round: integer("round")?,
        })
    };

    let kind = match event_type {
        SEND_VOTE => EventKind::SendVote(decode_vote_message(event_type, raw, "recipientPeerId")?),
        RECEIVE_VOTE => EventKind::ReceiveVote(decode_vote_message(event_type, raw, "sourcePeerId")?),
        ENTERING_NEW_ROUND => EventKind::EnteringNewRound(position()?),
        RECEIVED_COMPLETE_PROPOSAL_BLOCK => EventKind::ReceivedCompleteProposalBlock {
            height: integer("height")?,
            round: raw.get("round").and_then(decode_integer),
        },
        other => match RoundStep::from_event_type(other) {
            Some(step) => EventKind::RoundStep(step, position()?),
            None => EventKind::Generic,
        },
    };

    Ok(kind)
}

fn decode_vote_message(
    event_type: &str,
    raw: &Map<String, Value>,
    peer_field: &'static str,
) -> Result<VoteMessage, DecodeError> {
    let vote = raw
        .get("vote")
        .and_then(Value::as_object)
        .ok_or_else(|| missing(event_type, "vote"))?;

    let integer = |field: &'static str| -> Result<i64, DecodeError> {
        vote.get(field)
            .and_then(decode_integer)
            .ok_or_else(|| missing(event_type, field))
    };

    let vote_type = vote
        .get("type")
        .and_then(normalize_vote_type)
        .ok_or_else(|| missing(event_type, "type"))?;

    let peer = raw
        .get(peer_field)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(event_type, peer_field))?
        .to_string();

    Ok(VoteMessage {
        vote: Vote {
            height: integer("height")?,
            round: integer("round")?,
            validator_index: integer("validatorIndex")?,
            vote_type,
        },
        peer,
    })
}

/// Vote types come either as names or as signed-message type numbers.
pub fn normalize_vote_type(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Number(number) => {
            let code = number.as_i64()?;
            Some(match code {
                1 => "prevote".to_string(),
                2 => "precommit".to_string(),
                32 => "proposal".to_string(),
                other => other.to_string(),
            })
        }
        _ => None,
    }
}

fn decode_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().and_then(|value| i64::try_from(value).ok())),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Accepts RFC3339 strings, epoch milliseconds and extended-JSON `{"$date": ...}` wrappers.
fn decode_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc)),
        Value::Number(number) => Utc.timestamp_millis_opt(number.as_i64()?).single(),
        Value::Object(object) => match object.get("$date")? {
            Value::Object(inner) => decode_integer(inner.get("$numberLong")?)
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            other => decode_timestamp(other),
        },
        _ => None,
    }
}
