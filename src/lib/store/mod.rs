pub mod catalog;
pub mod memory;

use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    events::{Event, Field, FieldValue},
    metrics::stats::{Reduced, Reducer},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Reducer {0:?} needs a measure field")]
    MissingMeasure(Reducer),
    #[error("Store backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFilter {
    In(Vec<String>),
    NotIn(Vec<String>),
}

impl TypeFilter {
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::In(types) => types.iter().any(|t| t == event_type),
            Self::NotIn(types) => !types.iter().any(|t| t == event_type),
        }
    }
}

/// Timestamp range with independently inclusive or exclusive ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub lower: Bound<DateTime<Utc>>,
    pub upper: Bound<DateTime<Utc>>,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }
}

impl TimeRange {
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        let above = match &self.lower {
            Bound::Included(lower) => timestamp >= lower,
            Bound::Excluded(lower) => timestamp > lower,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(upper) => timestamp <= upper,
            Bound::Excluded(upper) => timestamp < upper,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Keeps the stricter of the current and the given lower bound.
    pub fn tighten_lower(&mut self, bound: Bound<DateTime<Utc>>) {
        self.lower = match (self.lower, bound) {
            (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
            (current, candidate) => {
                let (current_value, candidate_value) = (value_of(&current), value_of(&candidate));
                match candidate_value.cmp(&current_value) {
                    std::cmp::Ordering::Greater => candidate,
                    std::cmp::Ordering::Less => current,
                    std::cmp::Ordering::Equal if matches!(candidate, Bound::Excluded(_)) => {
                        candidate
                    }
                    std::cmp::Ordering::Equal => current,
                }
            }
        };
    }

    /// Keeps the stricter of the current and the given upper bound.
    pub fn tighten_upper(&mut self, bound: Bound<DateTime<Utc>>) {
        self.upper = match (self.upper, bound) {
            (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
            (current, candidate) => {
                let (current_value, candidate_value) = (value_of(&current), value_of(&candidate));
                match candidate_value.cmp(&current_value) {
                    std::cmp::Ordering::Less => candidate,
                    std::cmp::Ordering::Greater => current,
                    std::cmp::Ordering::Equal if matches!(candidate, Bound::Excluded(_)) => {
                        candidate
                    }
                    std::cmp::Ordering::Equal => current,
                }
            }
        };
    }
}

fn value_of(bound: &Bound<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match bound {
        Bound::Included(value) | Bound::Excluded(value) => Some(*value),
        Bound::Unbounded => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub types: Option<TypeFilter>,
    pub time: TimeRange,
}

impl Filter {
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = Some(TypeFilter::In(types.into_iter().map(Into::into).collect()));
        self
    }

    pub fn without_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = Some(TypeFilter::NotIn(
            types.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn since(mut self, bound: Bound<DateTime<Utc>>) -> Self {
        self.time.tighten_lower(bound);
        self
    }

    pub fn until(mut self, bound: Bound<DateTime<Utc>>) -> Self {
        self.time.tighten_upper(bound);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.time.contains(&event.timestamp)
            && self
                .types
                .as_ref()
                .map_or(true, |types| types.matches(&event.event_type))
    }
}

/// One group of an aggregation: the group-by values and one result per reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub key: Vec<FieldValue>,
    pub values: Vec<Reduced>,
}

/// Read-only access to an append-only, timestamp-ordered event collection.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Events matching `filter`, ordered by timestamp (ties in insertion order).
    async fn scan(
        &self,
        filter: &Filter,
        order: SortOrder,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>, StoreError>;

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError>;

    /// Groups matching events by `group_by` and reduces `measure` per group,
    /// in ascending key order. Events without a numeric `measure` are skipped.
    async fn aggregate(
        &self,
        filter: &Filter,
        group_by: &[Field],
        measure: Option<Field>,
        reducers: &[Reducer],
    ) -> Result<Vec<AggregateRow>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::fixtures::at;

    #[test]
    fn tightening_keeps_the_stricter_bound() {
        let mut range = TimeRange::default();
        range.tighten_lower(Bound::Included(at(10)));
        range.tighten_lower(Bound::Excluded(at(5)));
        assert_eq!(range.lower, Bound::Included(at(10)));

        range.tighten_lower(Bound::Excluded(at(10)));
        assert_eq!(range.lower, Bound::Excluded(at(10)));

        range.tighten_upper(Bound::Included(at(50)));
        range.tighten_upper(Bound::Excluded(at(40)));
        assert_eq!(range.upper, Bound::Excluded(at(40)));

        assert!(!range.contains(&at(10)));
        assert!(range.contains(&at(11)));
        assert!(!range.contains(&at(40)));
    }

    #[test]
    fn type_filters_include_and_exclude() {
        let only = TypeFilter::In(vec!["sendVote".into()]);
        assert!(only.matches("sendVote"));
        assert!(!only.matches("receiveVote"));

        let except = TypeFilter::NotIn(vec!["p2pHasVote".into()]);
        assert!(except.matches("sendVote"));
        assert!(!except.matches("p2pHasVote"));
    }
}
