use std::{ops::Bound, sync::Arc};

use async_trait::async_trait;
use tracing::*;

use super::{AggregateRow, Filter, RecordStore, SortOrder, StoreError};
use crate::{
    events::{Event, Field, FieldValue},
    metrics::stats::{group_reduce, Reducer},
};

/// Immutable event collection kept sorted by timestamp.
///
/// Clones share the events. Reads run on the blocking pool so the calling
/// task stays responsive to its deadline.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    events: Arc<Vec<Event>>,
}

impl MemoryStore {
    pub fn new(mut events: Vec<Event>) -> Self {
        // Stable, so equal timestamps keep insertion order
        events.sort_by_key(|event| event.timestamp);
        Self {
            events: Arc::new(events),
        }
    }

    /// Contiguous slice of events inside the filter's time range.
    fn time_slice(&self, filter: &Filter) -> &[Event] {
        let start = match filter.time.lower {
            Bound::Included(lower) => self.events.partition_point(|e| e.timestamp < lower),
            Bound::Excluded(lower) => self.events.partition_point(|e| e.timestamp <= lower),
            Bound::Unbounded => 0,
        };
        let end = match filter.time.upper {
            Bound::Included(upper) => self.events.partition_point(|e| e.timestamp <= upper),
            Bound::Excluded(upper) => self.events.partition_point(|e| e.timestamp < upper),
            Bound::Unbounded => self.events.len(),
        };

        if start >= end {
            return &[];
        }
        &self.events[start..end]
    }

    fn matching<'a>(&'a self, filter: &'a Filter) -> impl DoubleEndedIterator<Item = &'a Event> {
        self.time_slice(filter)
            .iter()
            .filter(move |event| filter.matches(event))
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&MemoryStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|error| StoreError::Backend(error.to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn scan(
        &self,
        filter: &Filter,
        order: SortOrder,
        skip: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Event>, StoreError> {
        let limit = limit.unwrap_or(usize::MAX);
        let filter = filter.clone();
        let events = self
            .blocking(move |store| -> Vec<Event> {
                match order {
                    SortOrder::Ascending => store
                        .matching(&filter)
                        .skip(skip)
                        .take(limit)
                        .cloned()
                        .collect(),
                    SortOrder::Descending => store
                        .matching(&filter)
                        .rev()
                        .skip(skip)
                        .take(limit)
                        .cloned()
                        .collect(),
                }
            })
            .await?;

        trace!("Scanned {} events", events.len());
        Ok(events)
    }

    async fn count(&self, filter: &Filter) -> Result<u64, StoreError> {
        let filter = filter.clone();
        self.blocking(move |store| store.matching(&filter).count() as u64)
            .await
    }

    async fn aggregate(
        &self,
        filter: &Filter,
        group_by: &[Field],
        measure: Option<Field>,
        reducers: &[Reducer],
    ) -> Result<Vec<AggregateRow>, StoreError> {
        if measure.is_none() {
            if let Some(reducer) = reducers.iter().find(|reducer| reducer.needs_measure()) {
                return Err(StoreError::MissingMeasure(*reducer));
            }
        }

        let filter = filter.clone();
        let group_by = group_by.to_vec();
        let reducers = reducers.to_vec();
        self.blocking(move |store| {
            let rows = store.matching(&filter).filter_map(|event| {
                let key: Vec<FieldValue> =
                    group_by.iter().map(|field| event.field(*field)).collect();
                let value = match measure {
                    Some(field) => event.field(field).as_f64()?,
                    None => 0.0,
                };
                Some((key, value))
            });

            group_reduce(rows, &reducers)
                .into_iter()
                .map(|(key, values)| AggregateRow { key, values })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::fixtures::{at, generic, receive_vote, send_vote},
        metrics::stats::Reduced,
    };

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            generic(30, "p2pHasVote", "a"),
            send_vote(10, "a", "b", 1, 0, 0),
            receive_vote(20, "a", "b", 1, 0, 0),
            send_vote(10, "a", "c", 1, 0, 0),
            receive_vote(25, "a", "c", 1, 0, 0),
            send_vote(40, "b", "a", 2, 0, 1),
        ])
    }

    #[tokio::test]
    async fn scan_keeps_insertion_order_for_equal_timestamps() {
        let events = store()
            .scan(&Filter::default(), SortOrder::Ascending, 0, None)
            .await
            .unwrap();

        let recipients: Vec<FieldValue> = events
            .iter()
            .take(2)
            .map(|event| event.field(Field::RecipientPeer))
            .collect();
        assert_eq!(
            recipients,
            vec![FieldValue::Text("b".into()), FieldValue::Text("c".into())]
        );
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn scan_applies_bounds_types_skip_and_limit() {
        let store = store();
        let filter = Filter::default()
            .without_types(["p2pHasVote"])
            .since(Bound::Excluded(at(10)))
            .until(Bound::Included(at(40)));

        let events = store
            .scan(&filter, SortOrder::Ascending, 0, None)
            .await
            .unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(store.count(&filter).await.unwrap(), 3);

        let events = store
            .scan(&filter, SortOrder::Descending, 1, Some(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, at(25));
    }

    #[tokio::test]
    async fn clones_share_the_same_events() {
        let store = store();
        let copy = store.clone();
        assert!(Arc::ptr_eq(&store.events, &copy.events));
        assert_eq!(copy.count(&Filter::default()).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn empty_range_yields_nothing() {
        let filter = Filter::default()
            .since(Bound::Included(at(100)))
            .until(Bound::Included(at(50)));
        assert!(store()
            .scan(&filter, SortOrder::Ascending, 0, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn aggregate_counts_per_group() {
        let filter = Filter::default().with_types(["sendVote"]);
        let rows = store()
            .aggregate(
                &filter,
                &[Field::Height, Field::NodeId, Field::RecipientPeer],
                None,
                &[Reducer::Count],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[0].key,
            vec![
                FieldValue::Number(1),
                FieldValue::Text("a".into()),
                FieldValue::Text("b".into())
            ]
        );
        assert_eq!(rows[0].values, vec![Reduced::Count(1)]);
    }

    #[tokio::test]
    async fn aggregate_measures_numeric_fields() {
        let rows = store()
            .aggregate(
                &Filter::default(),
                &[Field::Type],
                Some(Field::Height),
                &[Reducer::Max, Reducer::Count],
            )
            .await
            .unwrap();

        // The generic event has no height and is skipped
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].key, vec![FieldValue::Text("sendVote".into())]);
        assert_eq!(rows[1].values[0].value(), Some(2.0));
        assert_eq!(rows[1].values[1].count(), Some(3));
    }

    #[tokio::test]
    async fn aggregate_without_measure_rejects_value_reducers() {
        let result = store()
            .aggregate(&Filter::default(), &[], None, &[Reducer::StdDevSample])
            .await;
        assert!(matches!(result, Err(StoreError::MissingMeasure(_))));
    }
}
