pub mod aggregator;
pub mod correlation;
pub mod cursor;
pub mod error;
pub mod overview;
pub mod stats;
pub mod threshold;
pub mod window;

use std::{future::Future, time::Duration};

use tracing::*;

use error::{Error, Result};

pub const EVENTS_TIMEOUT: Duration = Duration::from_secs(30);
pub const METRICS_TIMEOUT: Duration = Duration::from_secs(15);

/// Runs CPU bound query work on the blocking pool, inside the caller's span.
///
/// The caller only awaits the join handle, so a deadline around it still fires
/// while the work is running.
pub async fn compute<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|error| Error::Worker(error.to_string()))
}

/// Runs a query under a deadline. A timed out query is dropped, never retried.
pub async fn with_timeout<T>(
    limit: Duration,
    query: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Query abandoned after {limit:?}");
            Err(Error::Timeout(limit))
        }
    }
}
