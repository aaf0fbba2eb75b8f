//! Chunked writes
//!
//! Each chunk is committed on its own. A failed chunk is retried once; if
//! the retry also fails the chunk is dropped, the connection is recreated
//! and the remaining chunks proceed.

use super::{Store, StoreError};
use crate::alert::PriceObservation;
use crate::telemetry::{increment, CounterMetric};
use std::future::Future;

/// Outcome of a chunked write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub chunks: usize,
    pub written: usize,
    /// Chunks that succeeded on the second attempt
    pub retried: usize,
    pub reconnects: usize,
    /// Rows of chunks that failed twice
    pub dropped: usize,
}

/// Run `op`, retrying once on failure
pub async fn with_retry<T, F, Fut>(label: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(op = label, error = %e, "Store write failed, retrying once");
            op().await
        }
    }
}

/// Append observations in chunks of `chunk_size`. Never fails as a whole.
pub async fn write_chunks<S>(store: &S, rows: &[PriceObservation], chunk_size: usize) -> WriteReport
where
    S: Store + ?Sized,
{
    let mut report = WriteReport::default();

    for chunk in rows.chunks(chunk_size.max(1)) {
        report.chunks += 1;
        let mut attempts = 0;
        let result = with_retry("append_observations", || {
            attempts += 1;
            store.append_observations(chunk)
        })
        .await;

        match result {
            Ok(()) => {
                report.written += chunk.len();
                if attempts > 1 {
                    report.retried += 1;
                }
            }
            Err(e) => {
                report.dropped += chunk.len();
                increment(CounterMetric::RowsDropped, chunk.len() as u64);
                tracing::error!(rows = chunk.len(), error = %e, "Dropping chunk after retry");
                match store.reconnect().await {
                    Ok(()) => {
                        report.reconnects += 1;
                        increment(CounterMetric::StoreReconnects, 1);
                    }
                    Err(e) => tracing::error!(error = %e, "Store reconnect failed"),
                }
            }
        }
    }

    if report.dropped > 0 {
        tracing::warn!(
            written = report.written,
            dropped = report.dropped,
            "Chunked write finished with losses"
        );
    }
    report
}
