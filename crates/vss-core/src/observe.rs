//! Optional metrics instrumentation for the vss engine.
//!
//! When the `observe` feature is enabled, index operations emit counters,
//! histograms, and gauges via the [`metrics`] crate. A downstream
//! application must install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a search executed against an index.
///
/// - `vss.search.total` – counter with `kind` label (`knn` / `range`)
/// - `vss.search.duration_seconds` – histogram of search latency
/// - `vss.search.results` – histogram of rows returned
#[inline]
pub fn record_search(kind: &'static str, duration: std::time::Duration, results: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vss.search.total", "kind" => kind).increment(1);
        metrics::histogram!("vss.search.duration_seconds", "kind" => kind)
            .record(duration.as_secs_f64());
        metrics::histogram!("vss.search.results", "kind" => kind).record(results as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (kind, duration, results);
    }
}

/// Record an index blob written during commit.
///
/// - `vss.flush.total` – counter
/// - `vss.flush.bytes` – histogram of serialized blob sizes
/// - `vss.flush.duration_seconds` – histogram of serialize + write latency
#[inline]
pub fn record_flush(bytes: usize, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vss.flush.total").increment(1);
        metrics::histogram!("vss.flush.bytes").record(bytes as f64);
        metrics::histogram!("vss.flush.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (bytes, duration);
    }
}

/// Record an index reloaded from its committed blob.
///
/// - `vss.reload.total` – counter with `reason` label
///   (`rollback` / `savepoint` / `data_version`)
#[inline]
pub fn record_reload(reason: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vss.reload.total", "reason" => reason).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = reason;
    }
}

/// Record a row-level mutation applied to a table.
///
/// - `vss.mutation.total` – counter with `op` label (`insert` / `delete` / `train`)
#[inline]
pub fn record_mutation(op: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("vss.mutation.total", "op" => op).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = op;
    }
}

/// Publish the bytes currently held by live index storage.
///
/// - `vss.index.memory_bytes` – gauge
#[inline]
pub fn record_index_memory(bytes: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("vss.index.memory_bytes").set(bytes as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = bytes;
    }
}
