use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_analyzed: AtomicU64,
    queries_generated: AtomicU64,
    searches_run: AtomicU64,
    estimates_produced: AtomicU64,
    knowledge_base_documents: AtomicU64,
    failures: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a document whose text was extracted successfully.
    pub fn record_analysis(&self) {
        self.documents_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a generated search query.
    pub fn record_query(&self) {
        self.queries_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a similarity search against the index.
    pub fn record_search(&self) {
        self.searches_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a materialized estimation.
    pub fn record_estimate(&self) {
        self.estimates_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Record documents pushed into the knowledge base.
    pub fn record_uploaded(&self, count: u64) {
        self.knowledge_base_documents
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Record a pipeline run that stopped on an error.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_analyzed: self.documents_analyzed.load(Ordering::Relaxed),
            queries_generated: self.queries_generated.load(Ordering::Relaxed),
            searches_run: self.searches_run.load(Ordering::Relaxed),
            estimates_produced: self.estimates_produced.load(Ordering::Relaxed),
            knowledge_base_documents: self.knowledge_base_documents.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents whose text was extracted since startup.
    pub documents_analyzed: u64,
    /// Search queries produced by the generative step.
    pub queries_generated: u64,
    /// Similarity searches issued.
    pub searches_run: u64,
    /// Estimations parsed into task tables.
    pub estimates_produced: u64,
    /// Documents uploaded to the knowledge base.
    pub knowledge_base_documents: u64,
    /// Pipeline runs that stopped on an error.
    pub failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_pipeline_stages() {
        let metrics = PipelineMetrics::new();
        metrics.record_analysis();
        metrics.record_query();
        metrics.record_search();
        metrics.record_search();
        metrics.record_estimate();
        metrics.record_uploaded(12);
        metrics.record_uploaded(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_analyzed, 1);
        assert_eq!(snapshot.queries_generated, 1);
        assert_eq!(snapshot.searches_run, 2);
        assert_eq!(snapshot.estimates_produced, 1);
        assert_eq!(snapshot.knowledge_base_documents, 15);
        assert_eq!(snapshot.failures, 0);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = PipelineMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
