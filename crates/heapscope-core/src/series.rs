//! Rolling series model and the sample aggregator that feeds it.
//!
//! The aggregator is the consumer side of the pipeline. It is driven on a
//! fixed timer: each [`Aggregator::tick`] drains the ingestion queue, decodes
//! every line in arrival order and appends accepted samples to the
//! [`SeriesModel`]. Draining and aggregation happen in one step on the
//! caller's thread, so the model itself needs no synchronization.
//!
//! Aggregation is strictly append-only: historical entries are never
//! recomputed, and each sample costs O(1) amortized.

use log::{debug, warn};

use crate::config::RegressionPolicy;
use crate::error::DecodeError;
use crate::ingest::LineReceiver;
use crate::record::{Sample, decode_line};
use crate::summary::SessionSummary;

// ---------------------------------------------------------------------------
// SeriesModel
// ---------------------------------------------------------------------------

/// Index-aligned series for one device session.
///
/// All six series always have the same length. The usage, largest-free-block
/// and free-block-count series are plotted against `operation_index`; the
/// internal-fragmentation series against `alloc_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesModel {
    session: u32,
    total_heap_bytes: u64,
    operation_index: Vec<u64>,
    alloc_index: Vec<u64>,
    heap_usage_pct: Vec<f64>,
    internal_frag: Vec<u32>,
    max_free_block: Vec<u32>,
    free_block_count: Vec<u32>,
    running_max_free_block: u32,
}

impl SeriesModel {
    pub fn new(total_heap_bytes: u64) -> Self {
        Self {
            session: 1,
            total_heap_bytes,
            operation_index: Vec::new(),
            alloc_index: Vec::new(),
            heap_usage_pct: Vec::new(),
            internal_frag: Vec::new(),
            max_free_block: Vec::new(),
            free_block_count: Vec::new(),
            running_max_free_block: 0,
        }
    }

    /// Append one sample to every series.
    pub fn push(&mut self, sample: &Sample) {
        self.operation_index.push(sample.operation_count());
        self.heap_usage_pct.push(sample.heap_usage_pct(self.total_heap_bytes));
        self.max_free_block.push(sample.max_free_block_bytes);
        self.free_block_count.push(sample.free_block_count);

        self.alloc_index.push(sample.successful_alloc_total);
        self.internal_frag.push(sample.internal_fragmentation_bytes);

        self.running_max_free_block = self
            .running_max_free_block
            .max(sample.max_free_block_bytes);
    }

    /// Clear every series and bump the session number.
    ///
    /// The running maximum of the largest free block survives: it only ever
    /// grows, across sessions too.
    fn begin_next_session(&mut self) {
        self.session += 1;
        self.operation_index.clear();
        self.alloc_index.clear();
        self.heap_usage_pct.clear();
        self.internal_frag.clear();
        self.max_free_block.clear();
        self.free_block_count.clear();
    }

    /// 1-based session number.
    pub fn session(&self) -> u32 {
        self.session
    }

    pub fn total_heap_bytes(&self) -> u64 {
        self.total_heap_bytes
    }

    pub fn len(&self) -> usize {
        self.operation_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_index.is_empty()
    }

    /// `successful_alloc_total + successful_free_total` per sample.
    pub fn operation_index(&self) -> &[u64] {
        &self.operation_index
    }

    /// `successful_alloc_total` per sample.
    pub fn alloc_index(&self) -> &[u64] {
        &self.alloc_index
    }

    pub fn heap_usage_pct(&self) -> &[f64] {
        &self.heap_usage_pct
    }

    pub fn internal_frag(&self) -> &[u32] {
        &self.internal_frag
    }

    pub fn max_free_block(&self) -> &[u32] {
        &self.max_free_block
    }

    pub fn free_block_count(&self) -> &[u32] {
        &self.free_block_count
    }

    /// Largest `max_free_block_bytes` ever observed.
    pub fn running_max_free_block(&self) -> u32 {
        self.running_max_free_block
    }

    /// Check the length invariants shared by all series.
    pub fn is_consistent(&self) -> bool {
        let n = self.operation_index.len();
        self.heap_usage_pct.len() == n
            && self.max_free_block.len() == n
            && self.free_block_count.len() == n
            && self.alloc_index.len() == self.internal_frag.len()
    }
}

// ---------------------------------------------------------------------------
// Tick reporting
// ---------------------------------------------------------------------------

/// Session-level anomalies observed while aggregating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A cumulative counter decreased: the device most likely reset.
    CounterRegression {
        previous_alloc_total: u64,
        previous_free_total: u64,
        alloc_total: u64,
        free_total: u64,
        /// Session the sample was appended to.
        session: u32,
        /// Whether a fresh session was started for it.
        started_new_session: bool,
    },
}

/// What one aggregation tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub drained: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub events: Vec<SessionEvent>,
}

impl TickReport {
    /// True for a tick that drained nothing.
    pub fn is_idle(&self) -> bool {
        self.drained == 0
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Owns the [`SeriesModel`] and all running statistics.
#[derive(Debug, Clone)]
pub struct Aggregator {
    series: SeriesModel,
    policy: RegressionPolicy,
    latest: Option<Sample>,
    samples_accepted: u64,
    lines_rejected: u64,
    counter_regressions: u64,
    last_decode_error: Option<DecodeError>,
    peak_usage_pct: Option<f64>,
    lowest_minimum_ever_free: Option<u32>,
}

impl Aggregator {
    pub fn new(total_heap_bytes: u64, policy: RegressionPolicy) -> Self {
        Self {
            series: SeriesModel::new(total_heap_bytes),
            policy,
            latest: None,
            samples_accepted: 0,
            lines_rejected: 0,
            counter_regressions: 0,
            last_decode_error: None,
            peak_usage_pct: None,
            lowest_minimum_ever_free: None,
        }
    }

    /// Drain the queue and fold every pending line into the series.
    ///
    /// A malformed line is logged and skipped; it never aborts the batch.
    /// An empty drain is a no-op.
    pub fn tick(&mut self, queue: &LineReceiver) -> TickReport {
        let lines = queue.drain_all();
        let mut report = TickReport {
            drained: lines.len(),
            ..TickReport::default()
        };
        if lines.is_empty() {
            return report;
        }

        for line in &lines {
            match self.ingest_line(line) {
                Ok(event) => {
                    report.accepted += 1;
                    report.events.extend(event);
                }
                Err(_) => report.rejected += 1,
            }
        }

        debug!(
            "tick: {} lines, {} accepted, {} rejected, series len {}",
            report.drained,
            report.accepted,
            report.rejected,
            self.series.len()
        );
        report
    }

    /// Decode and aggregate a single line.
    pub fn ingest_line(&mut self, line: &str) -> Result<Option<SessionEvent>, DecodeError> {
        match decode_line(line) {
            Ok(sample) => Ok(self.ingest_sample(sample)),
            Err(err) => {
                warn!("skipping malformed record: {err}");
                self.lines_rejected += 1;
                self.last_decode_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Aggregate an already-decoded sample.
    pub fn ingest_sample(&mut self, sample: Sample) -> Option<SessionEvent> {
        let event = match self.latest {
            Some(previous) if sample.regressed_from(&previous) => {
                Some(self.handle_regression(&previous, &sample))
            }
            _ => None,
        };

        self.series.push(&sample);
        self.samples_accepted += 1;

        let usage = sample.heap_usage_pct(self.series.total_heap_bytes());
        self.peak_usage_pct = Some(self.peak_usage_pct.map_or(usage, |p| p.max(usage)));
        self.lowest_minimum_ever_free = Some(
            self.lowest_minimum_ever_free
                .map_or(sample.minimum_ever_free_bytes, |m| {
                    m.min(sample.minimum_ever_free_bytes)
                }),
        );
        self.latest = Some(sample);

        event
    }

    fn handle_regression(&mut self, previous: &Sample, sample: &Sample) -> SessionEvent {
        self.counter_regressions += 1;
        let started_new_session = self.policy == RegressionPolicy::NewSession;
        if started_new_session {
            self.series.begin_next_session();
        }
        warn!(
            "cumulative counters went backwards (alloc {} -> {}, free {} -> {}); likely device reset{}",
            previous.successful_alloc_total,
            sample.successful_alloc_total,
            previous.successful_free_total,
            sample.successful_free_total,
            if started_new_session {
                format!(", starting session {}", self.series.session())
            } else {
                String::new()
            }
        );
        SessionEvent::CounterRegression {
            previous_alloc_total: previous.successful_alloc_total,
            previous_free_total: previous.successful_free_total,
            alloc_total: sample.successful_alloc_total,
            free_total: sample.successful_free_total,
            session: self.series.session(),
            started_new_session,
        }
    }

    /// Start a fresh session on request. Returns the new session number.
    pub fn start_new_session(&mut self) -> u32 {
        self.series.begin_next_session();
        debug!("manual reset, now on session {}", self.series.session());
        self.series.session()
    }

    /// Read-only view of the current series.
    pub fn series(&self) -> &SeriesModel {
        &self.series
    }

    /// Most recently accepted sample, across sessions.
    pub fn latest(&self) -> Option<&Sample> {
        self.latest.as_ref()
    }

    pub fn policy(&self) -> RegressionPolicy {
        self.policy
    }

    pub fn samples_accepted(&self) -> u64 {
        self.samples_accepted
    }

    pub fn lines_rejected(&self) -> u64 {
        self.lines_rejected
    }

    pub fn counter_regressions(&self) -> u64 {
        self.counter_regressions
    }

    pub fn last_decode_error(&self) -> Option<&DecodeError> {
        self.last_decode_error.as_ref()
    }

    /// Point-in-time summary of everything aggregated so far.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            total_heap_bytes: self.series.total_heap_bytes(),
            session: self.series.session(),
            samples_accepted: self.samples_accepted,
            lines_rejected: self.lines_rejected,
            counter_regressions: self.counter_regressions,
            series_len: self.series.len(),
            latest_usage_pct: self.series.heap_usage_pct().last().copied(),
            peak_usage_pct: self.peak_usage_pct,
            running_max_free_block: self.series.running_max_free_block(),
            lowest_minimum_ever_free: self.lowest_minimum_ever_free,
            latest: self.latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::queue;

    const TOTAL: u64 = 131_072;

    fn sample(alloc: u64, free: u64, free_space: u32, max_block: u32) -> Sample {
        Sample {
            ticks: alloc * 10,
            free_space_bytes: free_space,
            min_free_block_bytes: 8,
            max_free_block_bytes: max_block,
            internal_fragmentation_bytes: (alloc * 4) as u32,
            successful_alloc_total: alloc,
            successful_free_total: free,
            minimum_ever_free_bytes: free_space,
            free_block_count: 3,
            ..Sample::default()
        }
    }

    fn line(alloc: u64, free: u64, free_space: u32, max_block: u32) -> String {
        sample(alloc, free, free_space, max_block).to_string()
    }

    // -----------------------------------------------------------------------
    // SeriesModel
    // -----------------------------------------------------------------------

    #[test]
    fn new_model_is_empty_and_consistent() {
        let model = SeriesModel::new(TOTAL);
        assert!(model.is_empty());
        assert_eq!(model.session(), 1);
        assert_eq!(model.running_max_free_block(), 0);
        assert!(model.is_consistent());
    }

    #[test]
    fn push_appends_derived_values() {
        let mut model = SeriesModel::new(TOTAL);
        model.push(&sample(10, 4, 65_536, 900));
        assert_eq!(model.operation_index(), &[14]);
        assert_eq!(model.alloc_index(), &[10]);
        assert_eq!(model.heap_usage_pct(), &[50.0]);
        assert_eq!(model.internal_frag(), &[40]);
        assert_eq!(model.max_free_block(), &[900]);
        assert_eq!(model.free_block_count(), &[3]);
    }

    #[test]
    fn running_max_tracks_largest_block() {
        let mut model = SeriesModel::new(TOTAL);
        for (i, max_block) in [500, 300, 800, 200].into_iter().enumerate() {
            model.push(&sample(i as u64, 0, 1000, max_block));
        }
        assert_eq!(model.running_max_free_block(), 800);
    }

    // -----------------------------------------------------------------------
    // Aggregator ticks
    // -----------------------------------------------------------------------

    #[test]
    fn malformed_line_contributes_nothing() {
        let (tx, rx) = queue();
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        tx.enqueue(line(1, 0, 1000, 10)).unwrap();
        tx.enqueue(line(2, 0, 1000, 10)).unwrap();
        tx.enqueue("1,2,three".to_string()).unwrap();
        tx.enqueue(line(3, 1, 1000, 10)).unwrap();

        let report = agg.tick(&rx);
        assert_eq!(report.drained, 4);
        assert_eq!(report.accepted, 3);
        assert_eq!(report.rejected, 1);
        assert_eq!(agg.series().len(), 3);
        assert!(agg.series().is_consistent());
        assert_eq!(agg.lines_rejected(), 1);
        assert_eq!(agg.last_decode_error().unwrap().raw_line(), "1,2,three");
    }

    #[test]
    fn empty_tick_is_a_no_op() {
        let (_tx, rx) = queue();
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        agg.ingest_line(&line(1, 0, 1000, 10)).unwrap();
        let before = agg.series().clone();

        let report = agg.tick(&rx);
        assert!(report.is_idle());
        assert_eq!(agg.series(), &before);
    }

    #[test]
    fn invariants_hold_across_mixed_ticks() {
        let (tx, rx) = queue();
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        for round in 0..20u64 {
            if round % 3 != 0 {
                for i in 0..round {
                    tx.enqueue(line(round * 100 + i, round, 2000, 50)).unwrap();
                }
                tx.enqueue("garbage".to_string()).unwrap();
            }
            agg.tick(&rx);
            assert!(agg.series().is_consistent());
        }
    }

    #[test]
    fn arrival_order_is_preserved() {
        let (tx, rx) = queue();
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        for alloc in [5, 6, 9, 12] {
            tx.enqueue(line(alloc, 0, 1000, 10)).unwrap();
        }
        agg.tick(&rx);
        assert_eq!(agg.series().alloc_index(), &[5, 6, 9, 12]);
    }

    #[test]
    fn no_samples_means_empty_summary() {
        let agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        let summary = agg.summary();
        assert_eq!(summary.samples_accepted, 0);
        assert_eq!(summary.series_len, 0);
        assert!(summary.latest.is_none());
        assert!(summary.peak_usage_pct.is_none());
        assert!(agg.latest().is_none());
    }

    // -----------------------------------------------------------------------
    // Counter regression
    // -----------------------------------------------------------------------

    #[test]
    fn regression_starts_new_session_by_default() {
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        agg.ingest_line(&line(100, 90, 1000, 4000)).unwrap();
        agg.ingest_line(&line(120, 110, 1000, 500)).unwrap();

        let event = agg.ingest_line(&line(3, 1, 1000, 600)).unwrap();
        match event {
            Some(SessionEvent::CounterRegression {
                session,
                started_new_session,
                previous_alloc_total,
                alloc_total,
                ..
            }) => {
                assert_eq!(session, 2);
                assert!(started_new_session);
                assert_eq!(previous_alloc_total, 120);
                assert_eq!(alloc_total, 3);
            }
            None => panic!("expected a regression event"),
        }

        let series = agg.series();
        assert_eq!(series.session(), 2);
        assert_eq!(series.len(), 1);
        assert_eq!(series.operation_index(), &[4]);
        // The running maximum is never reset.
        assert_eq!(series.running_max_free_block(), 4000);
        assert_eq!(agg.counter_regressions(), 1);
        assert_eq!(agg.samples_accepted(), 3);
    }

    #[test]
    fn regression_with_continue_keeps_appending() {
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::Continue);
        agg.ingest_line(&line(100, 90, 1000, 10)).unwrap();
        let event = agg.ingest_line(&line(100, 2, 1000, 10)).unwrap();
        assert!(matches!(
            event,
            Some(SessionEvent::CounterRegression {
                session: 1,
                started_new_session: false,
                ..
            })
        ));
        assert_eq!(agg.series().len(), 2);
        assert_eq!(agg.series().operation_index(), &[190, 102]);
    }

    #[test]
    fn equal_counters_are_not_a_regression() {
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        agg.ingest_line(&line(7, 7, 1000, 10)).unwrap();
        assert_eq!(agg.ingest_line(&line(7, 7, 900, 10)).unwrap(), None);
        assert_eq!(agg.series().session(), 1);
    }

    #[test]
    fn manual_new_session_clears_series() {
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::Continue);
        agg.ingest_line(&line(1, 0, 1000, 10)).unwrap();
        assert_eq!(agg.start_new_session(), 2);
        assert!(agg.series().is_empty());
        assert!(agg.latest().is_some());
    }

    // -----------------------------------------------------------------------
    // Summary
    // -----------------------------------------------------------------------

    #[test]
    fn summary_tracks_peak_and_low_water() {
        let mut agg = Aggregator::new(TOTAL, RegressionPolicy::NewSession);
        agg.ingest_line(&line(1, 0, 98_304, 10)).unwrap(); // 25 %
        agg.ingest_line(&line(2, 0, 32_768, 10)).unwrap(); // 75 %
        agg.ingest_line(&line(3, 1, 65_536, 10)).unwrap(); // 50 %

        let summary = agg.summary();
        assert_eq!(summary.peak_usage_pct, Some(75.0));
        assert_eq!(summary.latest_usage_pct, Some(50.0));
        assert_eq!(summary.lowest_minimum_ever_free, Some(32_768));
        assert_eq!(summary.samples_accepted, 3);
        assert_eq!(summary.latest.map(|s| s.successful_alloc_total), Some(3));
    }
}
