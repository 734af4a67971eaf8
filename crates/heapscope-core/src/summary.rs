//! End-of-run session summary, printable as text or serialized as JSON.

use std::fmt;

use serde::Serialize;

use crate::record::Sample;

/// Aggregate view of an ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub total_heap_bytes: u64,
    /// Current session number (1 + number of sessions started after it).
    pub session: u32,
    pub samples_accepted: u64,
    pub lines_rejected: u64,
    pub counter_regressions: u64,
    /// Points in the current session's series.
    pub series_len: usize,
    pub latest_usage_pct: Option<f64>,
    pub peak_usage_pct: Option<f64>,
    pub running_max_free_block: u32,
    pub lowest_minimum_ever_free: Option<u32>,
    pub latest: Option<Sample>,
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "—".to_string(), |v| format!("{v:.2}%"))
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Heap size:            {} bytes", self.total_heap_bytes)?;
        writeln!(f, "Samples accepted:     {}", self.samples_accepted)?;
        writeln!(f, "Lines rejected:       {}", self.lines_rejected)?;
        writeln!(
            f,
            "Session:              {} ({} counter regressions)",
            self.session, self.counter_regressions
        )?;
        writeln!(f, "Points this session:  {}", self.series_len)?;
        writeln!(f, "Heap usage (latest):  {}", pct(self.latest_usage_pct))?;
        writeln!(f, "Heap usage (peak):    {}", pct(self.peak_usage_pct))?;
        writeln!(
            f,
            "Largest free block:   {} bytes (max seen)",
            self.running_max_free_block
        )?;
        match self.lowest_minimum_ever_free {
            Some(low) => writeln!(f, "Minimum ever free:    {low} bytes")?,
            None => writeln!(f, "Minimum ever free:    —")?,
        }
        if let Some(s) = &self.latest {
            writeln!(
                f,
                "Heap operations:      {} (alloc {}, free {})",
                s.operation_count(),
                s.successful_alloc_total,
                s.successful_free_total
            )?;
            writeln!(f, "Free blocks:          {}", s.free_block_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> SessionSummary {
        SessionSummary {
            total_heap_bytes: 131_072,
            session: 1,
            samples_accepted: 0,
            lines_rejected: 0,
            counter_regressions: 0,
            series_len: 0,
            latest_usage_pct: None,
            peak_usage_pct: None,
            running_max_free_block: 0,
            lowest_minimum_ever_free: None,
            latest: None,
        }
    }

    #[test]
    fn text_for_empty_run_has_placeholders() {
        let text = empty().to_string();
        assert!(text.contains("Samples accepted:     0"));
        assert!(text.contains("Heap usage (peak):    —"));
        assert!(!text.contains("Heap operations"));
    }

    #[test]
    fn text_includes_latest_operations() {
        let mut summary = empty();
        summary.latest = Some(Sample {
            successful_alloc_total: 50,
            successful_free_total: 48,
            free_block_count: 6,
            ..Sample::default()
        });
        summary.peak_usage_pct = Some(8.447_265_625);
        let text = summary.to_string();
        assert!(text.contains("Heap operations:      98 (alloc 50, free 48)"));
        assert!(text.contains("8.45%"));
    }

    #[test]
    fn serializes_to_json() {
        let mut summary = empty();
        summary.samples_accepted = 3;
        summary.latest = Some(Sample {
            ticks: 1000,
            ..Sample::default()
        });
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["samples_accepted"], 3);
        assert_eq!(json["latest"]["ticks"], 1000);
        assert!(json["peak_usage_pct"].is_null());
    }
}
