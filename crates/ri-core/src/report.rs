//! Plain-text run report.
//!
//! Rendered on every run: full summary on clean completion, the error plus
//! whatever counters were gathered on a fatal abort.

use ri_common::Error;

use crate::stats::IngestSummary;

/// Render the final report.
pub fn render(summary: &IngestSummary, error: Option<&Error>) -> String {
    let mut out = String::new();

    match error {
        None => out.push_str("Ingest complete\n"),
        Some(e) => {
            out.push_str(&format!(
                "Ingest aborted: {e} (error code {})\nPartial counters:\n",
                e.code()
            ));
        }
    }

    out.push_str(&format!("  rows parsed:         {}\n", summary.parsed));
    out.push_str(&format!("  valid:               {}\n", summary.valid));
    out.push_str(&format!("  invalid:             {}\n", summary.invalid));
    out.push_str(&format!("  inserted:            {}\n", summary.inserted));
    out.push_str(&format!("  duplicates skipped:  {}\n", summary.duplicates));
    out.push_str(&format!("  failed:              {}\n", summary.failed_other));
    out.push_str(&format!(
        "  batches:             {} ({} fell back to per-record writes)\n",
        summary.batches, summary.fallback_batches
    ));
    out.push_str(&format!(
        "  elapsed:             {:.2}s ({:.0} records/s)\n",
        summary.elapsed_ms as f64 / 1000.0,
        summary.records_per_sec()
    ));

    match &summary.memory {
        Some(m) => out.push_str(&format!(
            "  memory:              peak {:.1} MB heap, mean {:.1} MB, peak RSS {:.1} MB, {} throttle activation(s), {} record(s) delayed\n",
            m.peak_heap_mb,
            m.mean_heap_mb,
            m.peak_resident_mb,
            m.throttle_activations,
            summary.throttled_records
        )),
        None => out.push_str("  memory:              monitor disabled\n"),
    }

    if !summary.record_errors.is_empty() {
        out.push_str("  per-record failures:\n");
        for err in summary.record_errors.iter().take(20) {
            out.push_str(&format!("    {} — {}\n", err.email, err.reason));
        }
        if summary.record_errors.len() > 20 {
            out.push_str(&format!(
                "    ... and {} more\n",
                summary.record_errors.len() - 20
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ri_common::RecordError;

    fn summary() -> IngestSummary {
        IngestSummary {
            parsed: 1000,
            valid: 900,
            invalid: 100,
            inserted: 898,
            duplicates: 2,
            batches: 9,
            elapsed_ms: 1500,
            record_errors: vec![RecordError {
                email: "dup@example.com".into(),
                reason: "duplicate-email".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn clean_report_contains_counts() {
        let text = render(&summary(), None);
        assert!(text.starts_with("Ingest complete"));
        assert!(text.contains("rows parsed:         1000"));
        assert!(text.contains("duplicates skipped:  2"));
        assert!(text.contains("dup@example.com — duplicate-email"));
        assert!(text.contains("monitor disabled"));
    }

    #[test]
    fn abort_report_leads_with_error() {
        let err = Error::MalformedInput("row 7: wrong field count".into());
        let text = render(&summary(), Some(&err));
        assert!(text.starts_with("Ingest aborted: malformed input"));
        assert!(text.contains("Partial counters:"));
        assert!(text.contains("rows parsed:         1000"));
    }

    #[test]
    fn long_error_list_is_truncated() {
        let mut s = summary();
        s.record_errors = (0..30)
            .map(|i| RecordError {
                email: format!("u{i}@example.com"),
                reason: "duplicate-email".into(),
            })
            .collect();
        let text = render(&s, None);
        assert!(text.contains("... and 10 more"));
    }
}
