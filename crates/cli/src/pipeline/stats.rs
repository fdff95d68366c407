//! Broadcast statistics and reporting.

use serde::Serialize;

use contracts::{OutcomeKind, Recipient, RunSummary, RunTermination};
use dispatcher::{HistoryRecord, RunReport};
use observability::DeliveryStatsSummary;

/// How many failed recipients the text report lists
const MAX_LISTED_FAILURES: usize = 20;

/// Statistics from one broadcast
#[derive(Debug, Clone)]
pub struct BroadcastStats {
    /// Final summary and every outcome
    pub report: RunReport,

    /// Latency and batch statistics collected from the progress stream
    pub delivery: DeliveryStatsSummary,

    /// Session history, most recent last
    pub history: Vec<HistoryRecord>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a RunSummary,
    failures: Vec<FailureRow<'a>>,
    history: &'a [HistoryRecord],
}

#[derive(Serialize)]
struct FailureRow<'a> {
    recipient: Recipient,
    kind: OutcomeKind,
    detail: &'a str,
}

impl BroadcastStats {
    pub fn summary(&self) -> &RunSummary {
        &self.report.summary
    }

    fn failures(&self) -> impl Iterator<Item = FailureRow<'_>> + '_ {
        self.report
            .outcomes
            .iter()
            .filter(|o| o.kind.is_failure())
            .map(|o| FailureRow {
                recipient: o.recipient,
                kind: o.kind,
                detail: &o.detail,
            })
    }

    /// Machine-readable report
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&JsonReport {
            summary: &self.report.summary,
            failures: self.failures().collect(),
            history: &self.history,
        })
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        let summary = &self.report.summary;

        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Broadcast Summary                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Result: {}", termination_label(&summary.termination));
        println!("   ├─ Mode: {}", if summary.dry_run { "dry run" } else { "live" });
        println!("   ├─ Duration: {:.2}s", summary.duration().as_secs_f64());
        println!("   ├─ Recipients: {}", summary.total);
        println!("   ├─ Sent: {}", summary.sent());
        println!("   ├─ Failed: {}", summary.failed());
        if summary.counts.skipped > 0 {
            println!("   ├─ Skipped: {}", summary.counts.skipped);
        }
        if !summary.unprocessed.is_empty() {
            println!("   ├─ Unprocessed: {}", summary.unprocessed.len());
        }
        println!("   └─ Success rate: {:.1}%", summary.success_rate);

        println!("\n{}", self.delivery);

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            println!("Failed recipients");
            for row in failures.iter().take(MAX_LISTED_FAILURES) {
                println!("   ├─ {}: {}", row.recipient, row.detail);
            }
            if failures.len() > MAX_LISTED_FAILURES {
                println!(
                    "   └─ ... and {} more (use --json for the full list)",
                    failures.len() - MAX_LISTED_FAILURES
                );
            }
        }

        if self.history.len() > 1 {
            println!("\nSession history");
            for record in &self.history {
                println!(
                    "   ├─ {} {:>6} sent {:>6} failed {:>5.1}% {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.sent,
                    record.failed,
                    record.success_rate,
                    record.termination
                );
            }
        }

        println!();
    }
}

fn termination_label(termination: &RunTermination) -> String {
    match termination {
        RunTermination::Completed => "completed".to_string(),
        RunTermination::Cancelled => "cancelled at batch boundary".to_string(),
        RunTermination::Faulted { reason } => format!("faulted ({reason})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{Outcome, OutcomeCounts};
    use std::time::Duration;

    fn stats() -> BroadcastStats {
        let now = Utc::now();
        let mut counts = OutcomeCounts::default();
        counts.record(OutcomeKind::Sent);
        counts.record(OutcomeKind::BadRequest);
        let summary = RunSummary {
            started_at: now,
            finished_at: now,
            total: 2,
            counts,
            success_rate: counts.success_rate(),
            dry_run: false,
            termination: RunTermination::Completed,
            unprocessed: Vec::new(),
        };
        let outcome = |position: usize, kind: OutcomeKind, detail: &str| Outcome {
            recipient: Recipient::new(position as i64 + 1),
            position,
            batch: 0,
            kind,
            detail: detail.to_string(),
            timestamp: now,
            latency: Duration::from_millis(10),
            message_id: None,
        };
        BroadcastStats {
            history: vec![HistoryRecord::from(&summary)],
            report: RunReport {
                summary,
                outcomes: vec![
                    outcome(0, OutcomeKind::Sent, "sent"),
                    outcome(1, OutcomeKind::BadRequest, "bad_request: invalid request - too long"),
                ],
            },
            delivery: DeliveryStatsSummary::default(),
        }
    }

    #[test]
    fn test_json_lists_failures_only() {
        let json = stats().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let failures = value["failures"].as_array().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["recipient"], 2);
        assert_eq!(failures[0]["kind"], "bad_request");
        assert_eq!(value["summary"]["success_rate"], 50.0);
        assert_eq!(value["history"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_termination_label() {
        assert_eq!(termination_label(&RunTermination::Completed), "completed");
        assert!(termination_label(&RunTermination::Faulted {
            reason: "boom".into()
        })
        .contains("boom"));
    }
}
