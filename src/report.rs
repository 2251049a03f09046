//! Results reporting and formatting.

use crate::metrics::TestResults;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

/// Formats test results for output.
pub struct ResultsReport;

impl ResultsReport {
    /// Format results as a console table.
    pub fn format_table(results: &TestResults) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![format!("Load Test Results: {}", results.name)]);

        table.add_row(vec!["Duration:", &format!("{:.1}s", results.duration_secs)]);
        table.add_row(vec!["Users:", &results.users.to_string()]);
        table.add_row(vec![
            "Total Requests:",
            &results.total_requests.to_string(),
        ]);

        let success_rate = if results.total_requests > 0 {
            (results.successful_requests as f64 / results.total_requests as f64) * 100.0
        } else {
            0.0
        };
        table.add_row(vec!["Success Rate:", &format!("{:.1}%", success_rate)]);
        table.add_row(vec![
            "Requests/sec:",
            &format!("{:.1}", results.requests_per_second),
        ]);

        table.add_row(vec!["", ""]);
        table.add_row(vec!["Latency (ms)", "p50 / p90 / p95 / p99 / max"]);
        table.add_row(vec![
            "",
            &format!(
                "{:.1} / {:.1} / {:.1} / {:.1} / {:.1}",
                results.latency.p50_ms,
                results.latency.p90_ms,
                results.latency.p95_ms,
                results.latency.p99_ms,
                results.latency.max_ms
            ),
        ]);

        if !results.per_task.is_empty() {
            table.add_row(vec!["", ""]);
            for (name, stats) in &results.per_task {
                table.add_row(vec![
                    &format!("Task {}:", name),
                    &format!("{} ok / {} failed", stats.success, stats.failure),
                ]);
            }
        }

        table.to_string()
    }

    /// Format results as JSON.
    pub fn format_json(results: &TestResults) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(results)?)
    }

    /// Format results as a CSV row.
    pub fn format_csv(results: &TestResults) -> String {
        format!(
            "{},{},{:.1},{},{},{:.1},{:.1},{:.1},{:.1},{:.1}",
            results.timestamp,
            results.name,
            results.duration_secs,
            results.total_requests,
            results.failed_requests,
            results.requests_per_second,
            results.latency.p50_ms,
            results.latency.p90_ms,
            results.latency.p95_ms,
            results.latency.p99_ms
        )
    }

    /// CSV header row.
    pub fn csv_header() -> &'static str {
        "timestamp,name,duration_secs,requests,failed,rps,p50,p90,p95,p99"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{LatencySummary, TestResults};
    use std::collections::BTreeMap;

    fn sample_results() -> TestResults {
        TestResults {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            name: "smoke".to_string(),
            users: 5,
            duration_secs: 10.0,
            total_requests: 50,
            successful_requests: 48,
            failed_requests: 2,
            requests_per_second: 5.0,
            latency: LatencySummary {
                p50_ms: 10.0,
                p75_ms: 12.0,
                p90_ms: 15.0,
                p95_ms: 18.0,
                p99_ms: 25.0,
                min_ms: 5.0,
                max_ms: 30.0,
                mean_ms: 11.0,
            },
            per_task: BTreeMap::new(),
            git_info: None,
        }
    }

    #[test]
    fn test_table_contains_headline_stats() {
        let table = ResultsReport::format_table(&sample_results());
        assert!(table.contains("smoke"));
        assert!(table.contains("Total Requests:"));
        assert!(table.contains("50"));
    }

    #[test]
    fn test_csv_row_matches_header_arity() {
        let header_fields = ResultsReport::csv_header().split(',').count();
        let row_fields = ResultsReport::format_csv(&sample_results())
            .split(',')
            .count();
        assert_eq!(header_fields, row_fields);
    }

    #[test]
    fn test_json_round_trips() {
        let json = ResultsReport::format_json(&sample_results()).unwrap();
        let parsed: TestResults = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_requests, 50);
    }
}
