//! Markdown reports for finished runs.

use std::fmt::Write;

use serde_json::Value;

use genoflow_core::plan::Plan;
use genoflow_core::types::JsonMap;

use crate::execution::{RunOutcome, RunStatus};

/// Strings as-is, everything else as pretty JSON.
fn block_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn write_results(out: &mut String, heading: &str, results: &JsonMap) {
    let _ = write!(out, "## {}\n\n", heading);
    for (key, value) in results {
        let _ = write!(out, "### {}\n```\n{}\n```\n\n", key, block_value(value));
    }
}

fn write_partial(out: &mut String, results: &JsonMap) {
    if !results.is_empty() {
        write_results(out, "Partial Results", results);
    }
}

/// Render the report for a finished run of `plan`.
pub fn render(plan: &Plan, outcome: &RunOutcome) -> String {
    let mut out = String::new();
    match &outcome.status {
        RunStatus::Succeeded => {
            let _ = write!(out, "# Analysis Complete\n\nQuery: {}\n\n", plan.goal());
            write_results(&mut out, "Results", &outcome.results);
        }
        RunStatus::FailedAtStep {
            description, error, ..
        } => {
            let _ = write!(
                out,
                "# Analysis Failed\n\nFailed at step: {}\n\nError: {}\n\n",
                description, error
            );
            write_partial(&mut out, &outcome.results);
        }
        RunStatus::IterationLimitReached { completed, total } => {
            let _ = write!(
                out,
                "# Analysis Incomplete\n\nCompleted {}/{} steps\n\n",
                completed, total
            );
            write_partial(&mut out, &outcome.results);
        }
        RunStatus::Blocked { pending } => {
            let _ = write!(
                out,
                "# Analysis Blocked\n\nNo runnable step among: {}\n\n",
                pending.join(", ")
            );
            write_partial(&mut out, &outcome.results);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(status: RunStatus, results: Value) -> RunOutcome {
        RunOutcome {
            status,
            completed: vec![],
            results: results.as_object().cloned().unwrap_or_default(),
            iterations: 0,
        }
    }

    #[test]
    fn test_complete_report() {
        let plan = Plan::fallback("count reads");
        let report = render(
            &plan,
            &outcome(
                RunStatus::Succeeded,
                json!({"stats": "Total reads: 1000", "counts": {"mapped": 990}}),
            ),
        );
        assert!(report.starts_with("# Analysis Complete\n\nQuery: count reads\n\n## Results\n\n"));
        assert!(report.contains("### stats\n```\nTotal reads: 1000\n```\n\n"));
        assert!(report.contains("\"mapped\": 990"));
        // insertion order is kept
        assert!(report.find("### stats") < report.find("### counts"));
    }

    #[test]
    fn test_failed_report_without_results() {
        let plan = Plan::fallback("q");
        let report = render(
            &plan,
            &outcome(
                RunStatus::FailedAtStep {
                    step_id: "step_1".into(),
                    description: "Process query: q".into(),
                    error: "No tool name specified".into(),
                },
                json!({}),
            ),
        );
        assert_eq!(
            report,
            "# Analysis Failed\n\nFailed at step: Process query: q\n\nError: No tool name specified\n\n"
        );
    }

    #[test]
    fn test_incomplete_and_blocked_reports() {
        let plan = Plan::fallback("q");
        let report = render(
            &plan,
            &outcome(
                RunStatus::IterationLimitReached {
                    completed: 50,
                    total: 100,
                },
                json!({"a": 1}),
            ),
        );
        assert!(report.contains("Completed 50/100 steps"));
        assert!(report.contains("## Partial Results"));

        let report = render(
            &plan,
            &outcome(
                RunStatus::Blocked {
                    pending: vec!["a".into(), "b".into()],
                },
                json!({}),
            ),
        );
        assert!(report.starts_with("# Analysis Blocked"));
        assert!(report.contains("No runnable step among: a, b"));
        assert!(!report.contains("Partial Results"));
    }
}
