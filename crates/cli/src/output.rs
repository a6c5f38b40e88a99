//! Table rendering for reports, plans and the remote index.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use featuresync_core::models::{
    Outcome, ReconciliationPlan, ReconciliationReport, RemoteIndex, RunSummary,
};

use crate::style;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

/// Rows of `(name, outcome)` for every classified record, bucket by bucket.
pub fn report_rows(report: &ReconciliationReport) -> Vec<(&str, Outcome)> {
    [
        (&report.sent, Outcome::Sent),
        (&report.failures, Outcome::Unmatched),
        (&report.errors, Outcome::Rejected),
        (&report.ambiguous, Outcome::Ambiguous),
    ]
    .into_iter()
    .flat_map(|(names, outcome)| names.iter().map(move |n| (n.as_str(), outcome)))
    .collect()
}

pub fn report_table(report: &ReconciliationReport) -> Table {
    let mut table = new_table(vec!["Name", "Outcome"]);
    for (name, outcome) in report_rows(report) {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(style::outcome(&outcome.to_string())),
        ]);
    }
    table
}

pub fn print_summary(summary: &RunSummary) {
    let report = &summary.report;

    println!();
    println!("{}", style::header("Reconciliation Report"));
    println!();
    if report.total() > 0 {
        println!("{}", report_table(report));
        println!();
    }

    println!("  Sent       : {}", report.sent.len());
    println!("  Unmatched  : {}", report.failures.len());
    println!("  Errors     : {}", report.errors.len());
    println!("  Ambiguous  : {}", report.ambiguous.len());
    println!(
        "  Records    : {} source / {} remote",
        summary.source_count, summary.index_size
    );
    let elapsed = summary.completed_at - summary.started_at;
    println!(
        "  {}",
        style::dim(&format!(
            "run {} ({} auth, {} ms)",
            summary.run_id,
            summary.auth_mode,
            elapsed.num_milliseconds()
        ))
    );
    println!();

    if report.is_clean() {
        println!("{}", style::success("All records sent"));
    } else {
        println!("{}", style::warn("Some records were not sent"));
    }
}

pub fn plan_table(plan: &ReconciliationPlan) -> Table {
    let mut table = new_table(vec!["Name", "Object ID", "Would"]);
    for (name, id) in &plan.matched {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(id.as_str()),
            Cell::new("update"),
        ]);
    }
    for name in &plan.failures {
        table.add_row(vec![
            Cell::new(name),
            Cell::new("—"),
            Cell::new(style::outcome("failure")),
        ]);
    }
    table
}

pub fn index_table(index: &RemoteIndex) -> Table {
    let mut table = new_table(vec!["Name", "Object ID"]);
    for (name, id) in index.sorted_entries() {
        table.add_row(vec![Cell::new(name), Cell::new(id.as_str())]);
    }
    table
}
