use std::fmt::Write;

use comfy_table::Cell;

use super::styling::{bright, bright_green, bright_red};
use super::tables::{create_table, header, status_cell};
use crate::migrate::report::{RunReport, Status};

/// Prints the outcome counts of a run and every failed item, so a human can
/// re-run or hand-fix exactly those.
pub fn print_report(title: &str, report: &RunReport) {
    println!("{}", render_report(title, report));
}

fn render_report(title: &str, report: &RunReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "{} {}", bright("📋"), bright(title).underlined());

    let mut counts = create_table();
    counts.set_header(header(&["Processed", "Skipped", "Failed"]));
    counts.add_row(
        [Status::Processed, Status::Skipped, Status::Failed]
            .map(|status| status_cell(status, report.count(status))),
    );
    let _ = writeln!(output, "{counts}");

    let skipped: Vec<_> = report.with_status(Status::Skipped).collect();
    if !skipped.is_empty() {
        let _ = writeln!(output, "\n{}", bright("Skipped").underlined());
        let mut table = create_table();
        table.set_header(header(&["Resource", "Record", "Reason"]));
        for entry in skipped {
            table.add_row(vec![
                Cell::new(&entry.resource),
                Cell::new(record_label(entry.record)),
                Cell::new(&entry.detail),
            ]);
        }
        let _ = writeln!(output, "{table}");
    }

    if report.has_failures() {
        let _ = writeln!(output, "\n{}", bright_red("Failures").underlined());
        let mut table = create_table();
        table.set_header(header(&["Resource", "Record", "Error"]));
        for entry in report.failures() {
            table.add_row(vec![
                Cell::new(&entry.resource),
                Cell::new(record_label(entry.record)),
                Cell::new(&entry.detail),
            ]);
        }
        let _ = writeln!(output, "{table}");
    } else {
        let _ = writeln!(output, "\n{}", bright_green("No failures ✓"));
    }

    output
}

fn record_label(record: Option<u64>) -> String {
    record.map(|id| format!("#{id}")).unwrap_or_else(|| "-".to_string())
}
