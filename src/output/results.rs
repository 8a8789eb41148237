//! Terminal rendering of sessions and saved results

use crate::scrape::{SessionReport, SessionStatus};
use crate::storage::{ResultSummary, ScrapeResultRecord};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Formats the outcome of one session
pub fn format_report(report: &SessionReport) -> String {
    let mut output = String::new();

    let headline = match &report.status {
        SessionStatus::Finished => "Scrape finished".to_string(),
        SessionStatus::Stopped => "Scrape stopped".to_string(),
        SessionStatus::Failed(error) => format!("Scrape failed: {}", error),
    };
    let _ = writeln!(output, "=== {} ===\n", headline);
    let _ = writeln!(output, "  Tab: {}", report.tab_id);
    let _ = writeln!(output, "  Scraper: {}", report.scraper_id);
    let _ = writeln!(output, "  Pages visited: {}", report.pages_visited);
    let _ = writeln!(output, "  Items collected: {}", report.items_collected);
    match &report.result_id {
        Some(id) => {
            let _ = writeln!(output, "  Saved as: {}", id);
        }
        None => {
            let _ = writeln!(output, "  Nothing saved");
        }
    }

    output
}

/// Formats the list of saved results, newest first
pub fn format_results(results: &[ResultSummary]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "=== Saved Results ({}) ===\n", results.len());

    if results.is_empty() {
        let _ = writeln!(output, "  (none)");
        return output;
    }

    for result in results {
        let _ = writeln!(
            output,
            "  {}  {:>5} items  {}  {}",
            result.id, result.item_count, result.scraper_name, result.created_at
        );
        let _ = writeln!(
            output,
            "      {}",
            result.page_title.as_deref().unwrap_or(&result.url)
        );
    }

    output
}

/// Formats one saved result with all of its items
///
/// Items are printed as tab-separated rows under a header of every field
/// name seen in the result.
pub fn format_result_detail(record: &ScrapeResultRecord) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "=== Result {} ===\n", record.id);
    let _ = writeln!(output, "  Scraper: {} ({})", record.scraper_name, record.scraper_id);
    let _ = writeln!(output, "  URL: {}", record.url);
    if let Some(title) = &record.page_title {
        let _ = writeln!(output, "  Title: {}", title);
    }
    let _ = writeln!(output, "  Saved: {}", record.created_at);
    let _ = writeln!(output, "  Items: {}\n", record.items.len());

    let columns: BTreeSet<&str> = record
        .items
        .iter()
        .flat_map(|item| item.fields.keys().map(String::as_str))
        .collect();

    let mut header = vec!["id"];
    header.extend(columns.iter().copied());
    let _ = writeln!(output, "{}", header.join("\t"));

    for item in &record.items {
        let mut row = vec![item.id.as_str()];
        row.extend(
            columns
                .iter()
                .map(|column| item.fields.get(*column).map(String::as_str).unwrap_or("")),
        );
        let _ = writeln!(output, "{}", row.join("\t"));
    }

    output
}

pub fn print_report(report: &SessionReport) {
    print!("{}", format_report(report));
}

pub fn print_results(results: &[ResultSummary]) {
    print!("{}", format_results(results));
}

pub fn print_result_detail(record: &ScrapeResultRecord) {
    print!("{}", format_result_detail(record));
}
