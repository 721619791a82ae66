//! Human-readable rendering of a ledger. Formatting only.

use std::fmt::Write;

use crate::LedgerDocument;

const RULE_WIDTH: usize = 70;

pub fn render_summary(doc: &LedgerDocument) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let info = &doc.session_info;
    let (derived_ok, derived_failed) = doc.tally();
    let succeeded = info.successful_downloads.unwrap_or(derived_ok);
    let failed = info.failed_downloads.unwrap_or(derived_failed);

    let mut out = String::new();
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "BTS DATA DOWNLOAD PROVENANCE SUMMARY");
    let _ = writeln!(out, "{}\n", rule);

    let _ = writeln!(out, "Download Session: {}", info.start_time.to_rfc3339());
    if let Some(end) = info.end_time {
        let _ = writeln!(out, "Session Ended: {}", end.to_rfc3339());
    }
    let _ = writeln!(out, "Data Source: {}", info.data_source);
    let _ = writeln!(out, "Source URL: {}", info.source_url);
    let _ = writeln!(out, "Dataset: {}", info.dataset);
    let _ = writeln!(out, "Tool Version: {} ({})\n", info.tool_version, info.platform);

    let _ = writeln!(out, "Total Downloads Attempted: {}", succeeded + failed);
    let _ = writeln!(out, "Successful: {}", succeeded);
    let _ = writeln!(out, "Failed: {}\n", failed);

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "DOWNLOAD DETAILS");
    let _ = writeln!(out, "{}\n", rule);

    for entry in &doc.downloads {
        let mark = if entry.status.is_success() { "✓" } else { "✗" };
        let _ = writeln!(out, "{} {}-{}", mark, entry.year, entry.month_name);
        let _ = writeln!(out, "   Time: {}", entry.timestamp.to_rfc3339());
        let _ = writeln!(out, "   Status: {}", entry.status);
        let _ = writeln!(out, "   Fields Selected: {}", entry.num_fields);
        if let Some(name) = &entry.download_filename {
            let _ = writeln!(out, "   Filename: {}", name);
        }
        if let Some(size) = entry.file_size_bytes {
            let _ = writeln!(out, "   File Size: {} bytes", group_thousands(size));
        }
        if let Some(message) = &entry.error_message {
            let _ = writeln!(out, "   Error: {}", message);
        }
        out.push('\n');
    }

    // The field list is the same for every attempt of a session.
    if let Some(first) = doc.downloads.first() {
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "FIELDS SELECTED FOR ALL DOWNLOADS");
        let _ = writeln!(out, "{}\n", rule);
        for (i, field) in first.fields_selected.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, field);
        }
    }

    out
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
