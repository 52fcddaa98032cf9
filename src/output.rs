use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::OutputFormat;
use crate::identity::CacheStatus;
use crate::usage::UsageReport;

static JSON_OUTPUT: AtomicBool = AtomicBool::new(false);
static QUIET: AtomicBool = AtomicBool::new(false);

pub fn set_format(format: OutputFormat) {
    JSON_OUTPUT.store(matches!(format, OutputFormat::Json), Ordering::Relaxed);
}

pub fn is_json_output() -> bool {
    JSON_OUTPUT.load(Ordering::Relaxed)
}

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

#[derive(Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Where progress lines go. JSON mode keeps stdout for the report alone.
fn progress_stream() -> Option<Stream> {
    if is_quiet() {
        None
    } else if is_json_output() {
        Some(Stream::Stderr)
    } else {
        Some(Stream::Stdout)
    }
}

fn emit(line: &str) {
    match progress_stream() {
        Some(Stream::Stdout) => println!("{line}"),
        Some(Stream::Stderr) => eprintln!("{line}"),
        None => {}
    }
}

/// Print an informational line (skipped in quiet mode)
pub fn print_message(message: &str) {
    emit(message);
}

pub fn success(message: &str) {
    emit(&format!("{} {message}", "[SUCCESS]".green().bold()));
}

/// Warnings and errors are never suppressed.
pub fn warning(message: &str) {
    eprintln!("{} {message}", "[WARNING]".yellow().bold());
}

pub fn error(message: &str) {
    eprintln!("{} {message}", "[ERROR]".red().bold());
}

pub fn banner(title: &str) {
    print_message(&"=".repeat(60));
    print_message(title);
    print_message(&"=".repeat(60));
}

/// Print a table or JSON depending on output mode
pub fn print_table<T, R, F>(items: &[T], to_row: F)
where
    T: Serialize,
    R: Tabled,
    F: Fn(&T) -> R,
{
    if is_json_output() {
        println!("{}", serde_json::to_string_pretty(items).unwrap_or_default());
    } else {
        let rows: Vec<R> = items.iter().map(to_row).collect();
        let table = Table::new(rows).with(Style::rounded()).to_string();
        println!("{table}");
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Tickets")]
    count: usize,
}

pub fn print_status_counts(counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    emit("\nTicket counts by status:");
    let rows: Vec<StatusRow> = counts
        .iter()
        .map(|(status, count)| StatusRow {
            status: status.clone(),
            count: *count,
        })
        .collect();
    emit(&Table::new(rows).with(Style::rounded()).to_string());
}

#[derive(Tabled)]
struct UsageRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Calls")]
    calls: usize,
    #[tabled(rename = "Total (s)")]
    total: String,
    #[tabled(rename = "Average (s)")]
    average: String,
    #[tabled(rename = "Min (s)")]
    min: String,
    #[tabled(rename = "Max (s)")]
    max: String,
}

#[derive(Serialize)]
struct JsonUsageReport<'a> {
    #[serde(flatten)]
    report: &'a UsageReport,
    identity_cache: Option<JsonCacheInfo>,
}

#[derive(Serialize)]
struct JsonCacheInfo {
    entries: usize,
    age_hours: f64,
    expires_in_hours: f64,
}

/// Print the API usage report, including identity cache details when the
/// cache was in play.
pub fn print_usage_report(report: &UsageReport, cache: Option<&CacheStatus>) {
    if is_json_output() {
        let json = JsonUsageReport {
            report,
            identity_cache: cache.map(|c| JsonCacheInfo {
                entries: c.entries,
                age_hours: c.age_secs / 3600.0,
                expires_in_hours: c.expires_in_secs() / 3600.0,
            }),
        };
        println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        return;
    }

    println!();
    println!("{}", "=".repeat(60));
    println!("{}", "HELPDESK API USAGE REPORT".bold());
    println!("{}", "=".repeat(60));

    let mut rows: Vec<UsageRow> = report
        .active()
        .map(|(category, stats)| UsageRow {
            category: category.title(),
            calls: stats.count,
            total: format!("{:.2}", stats.total),
            average: format!("{:.4}", stats.average),
            min: format!("{:.4}", stats.min),
            max: format!("{:.4}", stats.max),
        })
        .collect();
    let total = report.total();
    rows.push(UsageRow {
        category: "TOTAL".to_string(),
        calls: total.count,
        total: format!("{:.2}", total.total),
        average: format!("{:.4}", total.average),
        min: format!("{:.4}", total.min),
        max: format!("{:.4}", total.max),
    });
    println!("{}", Table::new(rows).with(Style::rounded()));

    println!("\nOVERALL API TIME: {:.2} seconds", total.total);
    println!("AVERAGE TIME PER API CALL: {:.4} seconds", total.average);

    match cache {
        Some(status) => {
            println!("\nUSER CACHE:");
            println!("  - Entries: {} users", status.entries);
            println!("  - Age: {:.1} hours", status.age_secs / 3600.0);
            println!(
                "  - Expires in: {:.1} hours",
                status.expires_in_secs() / 3600.0
            );
        }
        None => println!("\nUSER CACHE: Not used"),
    }
    println!("{}", "=".repeat(60));
}
