use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use crate::client::HelpdeskApi;
use crate::commands::comments::{self, FetchOptions};
use crate::commands::tickets;
use crate::commands::users::{self, IdentitySource};
use crate::csv;
use crate::identity::IdentityCache;
use crate::output;
use crate::record::{self, ExportRecord};
use crate::usage::{Category, UsageReport, UsageTracker};
use crate::window::DateWindow;

/// Pipeline position of an export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Authenticating,
    ResolvingIdentities,
    ListingTickets,
    FetchingComments,
    Formatting,
    Exporting,
    Done,
    Failed,
}

pub struct ExportPlan {
    pub window: DateWindow,
    pub use_cache: bool,
    pub skip_report: bool,
    pub fetch: FetchOptions,
    pub output_dir: PathBuf,
}

impl ExportPlan {
    pub fn file_name(&self) -> String {
        format!("helpdesk_tickets_{}.csv", self.window.file_label())
    }
}

pub struct RunSummary {
    /// Every stage entered, in order.
    pub stages: Vec<Stage>,
    pub tickets_listed: usize,
    pub rows_written: usize,
    pub output: Option<PathBuf>,
    pub report: UsageReport,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Idle)
    }
}

struct Progress {
    stages: Vec<Stage>,
}

impl Progress {
    fn enter(&mut self, stage: Stage) {
        debug!(?stage, "entering stage");
        self.stages.push(stage);
    }
}

#[derive(Default)]
struct Outcome {
    tickets_listed: usize,
    rows_written: usize,
    output: Option<PathBuf>,
    cache_used: bool,
}

/// Run one export end to end. Stage failures degrade the run instead of
/// aborting it; only a failed credential check stops it early. The usage
/// report is printed at the end either way unless the plan skips it.
pub async fn run(
    api: &dyn HelpdeskApi,
    cache: &IdentityCache,
    tracker: &UsageTracker,
    plan: &ExportPlan,
) -> RunSummary {
    let started = Instant::now();
    tracker.reset();
    let mut progress = Progress {
        stages: vec![Stage::Idle],
    };

    output::banner("HELPDESK TICKET EXPORT WITH COMMENTS");
    let outcome = run_stages(api, cache, tracker, plan, &mut progress).await;
    let report = tracker.report();

    if !plan.skip_report {
        let cache_status = if outcome.cache_used {
            cache.status_at(Utc::now()).ok().flatten()
        } else {
            None
        };
        output::print_usage_report(&report, cache_status.as_ref());
    }

    let elapsed = started.elapsed();
    output::print_message(&format!(
        "\nTotal execution time: {:.2} seconds",
        elapsed.as_secs_f64()
    ));
    output::print_message("\nExport process completed!");

    RunSummary {
        stages: progress.stages,
        tickets_listed: outcome.tickets_listed,
        rows_written: outcome.rows_written,
        output: outcome.output,
        report,
        elapsed,
    }
}

async fn run_stages(
    api: &dyn HelpdeskApi,
    cache: &IdentityCache,
    tracker: &UsageTracker,
    plan: &ExportPlan,
    progress: &mut Progress,
) -> Outcome {
    progress.enter(Stage::Authenticating);
    output::print_message("Testing helpdesk API authentication...");
    if let Err(e) = tracker
        .time(Category::Authentication, api.validate_credentials())
        .await
    {
        output::error(&format!("{e}"));
        output::print_message("Exiting due to authentication failure.");
        progress.enter(Stage::Failed);
        return Outcome::default();
    }
    output::success("Authentication successful!");

    progress.enter(Stage::ResolvingIdentities);
    let resolved = users::resolve(api, cache, tracker, plan.use_cache).await;
    let cache_used = resolved.source != IdentitySource::Fallback;

    progress.enter(Stage::ListingTickets);
    output::print_message(&format!("\nRetrieving tickets from {}...", plan.window.label()));
    output::print_message(&format!(
        "Date range: {} to {}",
        plan.window.start.format("%Y-%m-%d"),
        plan.window.end.format("%Y-%m-%d")
    ));
    let listed = match tickets::list(api, &plan.window, tracker).await {
        Ok(listed) => {
            output::success(&format!(
                "Retrieved {} tickets from {}",
                listed.len(),
                plan.window.label()
            ));
            output::print_status_counts(&tickets::status_counts(&listed));
            listed
        }
        Err(e) => {
            output::error(&format!("Failed to retrieve tickets: {e}"));
            Vec::new()
        }
    };

    if listed.is_empty() {
        progress.enter(Stage::Exporting);
        output::print_message("No tickets to export.");
        progress.enter(Stage::Done);
        return Outcome {
            cache_used,
            ..Outcome::default()
        };
    }

    progress.enter(Stage::FetchingComments);
    output::print_message(&format!(
        "\nProcessing {} tickets ({:?} strategy, up to {} requests at once)...",
        listed.len(),
        plan.fetch.strategy,
        plan.fetch.max_concurrency
    ));
    let ids: Vec<u64> = listed.iter().map(|t| t.id).collect();
    let fetched = comments::fetch(api, &ids, &plan.fetch, tracker).await;

    progress.enter(Stage::Formatting);
    let records: Vec<ExportRecord> = listed
        .iter()
        .map(|listed_ticket| {
            let ticket = fetched
                .refreshed
                .get(&listed_ticket.id)
                .unwrap_or(listed_ticket);
            let thread = fetched
                .comments
                .get(&ticket.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            record::format(ticket, thread, &resolved.identities)
        })
        .collect();

    progress.enter(Stage::Exporting);
    output::print_message("\nCreating CSV export...");
    let (rows_written, path) = match csv::write_file(&plan.output_dir, &plan.file_name(), &records)
    {
        Ok(path) => {
            output::success(&format!(
                "Exported {} tickets to {}",
                records.len(),
                path.display()
            ));
            (records.len(), Some(path))
        }
        Err(e) => {
            output::error(&format!("Failed to export tickets: {e}"));
            (0, None)
        }
    };

    progress.enter(Stage::Done);
    Outcome {
        tickets_listed: listed.len(),
        rows_written,
        output: path,
        cache_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::comments::FetchStrategy;
    use crate::mock::{comment, ticket, user, Calls, MockApi};
    use crate::types::CustomField;
    use serde_json::json;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        cache: IdentityCache,
        plan: ExportPlan,
        tracker: UsageTracker,
    }

    fn harness(strategy: FetchStrategy) -> Harness {
        let dir = TempDir::new().unwrap();
        let window = DateWindow::new(
            "2026-09-01T00:00:00Z".parse().unwrap(),
            "2026-09-30T23:59:59Z".parse().unwrap(),
            "September 2026",
        );
        Harness {
            cache: IdentityCache::new(dir.path().join("cache")),
            plan: ExportPlan {
                window,
                use_cache: true,
                skip_report: true,
                fetch: FetchOptions {
                    strategy,
                    ..FetchOptions::default()
                },
                output_dir: dir.path().join("out"),
            },
            tracker: UsageTracker::new(),
            _dir: dir,
        }
    }

    fn read_output(summary: &RunSummary) -> String {
        std::fs::read_to_string(summary.output.as_ref().unwrap()).unwrap()
    }

    fn row_for<'a>(csv: &'a str, id: u64) -> &'a str {
        let prefix = format!("{id},");
        csv.split("\r\n").find(|line| line.starts_with(&prefix)).unwrap()
    }

    #[tokio::test]
    async fn empty_window_reaches_done_without_output() {
        let h = harness(FetchStrategy::Bulk);
        let api = MockApi::new().with_users(vec![user(1, Some("Ana"), None)]);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(summary.final_stage(), Stage::Done);
        assert!(!summary.stages.contains(&Stage::FetchingComments));
        assert_eq!(summary.rows_written, 0);
        assert!(summary.output.is_none());
        assert_eq!(summary.report.get(Category::TicketComments).count, 0);
        assert!(!h.plan.output_dir.exists());
    }

    #[tokio::test]
    async fn auth_failure_stops_before_any_data_stage() {
        let h = harness(FetchStrategy::Bulk);
        let api = MockApi::new()
            .with_auth_failure()
            .with_tickets(vec![ticket(1, "2026-09-10T10:00:00Z")]);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(
            summary.stages,
            vec![Stage::Idle, Stage::Authenticating, Stage::Failed]
        );
        assert_eq!(Calls::get(&api.calls.ticket_pages), 0);
        assert_eq!(Calls::get(&api.calls.user_pages), 0);
        assert_eq!(summary.report.get(Category::Authentication).count, 1);
        assert_eq!(summary.report.total().count, 1);
    }

    #[tokio::test]
    async fn failed_comment_fetch_keeps_ticket_row() {
        let h = harness(FetchStrategy::PerTicket);
        let api = MockApi::new()
            .with_tickets(vec![
                ticket(42, "2026-09-10T10:00:00Z"),
                ticket(43, "2026-09-11T10:00:00Z"),
            ])
            .with_users(vec![user(1, Some("Ana"), Some("ana@acme.test"))])
            .with_comments(43, vec![comment(Some(1), true, "Fixed it")])
            .failing_comments(42);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(summary.final_stage(), Stage::Done);
        assert_eq!(summary.rows_written, 2);
        let csv = read_output(&summary);
        assert!(row_for(&csv, 42).contains("No comments found."));
        assert!(row_for(&csv, 43).contains("[PUBLIC] Ana (ana@acme.test)"));
    }

    #[tokio::test]
    async fn failed_bulk_batch_keeps_ticket_rows() {
        let h = harness(FetchStrategy::Bulk);
        let api = MockApi::new()
            .with_tickets(vec![ticket(42, "2026-09-10T10:00:00Z")])
            .failing_comments(42);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(summary.rows_written, 1);
        assert!(row_for(&read_output(&summary), 42).contains("No comments found."));
        assert_eq!(summary.report.get(Category::TicketComments).count, 1);
    }

    #[tokio::test]
    async fn custom_field_columns_span_all_rows() {
        let h = harness(FetchStrategy::Bulk);
        let mut a = ticket(1, "2026-09-10T10:00:00Z");
        a.custom_fields = vec![CustomField {
            id: 360001,
            value: json!("enterprise"),
        }];
        let b = ticket(2, "2026-09-12T10:00:00Z");
        let api = MockApi::new().with_tickets(vec![a, b]);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        let csv = read_output(&summary);
        let header = csv.trim_start_matches('\u{feff}').split("\r\n").next().unwrap();
        assert!(header.ends_with(",custom_field_360001"));
        assert!(row_for(&csv, 1).ends_with(",enterprise"));
        assert!(row_for(&csv, 2).ends_with(','));
    }

    #[tokio::test]
    async fn listing_failure_exports_nothing_but_completes() {
        let h = harness(FetchStrategy::Bulk);
        let mut api = MockApi::new().with_tickets(vec![ticket(1, "2026-09-10T10:00:00Z")]);
        api.fail_ticket_page = Some(0);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(summary.final_stage(), Stage::Done);
        assert_eq!(summary.tickets_listed, 0);
        assert!(summary.output.is_none());
        assert_eq!(summary.report.get(Category::TicketListing).count, 1);
    }

    #[tokio::test]
    async fn export_failure_still_completes_run() {
        let mut h = harness(FetchStrategy::Bulk);
        let blocker = h._dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file in the way").unwrap();
        h.plan.output_dir = blocker;
        let api = MockApi::new().with_tickets(vec![ticket(1, "2026-09-10T10:00:00Z")]);

        let summary = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(summary.final_stage(), Stage::Done);
        assert_eq!(summary.tickets_listed, 1);
        assert_eq!(summary.rows_written, 0);
        assert!(summary.output.is_none());
    }

    #[tokio::test]
    async fn second_run_reuses_identity_cache() {
        let h = harness(FetchStrategy::Bulk);
        let api = MockApi::new()
            .with_tickets(vec![ticket(1, "2026-09-10T10:00:00Z")])
            .with_users(vec![user(1, Some("Ana"), Some("ana@acme.test"))]);

        run(&api, &h.cache, &h.tracker, &h.plan).await;
        let second = run(&api, &h.cache, &h.tracker, &h.plan).await;

        assert_eq!(Calls::get(&api.calls.user_pages), 1);
        assert_eq!(second.report.get(Category::Users).count, 0);
        assert!(row_for(&read_output(&second), 1).contains("Ana"));
    }

    #[test]
    fn file_name_uses_window_label() {
        let h = harness(FetchStrategy::Bulk);
        assert_eq!(h.plan.file_name(), "helpdesk_tickets_september_2026.csv");
    }
}
