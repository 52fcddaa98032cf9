//! Comment thread retrieval for a set of tickets.
//!
//! Two strategies are available. `Bulk` asks the show-many endpoint for up to
//! [`MAX_BATCH_SIZE`] tickets per request. `PerTicket` walks groups of
//! [`TICKET_GROUP_SIZE`] tickets, fetching each ticket's detail and then its
//! comments in sequence. Either way work runs in waves of at most
//! `max_concurrency` units, and results are merged only after a wave has fully
//! joined. Failed units are logged and left out of the result.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use clap::ValueEnum;
use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::client::HelpdeskApi;
use crate::config::{DEFAULT_MAX_CONCURRENCY, DEFAULT_SESSION_TIMEOUT_SECS};
use crate::error::{ExportError, Result};
use crate::output;
use crate::responses::TicketComments;
use crate::types::{Comment, Ticket};
use crate::usage::{Category, UsageTracker};

/// Most ticket ids accepted by one show-many request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Tickets handled sequentially by one per-ticket worker.
pub const TICKET_GROUP_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// One show-many request per batch of up to 100 tickets
    #[default]
    Bulk,
    /// Ticket detail plus comments, one ticket at a time per worker
    PerTicket,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub strategy: FetchStrategy,
    /// Hard ceiling on units in flight at once.
    pub max_concurrency: usize,
    /// Bound on a single unit: one bulk batch, or one ticket's detail and
    /// comments in the per-ticket strategy.
    pub unit_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            unit_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

/// Comment threads keyed by ticket id. Ids that failed are absent.
/// `refreshed` holds ticket details re-read by the per-ticket strategy.
#[derive(Debug, Default)]
pub struct FetchedThreads {
    pub comments: HashMap<u64, Vec<Comment>>,
    pub refreshed: HashMap<u64, Ticket>,
}

pub async fn fetch(
    api: &dyn HelpdeskApi,
    ids: &[u64],
    options: &FetchOptions,
    tracker: &UsageTracker,
) -> FetchedThreads {
    let ids = dedup(ids);
    if ids.is_empty() {
        return FetchedThreads::default();
    }
    let options = FetchOptions {
        max_concurrency: options.max_concurrency.max(1),
        ..options.clone()
    };

    match options.strategy {
        FetchStrategy::Bulk => fetch_bulk(api, &ids, &options, tracker).await,
        FetchStrategy::PerTicket => fetch_per_ticket(api, &ids, &options, tracker).await,
    }
}

fn dedup(ids: &[u64]) -> Vec<u64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

async fn fetch_bulk(
    api: &dyn HelpdeskApi,
    ids: &[u64],
    options: &FetchOptions,
    tracker: &UsageTracker,
) -> FetchedThreads {
    let requested: HashSet<u64> = ids.iter().copied().collect();
    let batches: Vec<&[u64]> = ids.chunks(MAX_BATCH_SIZE).collect();
    let mut result = FetchedThreads::default();
    let mut done = 0;

    for wave in batches.chunks(options.max_concurrency) {
        let outcomes = join_all(
            wave.iter()
                .map(|batch| fetch_batch(api, batch, options.unit_timeout, tracker)),
        )
        .await;

        for (batch, outcome) in wave.iter().zip(outcomes) {
            match outcome {
                Ok(threads) => {
                    for thread in threads {
                        match thread.id {
                            Some(id) if requested.contains(&id) => {
                                result.comments.insert(id, thread.comments);
                            }
                            other => debug!(id = ?other, "ignoring unrequested thread"),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, first = ?batch.first(), size = batch.len(), "comment batch failed");
                    output::warning(&format!(
                        "Failed to retrieve comments in bulk for {} tickets: {e}",
                        batch.len()
                    ));
                }
            }
        }

        done += wave.len();
        report_progress(done, batches.len(), result.comments.len(), ids.len());
    }

    result
}

async fn fetch_batch(
    api: &dyn HelpdeskApi,
    batch: &[u64],
    limit: Duration,
    tracker: &UsageTracker,
) -> Result<Vec<TicketComments>> {
    let _timer = tracker.start(Category::TicketComments);
    bounded(limit, "bulk comment request", api.show_many_comments(batch)).await
}

async fn fetch_per_ticket(
    api: &dyn HelpdeskApi,
    ids: &[u64],
    options: &FetchOptions,
    tracker: &UsageTracker,
) -> FetchedThreads {
    let groups: Vec<&[u64]> = ids.chunks(TICKET_GROUP_SIZE).collect();
    let mut result = FetchedThreads::default();
    let mut done = 0;

    for wave in groups.chunks(options.max_concurrency) {
        let outcomes = join_all(
            wave.iter()
                .map(|group| process_group(api, group, options.unit_timeout, tracker)),
        )
        .await;

        for threads in outcomes {
            for (ticket, comments) in threads {
                if let Some(comments) = comments {
                    result.comments.insert(ticket.id, comments);
                }
                result.refreshed.insert(ticket.id, ticket);
            }
        }

        done += wave.len();
        report_progress(done, groups.len(), result.comments.len(), ids.len());
    }

    result
}

/// Work through a group one ticket at a time. Each ticket is bounded by
/// `limit` on its own, so a slow or failing ticket only drops itself.
async fn process_group(
    api: &dyn HelpdeskApi,
    group: &[u64],
    limit: Duration,
    tracker: &UsageTracker,
) -> Vec<(Ticket, Option<Vec<Comment>>)> {
    let mut threads = Vec::with_capacity(group.len());

    for &id in group {
        let what = format!("ticket {id}");
        match bounded(limit, &what, fetch_ticket(api, id, tracker)).await {
            Ok(thread) => threads.push(thread),
            Err(e) => {
                warn!(error = %e, id, "skipping ticket");
                output::error(&format!("Failed to retrieve ticket {id}: {e}"));
            }
        }
    }

    threads
}

/// Detail then comments for one ticket. A failed detail fails the ticket; a
/// failed comment read keeps the detail with `None` for comments.
async fn fetch_ticket(
    api: &dyn HelpdeskApi,
    id: u64,
    tracker: &UsageTracker,
) -> Result<(Ticket, Option<Vec<Comment>>)> {
    let ticket = tracker.time(Category::TicketDetails, api.ticket(id)).await?;

    let comments = match tracker
        .time(Category::TicketComments, api.ticket_comments(id))
        .await
    {
        Ok(comments) => Some(comments),
        Err(e) => {
            output::error(&format!("Failed to retrieve comments for ticket {id}: {e}"));
            None
        }
    };

    Ok((ticket, comments))
}

async fn bounded<T, F>(limit: Duration, what: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| ExportError::Timeout {
            what: what.to_string(),
            limit,
        })?
}

fn report_progress(units_done: usize, units: usize, tickets_done: usize, tickets: usize) {
    info!(units_done, units, tickets_done, tickets, "comment fetch progress");
    output::print_message(&format!(
        "Processed {units_done}/{units} batches ({tickets_done}/{tickets} tickets)"
    ));
}
