use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::client::HelpdeskApi;
use crate::error::Result;
use crate::types::Ticket;
use crate::usage::{Category, UsageTracker};
use crate::window::DateWindow;

/// List every ticket created inside `window`, following `next_page` cursors
/// until the listing is exhausted.
///
/// Listing is all-or-nothing: an error on any page discards the pages already
/// fetched and is returned to the caller. The whole listing counts as one
/// `ticket_listing` call in the usage report.
pub async fn list(
    api: &dyn HelpdeskApi,
    window: &DateWindow,
    tracker: &UsageTracker,
) -> Result<Vec<Ticket>> {
    let _timer = tracker.start(Category::TicketListing);

    let mut tickets = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut visited = HashSet::new();
    let mut pages = 0usize;

    loop {
        let page = api.ticket_page(window, cursor.as_deref()).await?;
        pages += 1;
        debug!(page = pages, count = page.tickets.len(), "fetched ticket page");

        for ticket in page.tickets {
            // The server filters by creation time already; this keeps the
            // inclusive bounds exact when it rounds to the day.
            let inside = ticket
                .created_at_utc()
                .map_or(true, |at| window.contains(at));
            if inside && seen.insert(ticket.id) {
                tickets.push(ticket);
            }
        }

        match page.next_page {
            Some(next) if !next.is_empty() && visited.insert(next.clone()) => {
                cursor = Some(next);
            }
            _ => break,
        }
    }

    info!(pages, tickets = tickets.len(), window = window.label(), "ticket listing complete");
    Ok(tickets)
}

/// Ticket counts keyed by status, with "unknown" for tickets lacking one.
pub fn status_counts(tickets: &[Ticket]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for ticket in tickets {
        let status = ticket.status.clone().unwrap_or_else(|| "unknown".to_string());
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}
