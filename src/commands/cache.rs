use chrono::Utc;
use serde::Serialize;
use tabled::Tabled;

use crate::error::Result;
use crate::identity::{CacheStatus, IdentityCache};
use crate::output;

#[derive(Serialize)]
struct CacheView {
    path: String,
    entries: usize,
    saved_at: String,
    age_hours: f64,
    fresh: bool,
}

impl From<&CacheStatus> for CacheView {
    fn from(status: &CacheStatus) -> Self {
        Self {
            path: status.path.display().to_string(),
            entries: status.entries,
            saved_at: status.saved_at.to_rfc3339(),
            age_hours: status.age_secs / 3600.0,
            fresh: status.is_fresh(),
        }
    }
}

#[derive(Tabled)]
struct CacheRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Entries")]
    entries: usize,
    #[tabled(rename = "Saved")]
    saved_at: String,
    #[tabled(rename = "Age (h)")]
    age: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&CacheView> for CacheRow {
    fn from(view: &CacheView) -> Self {
        Self {
            path: view.path.clone(),
            entries: view.entries,
            saved_at: view.saved_at.clone(),
            age: format!("{:.2}", view.age_hours),
            state: if view.fresh { "fresh" } else { "expired" }.to_string(),
        }
    }
}

pub fn status(cache: &IdentityCache) -> Result<()> {
    match cache.status_at(Utc::now())? {
        Some(status) => {
            let views = [CacheView::from(&status)];
            output::print_table(&views, |view| CacheRow::from(view));
        }
        None => {
            output::print_message(&format!(
                "No identity cache at {}",
                cache.path().display()
            ));
        }
    }
    Ok(())
}

pub fn clear(cache: &IdentityCache) -> Result<()> {
    if cache.clear()? {
        output::success("Identity cache cleared");
    } else {
        output::print_message("Identity cache already empty");
    }
    Ok(())
}
