//! Per-category call counting and timing for upstream API operations.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of upstream operation being timed. `Total` is the aggregate bucket
/// and can't be recorded into directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Authentication,
    TicketListing,
    TicketDetails,
    TicketComments,
    Users,
    Other,
    Total,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Authentication,
        Category::TicketListing,
        Category::TicketDetails,
        Category::TicketComments,
        Category::Users,
        Category::Other,
        Category::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::TicketListing => "ticket_listing",
            Self::TicketDetails => "ticket_details",
            Self::TicketComments => "ticket_comments",
            Self::Users => "users",
            Self::Other => "other",
            Self::Total => "total",
        }
    }

    /// Title-cased name for reports, e.g. "Ticket Listing".
    pub fn title(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Aggregated timings for one category, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub total: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

impl CategoryStats {
    fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let total: f64 = samples.iter().sum();
        Self {
            count: samples.len(),
            total,
            average: total / samples.len() as f64,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub categories: BTreeMap<Category, CategoryStats>,
    pub generated_at: DateTime<Utc>,
}

impl UsageReport {
    pub fn get(&self, category: Category) -> &CategoryStats {
        // Every category is populated by `UsageTracker::report`.
        static EMPTY: CategoryStats = CategoryStats {
            count: 0,
            total: 0.0,
            average: 0.0,
            min: 0.0,
            max: 0.0,
        };
        self.categories.get(&category).unwrap_or(&EMPTY)
    }

    pub fn total(&self) -> &CategoryStats {
        self.get(Category::Total)
    }

    /// Categories other than the aggregate that saw at least one call.
    pub fn active(&self) -> impl Iterator<Item = (Category, &CategoryStats)> {
        self.categories
            .iter()
            .filter(|(category, stats)| **category != Category::Total && stats.count > 0)
            .map(|(category, stats)| (*category, stats))
    }
}

/// Thread-safe call tracker, created once per run and shared by reference.
pub struct UsageTracker {
    timings: Mutex<BTreeMap<Category, Vec<f64>>>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageTracker {
    pub fn new() -> Self {
        let timings = Category::ALL.iter().map(|c| (*c, Vec::new())).collect();
        Self {
            timings: Mutex::new(timings),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Category, Vec<f64>>> {
        // A panic mid-push can't leave the map inconsistent.
        self.timings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one call under `category` and under the aggregate.
    pub fn record(&self, category: Category, elapsed: Duration) {
        let category = if category == Category::Total {
            Category::Other
        } else {
            category
        };
        let secs = elapsed.as_secs_f64();
        let mut timings = self.lock();
        timings.entry(category).or_default().push(secs);
        timings.entry(Category::Total).or_default().push(secs);
    }

    /// Start timing a call. The elapsed time is recorded when the returned
    /// guard drops, whichever way the enclosing scope exits.
    pub fn start(&self, category: Category) -> CallTimer<'_> {
        CallTimer {
            tracker: self,
            category,
            started: Instant::now(),
        }
    }

    /// Run `operation` and record its wall-clock time, success or not.
    pub async fn time<F: Future>(&self, category: Category, operation: F) -> F::Output {
        let _timer = self.start(category);
        operation.await
    }

    pub fn report(&self) -> UsageReport {
        let timings = self.lock();
        let categories = Category::ALL
            .iter()
            .map(|c| {
                let samples = timings.get(c).map(Vec::as_slice).unwrap_or(&[]);
                (*c, CategoryStats::from_samples(samples))
            })
            .collect();
        UsageReport {
            categories,
            generated_at: Utc::now(),
        }
    }

    /// Zero every counter. Categories stay registered.
    pub fn reset(&self) {
        for samples in self.lock().values_mut() {
            samples.clear();
        }
    }
}

pub struct CallTimer<'a> {
    tracker: &'a UsageTracker,
    category: Category,
    started: Instant,
}

impl Drop for CallTimer<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.category, self.started.elapsed());
    }
}
