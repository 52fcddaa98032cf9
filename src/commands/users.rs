use std::collections::HashSet;

use tracing::{debug, warn};

use crate::client::HelpdeskApi;
use crate::error::Result;
use crate::identity::{IdentityCache, IdentityMap};
use crate::output;
use crate::usage::{Category, UsageTracker};

/// Where a resolved identity mapping came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Cache,
    Fetched,
    /// The user listing failed; only the "Unknown User" fallback is known.
    Fallback,
}

pub struct ResolvedIdentities {
    pub identities: IdentityMap,
    pub source: IdentitySource,
}

/// Produce the identity mapping for this run: reuse a fresh cache unless
/// `use_cache` is off, otherwise rebuild from the user listing and persist it.
/// Never fails; a broken listing degrades to the fallback-only mapping.
pub async fn resolve(
    api: &dyn HelpdeskApi,
    cache: &IdentityCache,
    tracker: &UsageTracker,
    use_cache: bool,
) -> ResolvedIdentities {
    output::print_message("\nRetrieving user information...");

    if use_cache {
        let loaded = cache.load();
        if !loaded.needs_rebuild {
            if let Some(saved_at) = loaded.saved_at {
                debug!(%saved_at, "identity cache is fresh");
            }
            output::success(&format!(
                "Using cached data for {} users",
                loaded.identities.len()
            ));
            return ResolvedIdentities {
                identities: loaded.identities,
                source: IdentitySource::Cache,
            };
        }
        output::print_message("No valid cache found, fetching users from API...");
    } else {
        output::print_message("Cache bypassed, fetching users from API...");
    }

    match rebuild(api, tracker).await {
        Ok(identities) => {
            output::success(&format!(
                "Retrieved {} users",
                identities.len().saturating_sub(1)
            ));
            if let Err(e) = cache.save(&identities) {
                output::warning(&format!("Could not save user cache: {e}"));
            }
            ResolvedIdentities {
                identities,
                source: IdentitySource::Fetched,
            }
        }
        Err(e) => {
            warn!(error = %e, "user listing failed");
            output::warning(&format!("Error retrieving users: {e}"));
            ResolvedIdentities {
                identities: IdentityMap::new(),
                source: IdentitySource::Fallback,
            }
        }
    }
}

/// Page through the full user listing. Any failed page aborts the rebuild so
/// a partial mapping is never cached.
pub async fn rebuild(api: &dyn HelpdeskApi, tracker: &UsageTracker) -> Result<IdentityMap> {
    let _timer = tracker.start(Category::Users);

    let mut identities = IdentityMap::new();
    let mut cursor: Option<String> = None;
    let mut visited = HashSet::new();

    loop {
        let page = api.user_page(cursor.as_deref()).await?;
        debug!(count = page.users.len(), "fetched user page");

        for user in &page.users {
            if let Some(id) = user.id {
                identities.insert(id, user.to_identity(id));
            }
        }

        match page.next_page {
            Some(next) if !next.is_empty() && visited.insert(next.clone()) => {
                cursor = Some(next);
            }
            _ => break,
        }
    }

    Ok(identities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{user, Calls, MockApi};
    use crate::types::{Identity, User};
    use tempfile::TempDir;

    fn users() -> Vec<User> {
        vec![
            user(1, Some("Ana Lopez"), Some("ana@acme.test")),
            user(2, None, None),
            user(3, Some("Bo"), Some("bo@acme.test")),
            User {
                id: None,
                name: Some("Ghost".into()),
                email: None,
            },
        ]
    }

    #[tokio::test]
    async fn rebuild_fills_placeholders() {
        let api = MockApi::new().with_page_size(2).with_users(users());
        let tracker = UsageTracker::new();

        let identities = rebuild(&api, &tracker).await.unwrap();

        assert_eq!(identities.len(), 4);
        assert_eq!(identities.lookup(2), Some(&Identity::new("Unknown", "user_2@example.com")));
        assert_eq!(identities.get(None), &Identity::unknown_user());
        assert_eq!(Calls::get(&api.calls.user_pages), 2);
        assert_eq!(tracker.report().get(Category::Users).count, 1);
    }

    #[tokio::test]
    async fn rebuild_stops_on_cursor_cycle() {
        let mut many = users();
        many.push(user(4, Some("Di"), Some("di@acme.test")));
        many.push(user(5, Some("Ed"), Some("ed@acme.test")));
        let api = MockApi::new()
            .with_page_size(2)
            .with_cycling_cursor()
            .with_users(many);

        let identities = rebuild(&api, &UsageTracker::new()).await.unwrap();

        assert_eq!(Calls::get(&api.calls.user_pages), 3);
        assert_eq!(identities.lookup(5), Some(&Identity::new("Ed", "ed@acme.test")));
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_listing() {
        let dir = TempDir::new().unwrap();
        let cache = IdentityCache::new(dir.path());
        let mut cached = IdentityMap::new();
        cached.insert(7, Identity::new("Cached", "cached@acme.test"));
        cache.save(&cached).unwrap();
        let api = MockApi::new().with_users(users());

        let resolved = resolve(&api, &cache, &UsageTracker::new(), true).await;

        assert_eq!(resolved.source, IdentitySource::Cache);
        assert_eq!(resolved.identities, cached);
        assert_eq!(Calls::get(&api.calls.user_pages), 0);
    }

    #[tokio::test]
    async fn bypass_flag_forces_rebuild_and_save() {
        let dir = TempDir::new().unwrap();
        let cache = IdentityCache::new(dir.path());
        let mut cached = IdentityMap::new();
        cached.insert(7, Identity::new("Cached", "cached@acme.test"));
        cache.save(&cached).unwrap();
        let api = MockApi::new().with_users(users());

        let resolved = resolve(&api, &cache, &UsageTracker::new(), false).await;

        assert_eq!(resolved.source, IdentitySource::Fetched);
        assert!(resolved.identities.lookup(7).is_none());
        assert_eq!(cache.load().identities, resolved.identities);
    }

    #[tokio::test]
    async fn listing_failure_falls_back_without_saving() {
        let dir = TempDir::new().unwrap();
        let cache = IdentityCache::new(dir.path());
        let mut api = MockApi::new().with_page_size(2).with_users(users());
        api.fail_user_page = Some(1);
        let tracker = UsageTracker::new();

        let resolved = resolve(&api, &cache, &tracker, true).await;

        assert_eq!(resolved.source, IdentitySource::Fallback);
        assert_eq!(resolved.identities, IdentityMap::new());
        assert!(cache.load().needs_rebuild);
        assert_eq!(tracker.report().get(Category::Users).count, 1);
    }
}
