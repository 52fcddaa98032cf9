//! On-disk cache of user identities with whole-cache expiry.
//!
//! Two artifacts live in the cache directory: `user_cache.json` holds the
//! id -> {name, email} mapping and `user_cache_timestamp.txt` holds the Unix
//! time (fractional seconds) it was written. The cache is valid only when both
//! exist and the timestamp is younger than [`CACHE_TTL_SECS`].

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{ExportError, Result};
use crate::types::Identity;

pub const CACHE_TTL_SECS: i64 = 24 * 60 * 60;

const CACHE_FILE: &str = "user_cache.json";
const TIMESTAMP_FILE: &str = "user_cache_timestamp.txt";
/// Key used for the fallback identity in the persisted JSON object.
const UNKNOWN_KEY: &str = "None";

/// User id to identity mapping that always carries the "Unknown User"
/// fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityMap {
    users: HashMap<u64, Identity>,
    unknown: Identity,
}

impl Default for IdentityMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityMap {
    pub fn new() -> Self {
        Self {
            users: HashMap::new(),
            unknown: Identity::unknown_user(),
        }
    }

    pub fn insert(&mut self, id: u64, identity: Identity) {
        self.users.insert(id, identity);
    }

    /// Identity for `id`, or the fallback when the id is missing or unknown.
    pub fn get(&self, id: Option<u64>) -> &Identity {
        id.and_then(|id| self.users.get(&id))
            .unwrap_or(&self.unknown)
    }

    /// Identity for `id` only if it is actually known.
    pub fn lookup(&self, id: u64) -> Option<&Identity> {
        self.users.get(&id)
    }

    /// Number of entries, counting the fallback.
    pub fn len(&self) -> usize {
        self.users.len() + 1
    }

    /// Whether the map knows any real users beyond the fallback.
    pub fn has_users(&self) -> bool {
        !self.users.is_empty()
    }

    fn to_persisted(&self) -> BTreeMap<String, Identity> {
        let mut out: BTreeMap<String, Identity> = self
            .users
            .iter()
            .map(|(id, identity)| (id.to_string(), identity.clone()))
            .collect();
        out.insert(UNKNOWN_KEY.to_string(), self.unknown.clone());
        out
    }

    fn from_persisted(persisted: BTreeMap<String, Identity>) -> std::result::Result<Self, String> {
        let mut map = Self::new();
        for (key, identity) in persisted {
            if key == UNKNOWN_KEY {
                map.unknown = identity;
                continue;
            }
            let id = key
                .parse::<u64>()
                .map_err(|_| format!("unexpected user key {key:?}"))?;
            map.users.insert(id, identity);
        }
        Ok(map)
    }
}

/// Result of reading the cache.
#[derive(Debug, Clone)]
pub struct LoadedCache {
    pub identities: IdentityMap,
    pub saved_at: Option<DateTime<Utc>>,
    pub needs_rebuild: bool,
}

/// Snapshot used by `cache status` and the usage report.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    pub path: PathBuf,
    pub entries: usize,
    pub saved_at: DateTime<Utc>,
    pub age_secs: f64,
}

impl CacheStatus {
    pub fn is_fresh(&self) -> bool {
        self.age_secs < CACHE_TTL_SECS as f64
    }

    pub fn expires_in_secs(&self) -> f64 {
        CACHE_TTL_SECS as f64 - self.age_secs
    }
}

pub struct IdentityCache {
    dir: PathBuf,
}

impl IdentityCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    fn timestamp_path(&self) -> PathBuf {
        self.dir.join(TIMESTAMP_FILE)
    }

    pub fn load(&self) -> LoadedCache {
        self.load_at(Utc::now())
    }

    /// Load the persisted mapping if it is younger than the TTL as of `now`.
    /// Anything else (missing, expired, unreadable) yields the fallback-only
    /// mapping flagged for rebuild.
    pub fn load_at(&self, now: DateTime<Utc>) -> LoadedCache {
        let empty = LoadedCache {
            identities: IdentityMap::new(),
            saved_at: None,
            needs_rebuild: true,
        };

        let status = match self.status_at(now) {
            Ok(Some(status)) => status,
            Ok(None) => return empty,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable identity cache");
                return empty;
            }
        };

        if !status.is_fresh() {
            debug!(age_secs = status.age_secs, "identity cache expired");
            return LoadedCache {
                saved_at: Some(status.saved_at),
                ..empty
            };
        }

        match self.read_mapping() {
            Ok(identities) => LoadedCache {
                needs_rebuild: !identities.has_users(),
                identities,
                saved_at: Some(status.saved_at),
            },
            Err(e) => {
                warn!(error = %e, "ignoring unreadable identity cache");
                empty
            }
        }
    }

    /// Age and size of the persisted cache, or `None` if either artifact is
    /// missing.
    pub fn status_at(&self, now: DateTime<Utc>) -> Result<Option<CacheStatus>> {
        let path = self.path();
        let timestamp_path = self.timestamp_path();
        if !path.exists() || !timestamp_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&timestamp_path)?;
        let saved_at = parse_timestamp(raw.trim()).ok_or_else(|| ExportError::CacheCorrupt {
            path: timestamp_path.clone(),
            reason: format!("bad timestamp {:?}", raw.trim()),
        })?;
        let age_secs = (now - saved_at).num_milliseconds() as f64 / 1000.0;
        let entries = self.read_mapping().map(|m| m.len()).unwrap_or(0);

        Ok(Some(CacheStatus {
            path,
            entries,
            saved_at,
            age_secs,
        }))
    }

    fn read_mapping(&self) -> Result<IdentityMap> {
        let path = self.path();
        let contents = fs::read_to_string(&path)?;
        let persisted: BTreeMap<String, Identity> = serde_json::from_str(&contents)?;
        IdentityMap::from_persisted(persisted)
            .map_err(|reason| ExportError::CacheCorrupt { path, reason })
    }

    pub fn save(&self, identities: &IdentityMap) -> Result<DateTime<Utc>> {
        self.save_at(identities, Utc::now())
    }

    /// Replace both artifacts. Each file is written to a sibling temp file,
    /// synced, then renamed over the old one.
    pub fn save_at(&self, identities: &IdentityMap, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(&identities.to_persisted())?;
        write_replace(&self.path(), json.as_bytes())?;

        let stamp = format!("{:.3}", now.timestamp_millis() as f64 / 1000.0);
        write_replace(&self.timestamp_path(), stamp.as_bytes())?;

        debug!(entries = identities.len(), path = %self.path().display(), "saved identity cache");
        Ok(now)
    }

    /// Remove both artifacts. Returns whether anything was deleted.
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        for path in [self.path(), self.timestamp_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
                removed = true;
            }
        }
        Ok(removed)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let secs: f64 = raw.parse().ok()?;
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

fn write_replace(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}
