//! Age-based reclamation of unused programs
//!
//! An entry is reclaimed when it has not been locked or unlocked for longer
//! than the window. The age is checked twice: once against the listing and
//! again against the access time observed when the write lease is granted,
//! since another process may have used the program in between.

use crate::cache::key::CacheKey;
use crate::cache::lease::WriteLease;
use crate::cache::registry::{self, CacheEntry, Registry};
use crate::cache::store::ArtifactStore;
use crate::error::ScripResult;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Default reclamation window
pub const DEFAULT_WINDOW_DAYS: u32 = 90;

/// Outcome of one reclamation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Entries deleted together with their artifacts
    pub removed: Vec<CacheKey>,
    /// Entries locked by another process; reconsidered next pass
    pub busy: Vec<CacheKey>,
    /// Entries used since the listing; left in place
    pub refreshed: Vec<CacheKey>,
}

/// Reclamation window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimPolicy {
    window: Duration,
}

impl ReclaimPolicy {
    /// Policy for a window in days; `None` when `days` is 0 (disabled)
    pub fn from_days(days: u32) -> Option<Self> {
        (days > 0).then(|| Self {
            window: Duration::days(i64::from(days)),
        })
    }

    /// Policy that treats every entry as expired
    pub fn everything() -> Self {
        Self {
            window: Duration::milliseconds(-1),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn is_expired(&self, last_access: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_access > self.window
    }

    /// Entries older than the window, without locking anything
    pub fn candidates(&self, registry: &Registry) -> ScripResult<Vec<CacheEntry>> {
        self.candidates_at(registry, registry::now())
    }

    fn candidates_at(
        &self,
        registry: &Registry,
        now: DateTime<Utc>,
    ) -> ScripResult<Vec<CacheEntry>> {
        Ok(registry
            .list()?
            .into_iter()
            .filter(|entry| self.is_expired(entry.last_access, now))
            .collect())
    }

    /// Delete every expired, unlocked entry and its artifact
    pub fn reclaim(
        &self,
        registry: &Registry,
        store: &ArtifactStore,
    ) -> ScripResult<ReclaimReport> {
        self.reclaim_at(registry, store, registry::now())
    }

    pub(crate) fn reclaim_at(
        &self,
        registry: &Registry,
        store: &ArtifactStore,
        now: DateTime<Utc>,
    ) -> ScripResult<ReclaimReport> {
        let mut report = ReclaimReport::default();

        for entry in self.candidates_at(registry, now)? {
            match self.reclaim_entry(registry, store, &entry.key, now)? {
                Outcome::Removed => report.removed.push(entry.key),
                Outcome::Busy => report.busy.push(entry.key),
                Outcome::Refreshed => report.refreshed.push(entry.key),
                Outcome::Vanished => {}
            }
        }

        Ok(report)
    }

    /// Lock one listed entry and delete it if it is still expired
    fn reclaim_entry(
        &self,
        registry: &Registry,
        store: &ArtifactStore,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> ScripResult<Outcome> {
        let lease = match WriteLease::acquire(registry, key) {
            Ok(lease) => lease,
            Err(e) if e.is_contention() => {
                debug!("Skipping {}: currently locked", key.short());
                return Ok(Outcome::Busy);
            }
            Err(e) => return Err(e),
        };

        // Deleted by another pass since the listing; drop the row we just made
        if lease.created() {
            debug!("Skipping {}: already removed", key.short());
            lease.delete(store)?;
            return Ok(Outcome::Vanished);
        }

        if self.is_expired(lease.prior_access(), now) {
            info!("Reclaiming program {}", key.short());
            lease.delete(store)?;
            Ok(Outcome::Removed)
        } else {
            debug!("Skipping {}: used since listing", key.short());
            lease.release()?;
            Ok(Outcome::Refreshed)
        }
    }
}

enum Outcome {
    Removed,
    Busy,
    Refreshed,
    Vanished,
}

impl Default for ReclaimPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(i64::from(DEFAULT_WINDOW_DAYS)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::lease::ReadLease;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        registry: Registry,
        store: ArtifactStore,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let registry = Registry::open(dir.path()).unwrap();
            let store = ArtifactStore::new(dir.path());
            Self {
                _dir: dir,
                registry,
                store,
            }
        }

        /// Build an unlocked entry with an artifact, last used `days` ago
        fn entry(&self, name: &str, days: i64) -> CacheKey {
            let key = CacheKey::parse(name).unwrap();
            let lease = WriteLease::acquire(&self.registry, &key).unwrap();
            fs::create_dir_all(self.store.dir(&key)).unwrap();
            lease.release().unwrap();
            self.registry
                .set_last_access(&key, registry::now() - Duration::days(days))
                .unwrap();
            key
        }
    }

    #[test]
    fn removes_entries_past_window() {
        let fx = Fixture::new();
        let key = fx.entry("abc", 91);

        let report = ReclaimPolicy::from_days(90)
            .unwrap()
            .reclaim(&fx.registry, &fx.store)
            .unwrap();

        assert_eq!(report.removed, vec![key.clone()]);
        assert!(fx.registry.get(&key).unwrap().is_none());
        assert!(!fx.store.dir(&key).exists());
    }

    #[test]
    fn keeps_entries_within_window() {
        let fx = Fixture::new();
        let key = fx.entry("abc", 89);

        let report = ReclaimPolicy::from_days(90)
            .unwrap()
            .reclaim(&fx.registry, &fx.store)
            .unwrap();

        assert_eq!(report, ReclaimReport::default());
        assert!(fx.registry.get(&key).unwrap().is_some());
        assert!(fx.store.dir(&key).exists());
    }

    #[test]
    fn skips_locked_entries() {
        let fx = Fixture::new();
        let key = fx.entry("abc", 120);
        let reader = ReadLease::acquire(&fx.registry, &key).unwrap();
        fx.registry
            .set_last_access(&key, registry::now() - Duration::days(120))
            .unwrap();

        let report = ReclaimPolicy::default()
            .reclaim(&fx.registry, &fx.store)
            .unwrap();

        assert_eq!(report.busy, vec![key.clone()]);
        assert!(report.removed.is_empty());
        assert!(fx.store.dir(&key).exists());
        reader.release().unwrap();
    }

    #[test]
    fn rechecks_age_after_locking() {
        let fx = Fixture::new();
        // Listed as old, but used by another process before the lock
        let key = fx.entry("abc", 0);
        let policy = ReclaimPolicy::default();

        let outcome = policy
            .reclaim_entry(&fx.registry, &fx.store, &key, registry::now())
            .unwrap();

        assert!(matches!(outcome, Outcome::Refreshed));
        let entry = fx.registry.get(&key).unwrap().unwrap();
        assert!(!entry.state().is_locked());
        assert!(fx.store.dir(&key).exists());
    }

    #[test]
    fn entry_removed_since_listing_is_not_recreated() {
        let fx = Fixture::new();
        let key = CacheKey::parse("gone").unwrap();

        let outcome = ReclaimPolicy::default()
            .reclaim_entry(&fx.registry, &fx.store, &key, registry::now())
            .unwrap();

        assert!(matches!(outcome, Outcome::Vanished));
        assert!(fx.registry.get(&key).unwrap().is_none());
        assert!(fx.registry.list().unwrap().is_empty());
        assert!(!fx.store.dir(&key).exists());
    }

    #[test]
    fn mixed_pass() {
        let fx = Fixture::new();
        let old = fx.entry("old", 200);
        let fresh = fx.entry("fresh", 1);
        let busy = fx.entry("busy", 200);
        let writer = WriteLease::acquire(&fx.registry, &busy).unwrap();
        fx.registry
            .set_last_access(&busy, registry::now() - Duration::days(200))
            .unwrap();

        let report = ReclaimPolicy::from_days(30)
            .unwrap()
            .reclaim(&fx.registry, &fx.store)
            .unwrap();

        assert_eq!(report.removed, vec![old]);
        assert_eq!(report.busy, vec![busy]);
        assert!(fx.registry.get(&fresh).unwrap().is_some());
        writer.release().unwrap();
    }

    #[test]
    fn zero_days_disables() {
        assert!(ReclaimPolicy::from_days(0).is_none());
        assert_eq!(
            ReclaimPolicy::from_days(90).unwrap(),
            ReclaimPolicy::default()
        );
    }

    #[test]
    fn everything_policy_clears_fresh_entries() {
        let fx = Fixture::new();
        let key = fx.entry("abc", 0);

        let report = ReclaimPolicy::everything()
            .reclaim(&fx.registry, &fx.store)
            .unwrap();
        assert_eq!(report.removed, vec![key]);
        assert!(fx.registry.list().unwrap().is_empty());
    }
}
