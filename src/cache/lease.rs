//! Shared and exclusive leases on cache keys
//!
//! Leases live in the registry, not in memory, so they are visible to every
//! scrip process. Acquisition never waits: a conflicting lease is reported
//! as [`ScripError::LockContention`] and the caller decides what to do.
//!
//! | Lease | Granted when | Row after grant |
//! |-------|--------------|-----------------|
//! | write | no readers, no writer | `writer_held = 1` |
//! | read  | no writer | `reader_count + 1` |
//!
//! A lease handle is consumed by `release`/`delete`. Dropping a handle that
//! was not released releases it, so early returns and panics unwind cleanly.

use crate::cache::key::CacheKey;
use crate::cache::registry::{self, Expect, LeaseState, Registry, Update};
use crate::cache::store::ArtifactStore;
use crate::error::{ScripError, ScripResult};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Exclusive lease: the holder may create, rebuild or delete the artifact
#[derive(Debug)]
pub struct WriteLease {
    registry: Registry,
    key: CacheKey,
    prior_access: DateTime<Utc>,
    created: bool,
    held: bool,
}

impl WriteLease {
    /// Acquire the write lease for `key`, failing with `LockContention` if
    /// any reader or writer holds it.
    pub fn acquire(registry: &Registry, key: &CacheKey) -> ScripResult<Self> {
        let ensured = registry.ensure(key, LeaseState::WRITER, registry::now())?;

        let prior_access = if ensured.created {
            ensured.last_access
        } else {
            registry
                .compare_and_swap(
                    key,
                    Expect::Exactly(LeaseState::UNLOCKED),
                    Update::Set(LeaseState::WRITER),
                    registry::now(),
                )?
                .ok_or_else(|| ScripError::contention(key.as_str()))?
        };

        debug!("Acquired write lease on {}", key.short());
        Ok(Self {
            registry: registry.clone(),
            key: key.clone(),
            prior_access,
            created: ensured.created,
            held: true,
        })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Whether acquiring this lease inserted the entry's row
    pub fn created(&self) -> bool {
        self.created
    }

    /// Last access time of the entry before this lease was granted
    pub fn prior_access(&self) -> DateTime<Utc> {
        self.prior_access
    }

    /// Release the lease, keeping the entry and its artifact
    pub fn release(mut self) -> ScripResult<()> {
        self.held = false;
        self.unlock()
    }

    /// Remove the artifact directory and the registry row, ending the lease.
    ///
    /// The directory goes first so a directory never outlives its row.
    pub fn delete(mut self, store: &ArtifactStore) -> ScripResult<()> {
        store.remove(&self.key)?;

        let removed = self
            .registry
            .delete(&self.key, Expect::Exactly(LeaseState::WRITER))?;
        self.held = false;

        if removed == 0 {
            warn!(
                "Write lease on {} was no longer held when deleting",
                self.key.short()
            );
        } else {
            debug!("Deleted entry {}", self.key.short());
        }
        Ok(())
    }

    fn unlock(&self) -> ScripResult<()> {
        let released = self.registry.compare_and_swap(
            &self.key,
            Expect::Exactly(LeaseState::WRITER),
            Update::Set(LeaseState::UNLOCKED),
            registry::now(),
        )?;

        match released {
            Some(_) => debug!("Released write lease on {}", self.key.short()),
            None => warn!(
                "Write lease on {} was no longer held when releasing",
                self.key.short()
            ),
        }
        Ok(())
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.unlock() {
                warn!("Failed to release write lease on {}: {}", self.key.short(), e);
            }
        }
    }
}

/// Shared lease: the holder may execute the artifact
#[derive(Debug)]
pub struct ReadLease {
    registry: Registry,
    key: CacheKey,
    held: bool,
}

impl ReadLease {
    /// Acquire a read lease for `key`, failing with `LockContention` while
    /// a writer holds it. Readers never exclude each other.
    pub fn acquire(registry: &Registry, key: &CacheKey) -> ScripResult<Self> {
        let ensured = registry.ensure(key, LeaseState::ONE_READER, registry::now())?;

        if !ensured.created {
            registry
                .compare_and_swap(key, Expect::NoWriter, Update::AddReader, registry::now())?
                .ok_or_else(|| ScripError::contention(key.as_str()))?;
        }

        debug!("Acquired read lease on {}", key.short());
        Ok(Self {
            registry: registry.clone(),
            key: key.clone(),
            held: true,
        })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Release the lease
    pub fn release(mut self) -> ScripResult<()> {
        self.held = false;
        self.unlock()
    }

    fn unlock(&self) -> ScripResult<()> {
        let released = self.registry.compare_and_swap(
            &self.key,
            Expect::HeldByReaders,
            Update::RemoveReader,
            registry::now(),
        )?;

        match released {
            Some(_) => debug!("Released read lease on {}", self.key.short()),
            None => warn!(
                "Read lease on {} was no longer held when releasing",
                self.key.short()
            ),
        }
        Ok(())
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = self.unlock() {
                warn!("Failed to release read lease on {}: {}", self.key.short(), e);
            }
        }
    }
}
