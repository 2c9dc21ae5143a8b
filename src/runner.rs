//! Resolving scripts to cached programs and running them
//!
//! ```text
//! read lease ──► Built? ──yes──► release ──► Cached
//!                  │no
//!                  ▼
//!           release, write lease ──► Built? ──yes──► release ──► Cached
//!                                      │no (or --force)
//!                                      ▼
//!                       remove leftovers, build, release ──► Built
//! ```
//!
//! Upgrading from the read lease to the write lease is not atomic. Another
//! process may build the program in the gap, which is why the artifact is
//! inspected again once the write lease is held.

use crate::cache::{ArtifactState, ArtifactStore, CacheKey, ReadLease, Registry, WriteLease};
use crate::error::{ScripError, ScripResult};
use crate::script::Program;
use crate::toolchain::Toolchain;
use std::fmt;
use tracing::{debug, info, warn};

/// How a program was made available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Already compiled by an earlier run
    Cached,
    /// Compiled by this call
    Built,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cached => write!(f, "cached"),
            Self::Built => write!(f, "built"),
        }
    }
}

/// Drives the build cache for one invocation
pub struct Runner {
    registry: Registry,
    store: ArtifactStore,
    toolchain: Box<dyn Toolchain>,
    force: bool,
    keep_failed: bool,
}

impl Runner {
    pub fn new(registry: Registry, store: ArtifactStore, toolchain: Box<dyn Toolchain>) -> Self {
        Self {
            registry,
            store,
            toolchain,
            force: false,
            keep_failed: false,
        }
    }

    /// Rebuild even when a compiled program exists
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Keep the program directory when compilation fails
    pub fn keep_failed(mut self, keep: bool) -> Self {
        self.keep_failed = keep;
        self
    }

    /// Make sure a compiled program exists for `program`
    pub async fn resolve(&self, program: &Program) -> ScripResult<Resolution> {
        let key = program.key();

        let claimed = {
            let key = key.clone();
            let force = self.force;
            self.blocking(move |registry, store| claim(&registry, &store, &key, force))
                .await?
        };
        let Some(lease) = claimed else {
            return Ok(Resolution::Cached);
        };

        match self.toolchain.build(program, &self.store.dir(key)).await {
            Ok(()) => {
                self.blocking(move |_, _| lease.release()).await?;
                Ok(Resolution::Built)
            }
            Err(e) => {
                let keep_failed = self.keep_failed;
                let cleanup = self
                    .blocking(move |_, store| {
                        discard_failed(&store, lease.key(), keep_failed);
                        lease.release()
                    })
                    .await;
                if let Err(release) = cleanup {
                    warn!("Failed to release {} after failed build: {}", key.short(), release);
                }
                Err(e)
            }
        }
    }

    /// Execute the compiled program for `key` under a read lease
    pub async fn run(&self, key: &CacheKey, argv0: &str, args: &[String]) -> ScripResult<i32> {
        let (lease, binary) = {
            let key = key.clone();
            self.blocking(move |registry, store| {
                let lease = ReadLease::acquire(&registry, &key)?;
                let binary = store.binary(&key);
                if !binary.is_file() {
                    return Err(ScripError::ArtifactIntegrityViolation {
                        key: key.to_string(),
                        reason: format!("{} is missing", binary.display()),
                    });
                }
                Ok((lease, binary))
            })
            .await?
        };

        let result = self.toolchain.execute(&binary, argv0, args).await;

        if let Err(e) = self.blocking(move |_, _| lease.release()).await {
            warn!("Failed to release {} after running: {}", key.short(), e);
        }
        result
    }

    /// Registry and filesystem calls may wait on SQLite's busy timeout, so
    /// they run off the async workers
    async fn blocking<T, F>(&self, f: F) -> ScripResult<T>
    where
        F: FnOnce(Registry, ArtifactStore) -> ScripResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let registry = self.registry.clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(registry, store))
            .await
            .map_err(|e| ScripError::User(format!("Cache task failed: {}", e)))?
    }
}

/// Take the write lease when `key` needs building; `None` when a compiled
/// program can be used as is
fn claim(
    registry: &Registry,
    store: &ArtifactStore,
    key: &CacheKey,
    force: bool,
) -> ScripResult<Option<WriteLease>> {
    if !force {
        let lease = ReadLease::acquire(registry, key)?;
        let state = store.state(key);
        lease.release()?;
        if state? == ArtifactState::Built {
            debug!("Using cached program {}", key.short());
            return Ok(None);
        }
    }

    let lease = WriteLease::acquire(registry, key)?;
    match store.state(key)? {
        ArtifactState::Built if !force => {
            debug!("Program {} was built by another process", key.short());
            lease.release()?;
            return Ok(None);
        }
        ArtifactState::Absent => {}
        state => {
            debug!("Removing {} program directory for {}", state, key.short());
            store.remove(key)?;
        }
    }
    Ok(Some(lease))
}

fn discard_failed(store: &ArtifactStore, key: &CacheKey, keep_failed: bool) {
    if keep_failed {
        info!("Keeping failed build in {}", store.dir(key).display());
        return;
    }
    if let Err(e) = store.remove(key) {
        warn!("Failed to remove failed build for {}: {}", key.short(), e);
    }
}
