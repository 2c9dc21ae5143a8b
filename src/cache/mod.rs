//! Cross-process build cache for compiled scripts
//!
//! Provides content-addressed caching keyed by the hash of the generated
//! program. Any number of unrelated processes share one cache directory:
//!
//! - `registry.db`: one row per key with its lease state and last access
//! - `artifacts/<key>/`: the compiled program
//!
//! # Entry States
//!
//! | Registry row | Artifact | Meaning |
//! |--------------|----------|---------|
//! | absent | absent | Never requested, or reclaimed |
//! | writer held | any | Being built; never executed |
//! | readers > 0 | built | Being executed |
//! | unlocked | built | Cached, reusable |
//! | unlocked | absent/partial | Build failed or never finished |

pub mod key;
pub mod lease;
pub mod reclaim;
pub mod registry;
pub mod store;

pub use key::CacheKey;
pub use lease::{ReadLease, WriteLease};
pub use reclaim::{ReclaimPolicy, ReclaimReport};
pub use registry::{CacheEntry, LeaseState, Registry};
pub use store::{ArtifactState, ArtifactStore};
