//! Dependency cache for the haxelib library directory: content-hashed keys, a
//! directory-backed archive store, and the restore/save protocol that spans the
//! setup and post steps of a run.

pub mod error;
pub mod key;
pub mod protocol;
pub mod state;
pub mod store;

pub use error::{CacheError, Result};
pub use key::{build_key, hash_files, DependencyCacheKey};
pub use protocol::{caching_enabled, CacheStage, DependencyCacheProtocol, CACHE_HIT_OUTPUT};
pub use state::PersistedCacheState;
pub use store::{DirArchiveStore, RemoteCache, SaveOutcome};
