//! Two-phase restore/save of the haxelib library directory.
//!
//! The setup step restores and records what it did as step state; the post step
//! runs in a separate process and decides from that state whether to upload.

use std::path::{Path, PathBuf};

use hxsetup_telemetry as telemetry;
use hxsetup_util::step::StepCommands;
use tracing::info;

use crate::error::{CacheError, Result};
use crate::key::build_key;
use crate::state::{PersistedCacheState, HAXELIB_PATH, PRIMARY_KEY, RESTORE_RESULT};
use crate::store::{RemoteCache, SaveOutcome};

pub const CACHE_HIT_OUTPUT: &str = "cache-hit";

/// Where a run ended up in the cache protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStage {
    /// Dependency caching is disabled for this run.
    NotStarted,
    RestoreAttempted { primary_key: String, hit: Option<String> },
    Saved { key: String },
    SaveSkipped { key: String },
}

/// An empty or blank dependency path turns the whole cache protocol off.
pub fn caching_enabled(cache_dependency_path: &str) -> bool {
    !cache_dependency_path.trim().is_empty()
}

pub struct DependencyCacheProtocol<'a> {
    store: &'a dyn RemoteCache,
    commands: &'a dyn StepCommands,
}

impl<'a> DependencyCacheProtocol<'a> {
    pub fn new(store: &'a dyn RemoteCache, commands: &'a dyn StepCommands) -> Self {
        Self { store, commands }
    }

    /// Setup-step entry point. Keys the manifests matched under `workspace` and restores into
    /// `haxelib_path`; with caching disabled nothing is recorded and no output is set.
    pub async fn restore_dependencies(
        &self,
        cache_dependency_path: &str,
        haxe_target: &str,
        haxe_version: &str,
        workspace: &Path,
        haxelib_path: &Path,
    ) -> Result<CacheStage> {
        if !caching_enabled(cache_dependency_path) {
            info!("dependency caching is disabled");
            return Ok(CacheStage::NotStarted);
        }
        info!("[haxelib] dep cache = {cache_dependency_path}");
        let key = build_key(haxe_target, haxe_version, cache_dependency_path, workspace)?;
        self.restore(&key.to_string(), haxelib_path).await
    }

    /// Post-step entry point. With caching disabled, returns without reading any state.
    pub async fn save_dependencies(&self, cache_dependency_path: &str) -> Result<CacheStage> {
        if !caching_enabled(cache_dependency_path) {
            info!("dependency caching is disabled");
            return Ok(CacheStage::NotStarted);
        }
        self.save().await
    }

    /// Setup-step half: records the key and library path, then tries a restore.
    /// A miss is not an error.
    pub async fn restore(&self, primary_key: &str, haxelib_path: &Path) -> Result<CacheStage> {
        self.commands.save_state(PRIMARY_KEY, primary_key)?;
        self.commands
            .save_state(HAXELIB_PATH, &haxelib_path.to_string_lossy())?;

        let paths = [haxelib_path.to_path_buf()];
        let hit = self
            .store
            .restore(&paths, primary_key, &[primary_key.to_string()])
            .await?;
        self.commands
            .set_output(CACHE_HIT_OUTPUT, if hit.is_some() { "true" } else { "false" })?;
        telemetry::event(
            "cache.restore",
            &[("hit", if hit.is_some() { "true" } else { "false" })],
        );

        match &hit {
            Some(key) => {
                self.commands.save_state(RESTORE_RESULT, key)?;
                info!("Cache restored from key: {key}");
            }
            None => info!("haxelib cache is not found"),
        }
        Ok(CacheStage::RestoreAttempted {
            primary_key: primary_key.to_string(),
            hit,
        })
    }

    /// Post-step half: uploads the library directory unless the exact key was restored.
    pub async fn save(&self) -> Result<CacheStage> {
        let state = PersistedCacheState::load(self.commands)?;
        if !state.haxelib_path.exists() {
            return Err(CacheError::CacheDirMissingAtSaveTime {
                path: state.haxelib_path,
            });
        }

        if state.is_exact_hit() {
            info!(
                "Cache hit occurred on the primary key {}, not saving cache.",
                state.primary_key
            );
            return Ok(CacheStage::SaveSkipped {
                key: state.primary_key,
            });
        }

        let paths: [PathBuf; 1] = [state.haxelib_path.clone()];
        let outcome = self.store.save(&paths, &state.primary_key).await?;
        match outcome {
            SaveOutcome::Saved => {
                info!("Cache saved with the key: {}", state.primary_key);
                telemetry::event("cache.save", &[("outcome", "saved")]);
            }
            SaveOutcome::AlreadyExists => {
                info!("Cache entry {} was saved by another run", state.primary_key);
                telemetry::event("cache.save", &[("outcome", "already_exists")]);
            }
        }
        Ok(CacheStage::Saved {
            key: state.primary_key,
        })
    }
}
