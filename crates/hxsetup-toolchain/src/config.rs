use std::path::PathBuf;

use hxsetup_util::env_non_empty;

pub const RELEASE_BASE_ENV: &str = "HXSETUP_GITHUB_BASE_URL";
pub const NIGHTLY_BASE_ENV: &str = "HXSETUP_NIGHTLY_BASE_URL";

pub const DEFAULT_RELEASE_BASE: &str = "https://github.com/HaxeFoundation";
pub const DEFAULT_NIGHTLY_BASE: &str = "https://build.haxe.org/builds/haxe";

/// Hosts that release and nightly archives are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirrors {
    pub release_base: String,
    pub nightly_base: String,
}

impl Default for Mirrors {
    fn default() -> Self {
        Self {
            release_base: DEFAULT_RELEASE_BASE.to_string(),
            nightly_base: DEFAULT_NIGHTLY_BASE.to_string(),
        }
    }
}

impl Mirrors {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            release_base: env_non_empty(RELEASE_BASE_ENV)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.release_base),
            nightly_base: env_non_empty(NIGHTLY_BASE_ENV)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.nightly_base),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub mirrors: Mirrors,
    pub tool_cache_dir: PathBuf,
    /// Downloads land here; staging directories are created under `staging`.
    pub temp_dir: PathBuf,
}

impl ToolchainConfig {
    pub fn from_env() -> Self {
        Self {
            mirrors: Mirrors::from_env(),
            tool_cache_dir: hxsetup_util::tool_cache_dir(),
            temp_dir: hxsetup_util::temp_dir(),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.temp_dir.join("downloads")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.temp_dir.join("staging")
    }
}
