use std::{
    fs, io,
    path::{Path, PathBuf},
};

use hxsetup_util::{fs_ops, lock::FileLock, now_millis, write_json_atomic};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// Installed tools keyed by (name, version).
///
/// A recorded entry is trusted as-is; contents are not re-verified on lookup.
pub trait ToolCache: Send + Sync {
    fn find(&self, name: &str, version: &str) -> Option<PathBuf>;
    /// Copies `source` into the cache and returns the cached root. An entry that is already
    /// complete wins; `source` is then left unused.
    fn register(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf>;
    /// Like `register`, but overwrites any complete entry. Used for moving tags like `latest`.
    fn replace(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf>;
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
struct ToolRecord {
    name: String,
    version: String,
    arch: String,
    path: String,
    source: String,
    installed_at_unix_millis: i64,
}

/// Runner-compatible tool cache: `<root>/<name>/<version>/<arch>/` plus an `<arch>.complete`
/// marker written once the copy finished.
pub struct DirToolCache {
    root: PathBuf,
    arch: String,
}

impl DirToolCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_arch(root, std::env::consts::ARCH)
    }

    pub fn with_arch(root: impl Into<PathBuf>, arch: &str) -> Self {
        Self {
            root: root.into(),
            arch: arch.to_string(),
        }
    }

    fn version_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join(version)
    }

    fn tool_path(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version).join(&self.arch)
    }

    fn marker_path(&self, name: &str, version: &str) -> PathBuf {
        self.version_dir(name, version)
            .join(format!("{}.complete", self.arch))
    }
}

impl ToolCache for DirToolCache {
    fn find(&self, name: &str, version: &str) -> Option<PathBuf> {
        if name.is_empty() || version.is_empty() {
            return None;
        }
        let path = self.tool_path(name, version);
        let marker = self.marker_path(name, version);
        if marker.is_file() && path.is_dir() {
            debug!("tool cache hit {name}@{version}: {}", path.display());
            Some(path)
        } else {
            None
        }
    }

    fn register(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf> {
        self.install(source, name, version, false)
    }

    fn replace(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf> {
        self.install(source, name, version, true)
    }
}

impl DirToolCache {
    fn install(&self, source: &Path, name: &str, version: &str, replace: bool) -> Result<PathBuf> {
        if !source.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("tool source {} is not a directory", source.display()),
            )
            .into());
        }

        let version_dir = self.version_dir(name, version);
        let _lock = FileLock::lock_exclusive(&version_dir.join(".lock"))?;

        let target = self.tool_path(name, version);
        let marker = self.marker_path(name, version);
        if !replace && marker.is_file() && target.is_dir() {
            debug!("{name}@{version} already registered at {}", target.display());
            return Ok(target);
        }

        if let Err(err) = fs::remove_file(&marker) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("failed to clear marker {}: {err}", marker.display());
            }
        }
        fs_ops::remove_dir_if_exists(&target)?;
        fs_ops::copy_dir_all(source, &target)?;

        let record = ToolRecord {
            name: name.to_string(),
            version: version.to_string(),
            arch: self.arch.clone(),
            path: target.to_string_lossy().to_string(),
            source: source.to_string_lossy().to_string(),
            installed_at_unix_millis: now_millis(),
        };
        write_json_atomic(&marker, &record)?;
        debug!("registered {name}@{version} at {}", target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_find() {
        let cache_root = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("neko"), b"#!neko").unwrap();

        let cache = DirToolCache::with_arch(cache_root.path(), "x64");
        assert!(cache.find("neko", "2.4.1").is_none());

        let root = cache.register(source.path(), "neko", "2.4.1").unwrap();
        assert_eq!(root, cache_root.path().join("neko/2.4.1/x64"));
        assert_eq!(fs::read(root.join("neko")).unwrap(), b"#!neko");
        assert!(cache_root.path().join("neko/2.4.1/x64.complete").is_file());
        assert_eq!(cache.find("neko", "2.4.1"), Some(root));
        assert!(cache.find("neko", "2.1.0").is_none());
        assert!(cache.find("haxe", "2.4.1").is_none());
    }

    #[test]
    fn directory_without_marker_is_a_miss() {
        let cache_root = tempfile::tempdir().unwrap();
        fs::create_dir_all(cache_root.path().join("haxe/4.0.5/x64")).unwrap();
        let cache = DirToolCache::with_arch(cache_root.path(), "x64");
        assert!(cache.find("haxe", "4.0.5").is_none());
    }

    #[test]
    fn second_register_keeps_the_first_install() {
        let cache_root = tempfile::tempdir().unwrap();
        let cache = DirToolCache::with_arch(cache_root.path(), "x64");

        let first = tempfile::tempdir().unwrap();
        fs::write(first.path().join("haxe"), b"first").unwrap();
        let root = cache.register(first.path(), "haxe", "4.3.6").unwrap();
        // haxelib installs land inside the registered root between runs.
        fs::create_dir_all(root.join("lib/format")).unwrap();
        fs::write(root.join("lib/format/.current"), b"3.5.0").unwrap();

        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("haxe"), b"second").unwrap();
        let again = cache.register(second.path(), "haxe", "4.3.6").unwrap();

        assert_eq!(again, root);
        assert_eq!(fs::read(root.join("haxe")).unwrap(), b"first");
        assert_eq!(fs::read(root.join("lib/format/.current")).unwrap(), b"3.5.0");
    }

    #[test]
    fn replace_overwrites_previous_contents() {
        let cache_root = tempfile::tempdir().unwrap();
        let cache = DirToolCache::with_arch(cache_root.path(), "x64");

        let first = tempfile::tempdir().unwrap();
        fs::write(first.path().join("stale.txt"), b"old").unwrap();
        cache.replace(first.path(), "haxe", "latest").unwrap();

        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("haxe"), b"new").unwrap();
        let root = cache.replace(second.path(), "haxe", "latest").unwrap();

        assert!(!root.join("stale.txt").exists());
        assert_eq!(fs::read(root.join("haxe")).unwrap(), b"new");
        assert_eq!(cache.find("haxe", "latest"), Some(root));
    }
}
