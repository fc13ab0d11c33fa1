//! Remote archive cache for the haxelib library directory.

use std::{
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tracing::{debug, info};

use crate::error::{CacheError, Result};

pub const CACHE_DIR_ENV: &str = "HXSETUP_CACHE_DIR";
const ARCHIVE_SUFFIX: &str = ".tar.gz";
const MAX_KEY_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Another run already published this key; the stored archive is left untouched.
    AlreadyExists,
}

#[async_trait]
pub trait RemoteCache: Send + Sync {
    /// Restores `paths` from the entry stored under `primary_key`, falling back to the
    /// newest entry whose key starts with one of `restore_keys`. Returns the key that hit.
    async fn restore(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>>;

    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<SaveOutcome>;
}

/// Stores one `<key>.tar.gz` per key in a directory.
///
/// Entry `i/...` in an archive belongs to `paths[i]`, so a restore must be given the
/// same path list the save used.
#[derive(Debug, Clone)]
pub struct DirArchiveStore {
    root: PathBuf,
}

impl DirArchiveStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = hxsetup_util::env_non_empty(CACHE_DIR_ENV)
            .map(|value| hxsetup_util::expand_user(&value))
            .unwrap_or_else(|| hxsetup_util::data_dir().join("archive-cache"));
        Self::new(root)
    }

    fn archive_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{ARCHIVE_SUFFIX}"))
    }

    fn find_archive(
        &self,
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<(String, PathBuf)>> {
        let exact = self.archive_path(primary_key);
        if exact.is_file() {
            return Ok(Some((primary_key.to_string(), exact)));
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut stored = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(key) = name.strip_suffix(ARCHIVE_SUFFIX) else {
                continue;
            };
            let modified = entry
                .metadata()?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            stored.push((key.to_string(), modified, entry.path()));
        }

        for prefix in restore_keys {
            let newest = stored
                .iter()
                .filter(|(key, _, _)| key.starts_with(prefix.as_str()))
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            if let Some((key, _, path)) = newest {
                return Ok(Some((key.clone(), path.clone())));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl RemoteCache for DirArchiveStore {
    async fn restore(
        &self,
        paths: &[PathBuf],
        primary_key: &str,
        restore_keys: &[String],
    ) -> Result<Option<String>> {
        validate_key(primary_key)?;
        for key in restore_keys {
            validate_key(key)?;
        }

        let Some((key, archive)) = self.find_archive(primary_key, restore_keys)? else {
            debug!(key = primary_key, root = %self.root.display(), "no cache entry");
            return Ok(None);
        };

        info!("restoring {} from {}", key, archive.display());
        let paths = paths.to_vec();
        blocking(move || unpack(&archive, &paths)).await?;
        Ok(Some(key))
    }

    async fn save(&self, paths: &[PathBuf], key: &str) -> Result<SaveOutcome> {
        validate_key(key)?;
        let dest = self.archive_path(key);
        if dest.exists() {
            return Ok(SaveOutcome::AlreadyExists);
        }

        let root = self.root.clone();
        let paths = paths.to_vec();
        blocking(move || pack(&root, &paths, &dest)).await
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| CacheError::Io(io::Error::other(err)))?
}

fn pack(root: &Path, paths: &[PathBuf], dest: &Path) -> Result<SaveOutcome> {
    fs::create_dir_all(root)?;
    let tmp = tempfile::Builder::new()
        .prefix(".hxsetup-cache-")
        .suffix(ARCHIVE_SUFFIX)
        .tempfile_in(root)?;

    let encoder = GzEncoder::new(tmp.as_file(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    for (index, path) in paths.iter().enumerate() {
        let name = index.to_string();
        if path.is_dir() {
            builder.append_dir_all(&name, path)?;
        } else {
            builder.append_path_with_name(path, &name)?;
        }
    }
    builder.into_inner()?.finish()?;

    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(SaveOutcome::Saved),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(SaveOutcome::AlreadyExists)
        }
        Err(err) => Err(err.error.into()),
    }
}

fn unpack(archive: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tar.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let dest = restore_target(&entry_path, paths).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected cache entry {}", entry_path.display()),
            )
        })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&dest)?;
    }
    Ok(())
}

fn restore_target(entry_path: &Path, paths: &[PathBuf]) -> Option<PathBuf> {
    let mut components = entry_path.components();
    let Some(Component::Normal(first)) = components.next() else {
        return None;
    };
    let index: usize = first.to_str()?.parse().ok()?;
    let base = paths.get(index)?;
    let rest = components.as_path();
    if rest
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }
    if rest.as_os_str().is_empty() {
        Some(base.clone())
    } else {
        Some(base.join(rest))
    }
}

pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.len() > MAX_KEY_LEN {
        "key is longer than 512 characters"
    } else if key.contains(',') {
        "key cannot contain commas"
    } else if key.contains(['/', '\\']) || key.starts_with('.') {
        "key must be a plain file name"
    } else {
        return Ok(());
    };
    Err(CacheError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}
