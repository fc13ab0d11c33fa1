//! Content-addressed keys for the haxelib dependency cache.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use hxsetup_util::hashing::{sha256_file_bytes, sha256_of_sorted};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CacheError, Result};

pub const KEY_PREFIX: &str = "haxelib-cache";
const TOOLCHAIN_TAG: &str = "haxe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCacheKey {
    pub platform: String,
    pub version: String,
    pub content_hash: String,
}

impl DependencyCacheKey {
    pub fn new(
        platform: impl Into<String>,
        version: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            version: version.into(),
            content_hash: content_hash.into(),
        }
    }
}

impl fmt::Display for DependencyCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{KEY_PREFIX}-{}-{TOOLCHAIN_TAG}{}-{}",
            self.platform, self.version, self.content_hash
        )
    }
}

/// Hashes the dependency manifests under `root` and builds the cache key.
pub fn build_key(
    platform_tag: &str,
    version: &str,
    manifest_glob: &str,
    root: &Path,
) -> Result<DependencyCacheKey> {
    let content_hash = hash_files(root, manifest_glob)?;
    Ok(DependencyCacheKey::new(platform_tag, version, content_hash))
}

/// SHA-256 over the sorted per-file digests of every regular file matched by
/// `patterns`; file names and enumeration order do not affect the result.
pub fn hash_files(root: &Path, patterns: &str) -> Result<String> {
    let files = matched_files(root, patterns)?;
    if files.is_empty() {
        return Err(CacheError::NoDependencyFilesMatched {
            pattern: patterns.to_string(),
        });
    }

    let mut digests = Vec::with_capacity(files.len());
    for file in &files {
        debug!(file = %file.display(), "hashing dependency manifest");
        digests.push(sha256_file_bytes(file)?);
    }
    Ok(sha256_of_sorted(digests))
}

/// Regular files under `root` matched by newline-separated patterns.
///
/// A pattern starting with `!` excludes whatever it matches. Matching is done on
/// `/`-separated paths relative to `root`; `*` stays within one path segment and
/// `**` spans any number of them.
pub fn matched_files(root: &Path, patterns: &str) -> Result<Vec<PathBuf>> {
    let matcher = PatternSet::parse(patterns)?;
    if matcher.is_empty() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if matcher.matches(&rel) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

struct PatternSet {
    include: GlobSet,
    exclude: GlobSet,
    include_count: usize,
}

impl PatternSet {
    fn parse(patterns: &str) -> Result<Self> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();
        let mut include_count = 0;

        for line in patterns.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (negated, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest.trim_start()),
                None => (false, line),
            };
            let glob = compile(normalize(pattern))?;
            if negated {
                exclude.add(glob);
            } else {
                include.add(glob);
                include_count += 1;
            }
        }

        Ok(Self {
            include: build_set(include, patterns)?,
            exclude: build_set(exclude, patterns)?,
            include_count,
        })
    }

    fn is_empty(&self) -> bool {
        self.include_count == 0
    }

    fn matches(&self, rel: &str) -> bool {
        self.include.is_match(rel) && !self.exclude.is_match(rel)
    }
}

fn normalize(pattern: &str) -> &str {
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    pattern
}

fn compile(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|err| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}

fn build_set(builder: GlobSetBuilder, patterns: &str) -> Result<GlobSet> {
    builder.build().map_err(|err| CacheError::InvalidPattern {
        pattern: patterns.to_string(),
        message: err.to_string(),
    })
}
