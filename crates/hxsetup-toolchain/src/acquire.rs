use std::path::{Path, PathBuf};

use hxsetup_telemetry as telemetry;
use hxsetup_util::fs_ops::remove_dir_if_exists;
use tracing::{debug, info};

use crate::artifacts::{extract_archive, Downloader};
use crate::asset::{ArchiveExt, AssetDescriptor};
use crate::error::{Result, ToolchainError};
use crate::process::ProcessRunner;
use crate::tool_cache::ToolCache;
use crate::verify::{find_tool_root, validate_layout};

/// A toolchain root materialized on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInstallation {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
    pub from_cache: bool,
}

/// Fetches assets into the tool cache, skipping all network and extraction work on a cache hit.
pub struct Acquirer<'a> {
    cache: &'a dyn ToolCache,
    downloader: &'a dyn Downloader,
    runner: &'a dyn ProcessRunner,
    staging_dir: PathBuf,
}

impl<'a> Acquirer<'a> {
    pub fn new(
        cache: &'a dyn ToolCache,
        downloader: &'a dyn Downloader,
        runner: &'a dyn ProcessRunner,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            downloader,
            runner,
            staging_dir: staging_dir.into(),
        }
    }

    pub async fn acquire(&self, asset: &AssetDescriptor) -> Result<ToolInstallation> {
        if asset.cacheable {
            if let Some(root) = self.cache.find(&asset.name, &asset.version) {
                info!("[{}] found = {}", asset.name, root.display());
                return Ok(ToolInstallation {
                    name: asset.name.clone(),
                    version: asset.version.clone(),
                    root,
                    from_cache: true,
                });
            }
        }

        info!(
            "[{}] dl start = {} ({})",
            asset.name, asset.version, asset.download_url
        );
        let archive = self.downloader.download(&asset.download_url).await?;
        ensure_extension(&archive, asset.archive_ext)?;

        let staging = self.staging_dir.join(&asset.archive_base_name);
        remove_dir_if_exists(&staging)?;
        extract_archive(self.runner, &archive, asset.archive_ext, &staging).await?;

        let tool_root = find_tool_root(&staging, asset.is_nested)?;
        debug!("found tool root: {}", tool_root.display());
        validate_layout(&asset.name, asset.layout, &tool_root)?;

        let root = if asset.cacheable {
            self.cache.register(&tool_root, &asset.name, &asset.version)?
        } else {
            self.cache.replace(&tool_root, &asset.name, &asset.version)?
        };
        info!("[{}] installed = {}", asset.name, root.display());
        telemetry::event(
            "asset.acquired",
            &[("name", asset.name.as_str()), ("version", asset.version.as_str())],
        );

        Ok(ToolInstallation {
            name: asset.name.clone(),
            version: asset.version.clone(),
            root,
            from_cache: false,
        })
    }
}

// The downloaded file must carry the extension the descriptor promised.
fn ensure_extension(archive: &Path, expected: ArchiveExt) -> Result<()> {
    let file_name = archive
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let actual = ArchiveExt::from_file_name(&file_name)?;
    if actual != expected {
        return Err(ToolchainError::UnknownArchiveExtension {
            ext: format!("{actual} (expected {expected})"),
        });
    }
    Ok(())
}
