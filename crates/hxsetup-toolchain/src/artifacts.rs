use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use futures_util::StreamExt;
use hxsetup_util::hashing::short_hash;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::asset::ArchiveExt;
use crate::error::{Result, ToolchainError};
use crate::process::{ProcessOutput, ProcessRunner, RunOptions};

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetches `url` and returns the path of a local copy of the archive.
    async fn download(&self, url: &str) -> Result<PathBuf>;
}

/// Streams remote archives into the download directory; local paths are used in place.
pub struct HttpDownloader {
    download_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<PathBuf> {
        if !is_remote_url(url) {
            let path = local_artifact_path(url).ok_or_else(|| ToolchainError::Download {
                url: url.to_string(),
                message: "not an http(s) url or local path".into(),
            })?;
            if !path.is_file() {
                return Err(ToolchainError::Download {
                    url: url.to_string(),
                    message: format!("artifact not found: {}", path.display()),
                });
            }
            debug!("using local artifact {}", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&self.download_dir)?;
        let dest = self.download_dir.join(cache_file_name(url));
        info!("downloading {url}");
        download_artifact(url, &dest).await?;
        debug!("saved {}", dest.display());
        Ok(dest)
    }
}

pub fn is_remote_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

pub fn local_artifact_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        Some(PathBuf::from(path))
    } else if Path::new(url).is_absolute() {
        Some(PathBuf::from(url))
    } else {
        None
    }
}

/// Unpacks `archive` into `dest`. `.tar.gz` goes through the system `tar` via `runner`.
pub async fn extract_archive(
    runner: &dyn ProcessRunner,
    archive: &Path,
    ext: ArchiveExt,
    dest: &Path,
) -> Result<()> {
    fs::create_dir_all(dest)?;
    info!("extracting {} into {}", archive.display(), dest.display());
    match ext {
        ArchiveExt::TarGz => extract_tar_gz(runner, archive, dest).await,
        ArchiveExt::Zip => extract_zip(archive, dest).await,
    }
}

async fn extract_tar_gz(runner: &dyn ProcessRunner, archive: &Path, dest: &Path) -> Result<()> {
    let args = vec![
        "-xzf".to_string(),
        archive.to_string_lossy().to_string(),
        "-C".to_string(),
        dest.to_string_lossy().to_string(),
    ];
    let opts = RunOptions {
        ignore_return_code: true,
        ..RunOptions::default()
    };
    let output = runner.run("tar", &args, &opts).await?;
    if output.exit_code != Some(0) {
        return Err(ToolchainError::Extract {
            archive: archive.to_path_buf(),
            message: format!(
                "tar exited with {:?}\n{}\n{}",
                output.exit_code,
                output.stdout.trim(),
                output.stderr.trim()
            ),
        });
    }
    Ok(())
}

async fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    let task_archive = archive.clone();
    tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
        let file = fs::File::open(&task_archive).map_err(|e| e.to_string())?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
        zip.extract(&dest).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ToolchainError::Extract {
        archive: archive.clone(),
        message: e.to_string(),
    })?
    .map_err(|message| ToolchainError::Extract { archive, message })
}

async fn download_artifact(url: &str, dest: &Path) -> Result<()> {
    let download_err = |message: String| ToolchainError::Download {
        url: url.to_string(),
        message,
    };

    let client = Client::builder()
        .user_agent(concat!("hxsetup/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| download_err(format!("failed to build http client: {e}")))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| download_err(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(download_err(format!("status {}", resp.status())));
    }

    let tmp = dest.with_extension(format!("tmp-{}", Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&tmp).await?;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                let _ = fs::remove_file(&tmp);
                return Err(download_err(format!("read failed: {err}")));
            }
        };
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    fs::rename(&tmp, dest)?;
    Ok(())
}

fn cache_file_name(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or("artifact.bin");
    let name = name.split('?').next().unwrap_or(name);
    format!("{}-{}", short_hash(url), name)
}
