#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use hxsetup_toolchain::{
    Downloader, HttpDownloader, ProcessOutput, ProcessRunner, Result, RunOptions, ToolCache,
};

/// Writes a `.tar.gz` containing `files` (path, contents); parent directories are implied.
pub fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, name, contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

pub fn write_zip(path: &Path, files: &[(&str, &str)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, contents) in files {
        zip.start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Resolves `file://` URLs and counts every download.
pub struct CountingDownloader {
    inner: HttpDownloader,
    calls: AtomicUsize,
}

impl CountingDownloader {
    pub fn new(download_dir: &Path) -> Self {
        Self {
            inner: HttpDownloader::new(download_dir),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for CountingDownloader {
    async fn download(&self, url: &str) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.download(url).await
    }
}

/// Hands back the same local file for every URL, whatever the URL names.
pub struct StaticDownloader {
    archive: PathBuf,
    calls: AtomicUsize,
}

impl StaticDownloader {
    pub fn new(archive: &Path) -> Self {
        Self {
            archive: archive.to_path_buf(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for StaticDownloader {
    async fn download(&self, _url: &str) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.archive.clone())
    }
}

/// Tool cache that hands back preloaded roots and records registrations without copying.
#[derive(Default)]
pub struct MemoryToolCache {
    entries: Mutex<HashMap<(String, String), PathBuf>>,
}

impl MemoryToolCache {
    pub fn insert(&self, name: &str, version: &str, root: &Path) {
        self.entries
            .lock()
            .unwrap()
            .insert((name.to_string(), version.to_string()), root.to_path_buf());
    }
}

impl ToolCache for MemoryToolCache {
    fn find(&self, name: &str, version: &str) -> Option<PathBuf> {
        self.entries
            .lock()
            .unwrap()
            .get(&(name.to_string(), version.to_string()))
            .cloned()
    }

    fn register(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf> {
        if let Some(existing) = self.find(name, version) {
            return Ok(existing);
        }
        self.insert(name, version, source);
        Ok(source.to_path_buf())
    }

    fn replace(&self, source: &Path, name: &str, version: &str) -> Result<PathBuf> {
        self.insert(name, version, source);
        Ok(source.to_path_buf())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Records invocations and answers `otool` with canned output.
pub struct ScriptedRunner {
    otool_stdout: String,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(otool_stdout: impl Into<String>) -> Self {
        Self {
            otool_stdout: otool_stdout.into(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.program).collect()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        opts: &RunOptions,
    ) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            env: opts
                .env
                .iter()
                .map(|(key, value)| (key.clone(), value.to_string_lossy().to_string()))
                .collect(),
        });
        let stdout = if program == "otool" {
            self.otool_stdout.clone()
        } else {
            String::new()
        };
        Ok(ProcessOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        })
    }
}

/// Every command exits with status 2 and a gzip complaint on stderr.
pub struct BrokenTarRunner;

#[async_trait]
impl ProcessRunner for BrokenTarRunner {
    async fn run(
        &self,
        program: &str,
        _args: &[String],
        _opts: &RunOptions,
    ) -> Result<ProcessOutput> {
        Ok(ProcessOutput {
            stdout: String::new(),
            stderr: format!("{program}: gzip: stdin: not in gzip format"),
            exit_code: Some(2),
        })
    }
}
