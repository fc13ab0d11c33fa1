pub mod fs_ops;
pub mod hashing;
pub mod lock;
pub mod step;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use hxsetup_telemetry as telemetry;
use serde::Serialize;

pub const DATA_DIR_ENV: &str = "HXSETUP_DATA_DIR";
pub const TOOL_CACHE_ENV: &str = "HXSETUP_TOOL_CACHE";
pub const RUNNER_TOOL_CACHE_ENV: &str = "RUNNER_TOOL_CACHE";
pub const RUNNER_TEMP_ENV: &str = "RUNNER_TEMP";
pub const WORKSPACE_ENV: &str = "GITHUB_WORKSPACE";

/// Reads `key` and treats unset or blank values as absent.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn data_dir() -> PathBuf {
    if let Some(dir) = env_non_empty(DATA_DIR_ENV) {
        return expand_user(&dir);
    }
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/hxsetup")
    } else {
        PathBuf::from("/tmp/hxsetup")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn state_file_path(file_name: &str) -> PathBuf {
    state_dir().join(file_name)
}

pub fn tool_cache_dir() -> PathBuf {
    env_non_empty(RUNNER_TOOL_CACHE_ENV)
        .or_else(|| env_non_empty(TOOL_CACHE_ENV))
        .map(|dir| expand_user(&dir))
        .unwrap_or_else(|| data_dir().join("toolcache"))
}

/// Scratch space for downloads and staging directories.
pub fn temp_dir() -> PathBuf {
    env_non_empty(RUNNER_TEMP_ENV)
        .map(|dir| expand_user(&dir))
        .unwrap_or_else(|| std::env::temp_dir().join("hxsetup"))
}

/// Root that dependency globs are resolved against.
pub fn workspace_dir() -> io::Result<PathBuf> {
    match env_non_empty(WORKSPACE_ENV) {
        Some(dir) => Ok(expand_user(&dir)),
        None => std::env::current_dir(),
    }
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_target(false)
        .init();
    Ok(())
}

pub fn init_run_telemetry(app_name: &'static str, app_version: &'static str, command: &str) {
    telemetry::init_with_env(app_name, app_version);
    telemetry::event("run.start", &[("command", command)]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        assert_eq!(expand_user("/opt/haxe"), PathBuf::from("/opt/haxe"));
        assert_eq!(expand_user("relative/dir"), PathBuf::from("relative/dir"));
    }

    #[test]
    fn write_json_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");
        write_json_atomic(&path, &vec!["a", "b"]).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: Vec<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec!["a".to_string(), "b".to_string()]);
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
