//! Step commands understood by the CI runner.
//!
//! When the runner's command files (`GITHUB_ENV`, `GITHUB_PATH`, `GITHUB_OUTPUT`,
//! `GITHUB_STATE`) are available, values are appended to them using the heredoc
//! form. Outside a runner, environment and path changes are printed as shell
//! `export` lines and step state falls back to a JSON file in the state dir.

use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, info};

use crate::{env_non_empty, state_file_path, write_json_atomic};

pub const ENV_FILE_ENV: &str = "GITHUB_ENV";
pub const PATH_FILE_ENV: &str = "GITHUB_PATH";
pub const OUTPUT_FILE_ENV: &str = "GITHUB_OUTPUT";
pub const STATE_FILE_ENV: &str = "GITHUB_STATE";
pub const STATE_ENV_PREFIX: &str = "STATE_";

const FALLBACK_STATE_FILE: &str = "step-state.json";

pub trait StepCommands: Send + Sync {
    /// Makes `name=value` visible to every later step.
    fn export_variable(&self, name: &str, value: &str) -> io::Result<()>;
    /// Prepends `dir` to `PATH` for every later step.
    fn add_path(&self, dir: &Path) -> io::Result<()>;
    fn set_output(&self, name: &str, value: &str) -> io::Result<()>;
    /// Stores a value for the post step of this action.
    fn save_state(&self, name: &str, value: &str) -> io::Result<()>;
    /// Reads a value stored by `save_state` in an earlier process. Unset and empty are both `None`.
    fn get_state(&self, name: &str) -> io::Result<Option<String>>;
    /// Forgets state left behind by a previous run.
    fn reset_state(&self) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct CommandFiles {
    pub env_file: Option<PathBuf>,
    pub path_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub state_file: Option<PathBuf>,
}

impl CommandFiles {
    pub fn from_env() -> Self {
        Self {
            env_file: env_non_empty(ENV_FILE_ENV).map(PathBuf::from),
            path_file: env_non_empty(PATH_FILE_ENV).map(PathBuf::from),
            output_file: env_non_empty(OUTPUT_FILE_ENV).map(PathBuf::from),
            state_file: env_non_empty(STATE_FILE_ENV).map(PathBuf::from),
        }
    }
}

pub struct FileCommands {
    files: CommandFiles,
    injected_state: HashMap<String, String>,
    fallback_state: PathBuf,
}

impl FileCommands {
    pub fn new(
        files: CommandFiles,
        injected_state: HashMap<String, String>,
        fallback_state: PathBuf,
    ) -> Self {
        Self {
            files,
            injected_state,
            fallback_state,
        }
    }

    pub fn from_env() -> Self {
        let injected_state = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix(STATE_ENV_PREFIX)
                    .map(|name| (name.to_string(), value))
            })
            .collect();
        Self::new(
            CommandFiles::from_env(),
            injected_state,
            state_file_path(FALLBACK_STATE_FILE),
        )
    }

    fn read_fallback(&self) -> io::Result<BTreeMap<String, String>> {
        match fs::read(&self.fallback_state) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(io::Error::other),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err),
        }
    }
}

impl StepCommands for FileCommands {
    fn export_variable(&self, name: &str, value: &str) -> io::Result<()> {
        match &self.files.env_file {
            Some(file) => append_key_value(file, name, value),
            None => {
                println!("export {name}={}", shell_quote(value));
                Ok(())
            }
        }
    }

    fn add_path(&self, dir: &Path) -> io::Result<()> {
        let dir = dir.to_string_lossy();
        match &self.files.path_file {
            Some(file) => append_line(file, &dir),
            None => {
                println!("export PATH={}:\"$PATH\"", shell_quote(&dir));
                Ok(())
            }
        }
    }

    fn set_output(&self, name: &str, value: &str) -> io::Result<()> {
        match &self.files.output_file {
            Some(file) => append_key_value(file, name, value),
            None => {
                info!("output {name}={value}");
                Ok(())
            }
        }
    }

    fn save_state(&self, name: &str, value: &str) -> io::Result<()> {
        if let Some(file) = &self.files.state_file {
            return append_key_value(file, name, value);
        }
        let mut state = self.read_fallback()?;
        state.insert(name.to_string(), value.to_string());
        debug!("saved state {name} to {}", self.fallback_state.display());
        write_json_atomic(&self.fallback_state, &state)
    }

    fn get_state(&self, name: &str) -> io::Result<Option<String>> {
        if let Some(value) = self.injected_state.get(name) {
            return Ok(Some(value.clone()).filter(|value| !value.is_empty()));
        }
        if self.files.state_file.is_some() {
            return Ok(None);
        }
        Ok(self
            .read_fallback()?
            .remove(name)
            .filter(|value| !value.is_empty()))
    }

    fn reset_state(&self) -> io::Result<()> {
        if self.files.state_file.is_some() {
            return Ok(());
        }
        match fs::remove_file(&self.fallback_state) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// In-process step commands; nothing leaves the process.
#[derive(Default)]
pub struct MemoryCommands {
    inner: Mutex<MemoryState>,
}

#[derive(Default, Clone)]
struct MemoryState {
    variables: Vec<(String, String)>,
    paths: Vec<PathBuf>,
    outputs: BTreeMap<String, String>,
    state: BTreeMap<String, String>,
}

impl MemoryCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.lock()
            .variables
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock().paths.clone()
    }

    pub fn output(&self, name: &str) -> Option<String> {
        self.lock().outputs.get(name).cloned()
    }

    pub fn state(&self) -> BTreeMap<String, String> {
        self.lock().state.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StepCommands for MemoryCommands {
    fn export_variable(&self, name: &str, value: &str) -> io::Result<()> {
        self.lock()
            .variables
            .push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn add_path(&self, dir: &Path) -> io::Result<()> {
        self.lock().paths.push(dir.to_path_buf());
        Ok(())
    }

    fn set_output(&self, name: &str, value: &str) -> io::Result<()> {
        self.lock()
            .outputs
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn save_state(&self, name: &str, value: &str) -> io::Result<()> {
        self.lock()
            .state
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_state(&self, name: &str) -> io::Result<Option<String>> {
        Ok(self
            .lock()
            .state
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned())
    }

    fn reset_state(&self) -> io::Result<()> {
        self.lock().state.clear();
        Ok(())
    }
}

fn append_key_value(file: &Path, name: &str, value: &str) -> io::Result<()> {
    let delimiter = format!("ghadelimiter_{}", uuid::Uuid::new_v4());
    if name.contains(&delimiter) || value.contains(&delimiter) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "value contains the command delimiter",
        ));
    }
    append_line(file, &format!("{name}<<{delimiter}\n{value}\n{delimiter}"))
}

fn append_line(file: &Path, line: &str) -> io::Result<()> {
    let mut handle = OpenOptions::new().create(true).append(true).open(file)?;
    writeln!(handle, "{line}")
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
