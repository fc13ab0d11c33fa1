//! Opt-in local telemetry: run events as JSON lines and panic reports as JSON files.
//!
//! Nothing is recorded unless `HXSETUP_TELEMETRY` (events) or `HXSETUP_TELEMETRY_CRASH`
//! (panics) is set to a truthy value. Files live under `<data dir>/telemetry/<app>/`.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

const MAX_EVENT_BYTES: u64 = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct TelemetryOptions {
    pub app_name: &'static str,
    pub app_version: &'static str,
    pub events_enabled: bool,
    pub crash_enabled: bool,
    pub root: PathBuf,
}

pub struct Telemetry {
    app_name: String,
    app_version: String,
    run_id: String,
    events_enabled: bool,
    crash_enabled: bool,
    root: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize)]
struct RunEvent {
    event_type: String,
    at_unix_millis: i64,
    app: String,
    version: String,
    run_id: String,
    properties: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct CrashReport {
    at_unix_millis: i64,
    app: String,
    version: String,
    run_id: String,
    message: String,
    location: Option<String>,
}

static TELEMETRY: OnceLock<Arc<Telemetry>> = OnceLock::new();

pub fn init(options: TelemetryOptions) -> Arc<Telemetry> {
    if let Some(existing) = TELEMETRY.get() {
        return Arc::clone(existing);
    }

    let telemetry = Arc::new(Telemetry {
        app_name: options.app_name.to_string(),
        app_version: options.app_version.to_string(),
        run_id: new_run_id(),
        events_enabled: options.events_enabled,
        crash_enabled: options.crash_enabled,
        root: options.root.join(options.app_name),
        write_lock: Mutex::new(()),
    });

    if telemetry.crash_enabled {
        install_panic_hook(Arc::clone(&telemetry));
    }

    let _ = TELEMETRY.set(Arc::clone(&telemetry));
    telemetry
}

pub fn init_with_env(app_name: &'static str, app_version: &'static str) -> Arc<Telemetry> {
    init(TelemetryOptions {
        app_name,
        app_version,
        events_enabled: env_flag("HXSETUP_TELEMETRY"),
        crash_enabled: env_flag("HXSETUP_TELEMETRY_CRASH"),
        root: default_root(),
    })
}

/// Appends one event line before returning, so events survive an immediate process exit.
pub fn event(event_type: &str, properties: &[(&str, &str)]) {
    if let Some(telemetry) = TELEMETRY.get() {
        telemetry.event(event_type, properties);
    }
}

impl Telemetry {
    fn event(&self, event_type: &str, properties: &[(&str, &str)]) {
        if !self.events_enabled {
            return;
        }
        let event = self.build_event(event_type, properties);
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        write_event(&self.root, &event);
    }

    fn build_event(&self, event_type: &str, properties: &[(&str, &str)]) -> RunEvent {
        let properties = properties
            .iter()
            .filter(|(key, _)| !key.trim().is_empty())
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        RunEvent {
            event_type: event_type.to_string(),
            at_unix_millis: now_millis(),
            app: self.app_name.clone(),
            version: self.app_version.clone(),
            run_id: self.run_id.clone(),
            properties,
        }
    }

    fn crash_report(&self, message: String, location: Option<String>) {
        let report = CrashReport {
            at_unix_millis: now_millis(),
            app: self.app_name.clone(),
            version: self.app_version.clone(),
            run_id: self.run_id.clone(),
            message,
            location,
        };
        write_crash_report(&self.root, &report);
    }
}

fn install_panic_hook(telemetry: Arc<Telemetry>) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            (*msg).to_string()
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.clone()
        } else {
            "panic".to_string()
        };
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()));
        telemetry.crash_report(message, location);
        default_hook(info);
    }));
}

fn write_event(dir: &Path, event: &RunEvent) {
    if let Err(err) = fs::create_dir_all(dir) {
        eprintln!("telemetry: failed to create {}: {err}", dir.display());
        return;
    }

    let path = dir.join("events.jsonl");
    if rotate_if_needed(&path).is_err() {
        return;
    }

    let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("telemetry: failed to open {}: {err}", path.display());
            return;
        }
    };
    if let Ok(line) = serde_json::to_string(event) {
        let _ = writeln!(file, "{line}");
    }
}

fn rotate_if_needed(path: &Path) -> std::io::Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() >= MAX_EVENT_BYTES {
            let rotated = path.with_extension("jsonl.1");
            let _ = fs::remove_file(&rotated);
            fs::rename(path, rotated)?;
        }
    }
    Ok(())
}

fn write_crash_report(dir: &Path, report: &CrashReport) {
    let dir = dir.join("crashes");
    if let Err(err) = fs::create_dir_all(&dir) {
        eprintln!("telemetry: failed to create {}: {err}", dir.display());
        return;
    }
    let path = dir.join(format!(
        "crash-{}-{}.json",
        report.at_unix_millis,
        std::process::id()
    ));
    if let Ok(file) = OpenOptions::new().create(true).write(true).open(&path) {
        let _ = serde_json::to_writer_pretty(file, report);
    }
}

// Mirrors hxsetup_util::data_dir; this crate sits below util in the dependency graph.
fn default_root() -> PathBuf {
    let data_dir = match std::env::var("HXSETUP_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(".local/share/hxsetup"),
            Err(_) => PathBuf::from("/tmp/hxsetup"),
        },
    };
    data_dir.join("telemetry")
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn new_run_id() -> String {
    format!("{:x}-{:x}", now_millis(), std::process::id())
}
