use std::fmt;

use crate::error::{Result, ToolchainError};

pub const HOST_OS_OVERRIDE_ENV: &str = "HXSETUP_HOST_OS";
pub const HOST_ARCH_OVERRIDE_ENV: &str = "HXSETUP_HOST_ARCH";

/// Operating systems in the naming scheme used by Haxe and Neko release archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Osx,
    Win,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Osx => "osx",
            Os::Win => "win",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host OS and architecture as they appear in release file names (`linux` + `64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformId {
    pub os: Os,
    pub arch_suffix: &'static str,
}

/// `{os}{arch}`, e.g. `linux64`.
impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.os, self.arch_suffix)
    }
}

// Accepts both Node-style identifiers and `std::env::consts` values.
const OS_TABLE: &[(&str, Os)] = &[
    ("linux", Os::Linux),
    ("darwin", Os::Osx),
    ("macos", Os::Osx),
    ("win32", Os::Win),
    ("windows", Os::Win),
];

// (raw arch, required os) -> suffix. `None` means any supported os.
const ARCH_TABLE: &[(&str, Option<Os>, &str)] = &[
    ("x64", None, "64"),
    ("x86_64", None, "64"),
    // Apple silicon runs the universal osx builds.
    ("arm64", Some(Os::Osx), "64"),
    ("aarch64", Some(Os::Osx), "64"),
];

pub fn resolve_os(raw_os: &str) -> Result<Os> {
    OS_TABLE
        .iter()
        .find(|(name, _)| *name == raw_os)
        .map(|(_, os)| *os)
        .ok_or_else(|| ToolchainError::UnsupportedPlatform {
            os: raw_os.to_string(),
        })
}

pub fn resolve_platform_from(raw_os: &str, raw_arch: &str) -> Result<PlatformId> {
    let os = resolve_os(raw_os)?;
    let arch_suffix = ARCH_TABLE
        .iter()
        .find(|(name, required, _)| *name == raw_arch && required.map_or(true, |r| r == os))
        .map(|(_, _, suffix)| *suffix)
        .ok_or_else(|| ToolchainError::UnsupportedArch {
            arch: raw_arch.to_string(),
            os: os.to_string(),
        })?;
    Ok(PlatformId { os, arch_suffix })
}

/// Detects the running host, honoring `HXSETUP_HOST_OS` / `HXSETUP_HOST_ARCH`.
pub fn resolve_platform() -> Result<PlatformId> {
    let os = hxsetup_util::env_non_empty(HOST_OS_OVERRIDE_ENV)
        .unwrap_or_else(|| std::env::consts::OS.to_string());
    let arch = hxsetup_util::env_non_empty(HOST_ARCH_OVERRIDE_ENV)
        .unwrap_or_else(|| std::env::consts::ARCH.to_string());
    resolve_platform_from(&os, &arch)
}
