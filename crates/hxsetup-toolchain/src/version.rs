use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, ToolchainError};

/// A validated `haxe-version` input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedVersion {
    pub version: String,
    pub nightly: bool,
}

fn nightly_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\d{4}-\d{2}-\d{2}_[\w.-]+_\w+|latest)$")
            .unwrap_or_else(|err| panic!("nightly pattern is invalid: {err}"))
    })
}

/// Accepts a nightly token (`2024-02-01_development_8b9c3a2`, `latest`) or a semantic version,
/// tolerating surrounding whitespace and a leading `v` / `=`.
pub fn parse_version_input(input: &str) -> Result<RequestedVersion> {
    let trimmed = input.trim();
    if nightly_pattern().is_match(trimmed) {
        return Ok(RequestedVersion {
            version: trimmed.to_string(),
            nightly: true,
        });
    }

    let cleaned = trimmed.trim_start_matches(['=', 'v']);
    match semver::Version::parse(cleaned) {
        Ok(version) => Ok(RequestedVersion {
            version: version.to_string(),
            nightly: false,
        }),
        Err(_) => Err(ToolchainError::InvalidVersion {
            input: input.to_string(),
        }),
    }
}
