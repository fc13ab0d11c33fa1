//! Resolves, downloads, and installs the Haxe compiler together with the Neko VM that
//! haxelib needs, then exposes both to later build steps.

pub mod acquire;
pub mod artifacts;
pub mod asset;
pub mod config;
pub mod error;
pub mod platform;
pub mod process;
pub mod tool_cache;
pub mod verify;
pub mod version;
pub mod wiring;

pub use acquire::{Acquirer, ToolInstallation};
pub use artifacts::{Downloader, HttpDownloader};
pub use asset::{Asset, AssetDescriptor, ArchiveExt, HaxeAsset, NekoAsset};
pub use config::{Mirrors, ToolchainConfig};
pub use error::{Result, ToolchainError};
pub use platform::{resolve_platform, Os, PlatformId};
pub use process::{ProcessOutput, ProcessRunner, RunOptions, SystemRunner};
pub use tool_cache::{DirToolCache, ToolCache};
pub use version::{parse_version_input, RequestedVersion};
pub use wiring::{EnvironmentWiring, HostEnv, SetupOutcome};
