//! Release artifacts for Neko and Haxe.
//!
//! File names and URLs are pure functions of (version, nightly flag, platform):
//!
//! ```text
//! https://github.com/HaxeFoundation/neko/releases/download/v2-4-1/neko-2.4.1-linux64.tar.gz
//! https://github.com/HaxeFoundation/neko/releases/download/v2-4-1/neko-2.4.1-osx-universal.tar.gz
//! https://github.com/HaxeFoundation/haxe/releases/download/4.0.5/haxe-4.0.5-linux64.tar.gz
//! https://github.com/HaxeFoundation/haxe/releases/download/3.4.7/haxe-3.4.7-win.zip
//! https://build.haxe.org/builds/haxe/linux64/haxe_latest.tar.gz
//! ```

use std::fmt;

use crate::config::Mirrors;
use crate::error::{Result, ToolchainError};
use crate::platform::{Os, PlatformId};

pub const NEKO: &str = "neko";
pub const HAXE: &str = "haxe";

pub const NIGHTLY_LATEST: &str = "latest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveExt {
    Zip,
    TarGz,
}

impl ArchiveExt {
    /// Windows builds ship as zip, everything else as gzipped tarballs.
    pub fn for_os(os: Os) -> Self {
        match os {
            Os::Win => ArchiveExt::Zip,
            Os::Linux | Os::Osx => ArchiveExt::TarGz,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveExt::Zip => ".zip",
            ArchiveExt::TarGz => ".tar.gz",
        }
    }

    pub fn from_file_name(name: &str) -> Result<Self> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveExt::TarGz)
        } else if name.ends_with(".zip") {
            Ok(ArchiveExt::Zip)
        } else {
            let ext = name
                .rsplit_once('.')
                .map(|(_, ext)| format!(".{ext}"))
                .unwrap_or_default();
            Err(ToolchainError::UnknownArchiveExtension { ext })
        }
    }
}

impl fmt::Display for ArchiveExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paths that must exist under an installation root. Each slot lists acceptable alternatives.
pub type Layout = &'static [&'static [&'static str]];

const NEKO_LAYOUT: Layout = &[&["neko", "neko.exe"]];
const HAXE_LAYOUT: Layout = &[&["haxe", "haxe.exe"], &["std"]];

/// Everything the acquirer needs to fetch and install one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub name: String,
    pub version: String,
    pub download_url: String,
    pub archive_base_name: String,
    pub archive_ext: ArchiveExt,
    /// Payload sits in one extra directory with an unpredictable name.
    pub is_nested: bool,
    /// Moving targets (nightly `latest`) are never served from the tool cache.
    pub cacheable: bool,
    pub layout: Layout,
}

pub trait Asset {
    fn name(&self) -> &'static str;
    fn version(&self) -> &str;
    /// Platform token embedded in the archive name.
    fn target(&self) -> String;
    fn download_url(&self) -> String;
    fn archive_base_name(&self) -> String;
    fn archive_ext(&self) -> ArchiveExt;
    fn is_nested(&self) -> bool;
    fn layout(&self) -> Layout;

    fn is_cacheable(&self) -> bool {
        true
    }

    fn file_name(&self) -> String {
        format!("{}{}", self.archive_base_name(), self.archive_ext())
    }

    fn descriptor(&self) -> AssetDescriptor {
        AssetDescriptor {
            name: self.name().to_string(),
            version: self.version().to_string(),
            download_url: self.download_url(),
            archive_base_name: self.archive_base_name(),
            archive_ext: self.archive_ext(),
            is_nested: self.is_nested(),
            cacheable: self.is_cacheable(),
            layout: self.layout(),
        }
    }
}

/// Neko version required by haxelib for a given Haxe version.
///
/// Haxe 3 only works with Neko 2.1; everything newer uses 2.4.
pub fn neko_version_for(haxe_version: &str) -> &'static str {
    if haxe_version.starts_with("3.") {
        "2.1.0"
    } else {
        "2.4.1"
    }
}

#[derive(Debug, Clone)]
pub struct NekoAsset {
    version: String,
    platform: PlatformId,
    mirrors: Mirrors,
}

impl NekoAsset {
    pub fn new(version: impl Into<String>, platform: PlatformId, mirrors: Mirrors) -> Self {
        Self {
            version: version.into(),
            platform,
            mirrors,
        }
    }

    pub fn for_haxe_version(haxe_version: &str, platform: PlatformId, mirrors: Mirrors) -> Self {
        Self::new(neko_version_for(haxe_version), platform, mirrors)
    }

    fn release_tag(&self) -> String {
        format!("v{}", self.version.replace('.', "-"))
    }
}

impl Asset for NekoAsset {
    fn name(&self) -> &'static str {
        NEKO
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn target(&self) -> String {
        match self.platform.os {
            // No 64-bit Neko 2.1 exists for Windows.
            Os::Win if self.version.starts_with("2.1") => self.platform.os.to_string(),
            Os::Osx if self.version.starts_with("2.4") => "osx-universal".to_string(),
            _ => self.platform.to_string(),
        }
    }

    fn download_url(&self) -> String {
        format!(
            "{}/neko/releases/download/{}/{}",
            self.mirrors.release_base,
            self.release_tag(),
            self.file_name()
        )
    }

    fn archive_base_name(&self) -> String {
        format!("{NEKO}-{}-{}", self.version, self.target())
    }

    fn archive_ext(&self) -> ArchiveExt {
        ArchiveExt::for_os(self.platform.os)
    }

    fn is_nested(&self) -> bool {
        true
    }

    fn layout(&self) -> Layout {
        NEKO_LAYOUT
    }
}

#[derive(Debug, Clone)]
pub struct HaxeAsset {
    version: String,
    nightly: bool,
    platform: PlatformId,
    mirrors: Mirrors,
}

impl HaxeAsset {
    pub fn new(
        version: impl Into<String>,
        nightly: bool,
        platform: PlatformId,
        mirrors: Mirrors,
    ) -> Self {
        Self {
            version: version.into(),
            nightly,
            platform,
            mirrors,
        }
    }

    /// Directory of the nightly build host that carries this platform's builds.
    pub fn nightly_channel(&self) -> &'static str {
        match self.platform.os {
            Os::Osx => "mac",
            Os::Linux => "linux64",
            Os::Win => "windows64",
        }
    }
}

impl Asset for HaxeAsset {
    fn name(&self) -> &'static str {
        HAXE
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn target(&self) -> String {
        match self.platform.os {
            Os::Osx => self.platform.os.to_string(),
            // Haxe 3 on Windows must match the 32-bit-only Neko 2.1.
            Os::Win if self.version.starts_with("3.") => self.platform.os.to_string(),
            _ => self.platform.to_string(),
        }
    }

    fn download_url(&self) -> String {
        if self.nightly {
            format!(
                "{}/{}/{}",
                self.mirrors.nightly_base,
                self.nightly_channel(),
                self.file_name()
            )
        } else {
            format!(
                "{}/haxe/releases/download/{}/{}",
                self.mirrors.release_base,
                self.version,
                self.file_name()
            )
        }
    }

    fn archive_base_name(&self) -> String {
        if self.nightly {
            format!("{HAXE}_{}", self.version)
        } else {
            format!("{HAXE}-{}-{}", self.version, self.target())
        }
    }

    fn archive_ext(&self) -> ArchiveExt {
        ArchiveExt::for_os(self.platform.os)
    }

    fn is_nested(&self) -> bool {
        true
    }

    fn layout(&self) -> Layout {
        HAXE_LAYOUT
    }

    fn is_cacheable(&self) -> bool {
        !(self.nightly && self.version == NIGHTLY_LATEST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::resolve_platform_from;

    fn platform(os: &str, arch: &str) -> PlatformId {
        resolve_platform_from(os, arch).unwrap()
    }

    #[test]
    fn neko_version_tracks_haxe_major() {
        for version in ["3.4.7", "3.0.0", "3.x"] {
            assert_eq!(neko_version_for(version), "2.1.0");
        }
        for version in [
            "4.0.5",
            "4.3.6",
            "5.0.0-preview.1",
            "2023-01-01_development_abc",
            "latest",
            "30.0.0",
        ] {
            assert_eq!(neko_version_for(version), "2.4.1");
        }
    }

    #[test]
    fn linux_release_haxe_4() {
        let linux = platform("linux", "x64");
        let neko = NekoAsset::for_haxe_version("4.0.5", linux, Mirrors::default());
        assert_eq!(neko.version(), "2.4.1");
        assert_eq!(neko.target(), "linux64");
        assert_eq!(
            neko.download_url(),
            concat!(
                "https://github.com/HaxeFoundation/neko/releases/download/",
                "v2-4-1/neko-2.4.1-linux64.tar.gz"
            )
        );

        let haxe = HaxeAsset::new("4.0.5", false, linux, Mirrors::default());
        let desc = haxe.descriptor();
        assert_eq!(haxe.target(), "linux64");
        assert_eq!(desc.archive_base_name, "haxe-4.0.5-linux64");
        assert_eq!(desc.archive_ext, ArchiveExt::TarGz);
        assert!(desc.is_nested);
        assert!(desc.cacheable);
        assert_eq!(
            desc.download_url,
            concat!(
                "https://github.com/HaxeFoundation/haxe/releases/download/",
                "4.0.5/haxe-4.0.5-linux64.tar.gz"
            )
        );
    }

    #[test]
    fn windows_haxe_3_uses_32_bit_builds() {
        let win = platform("win32", "x64");
        let haxe = HaxeAsset::new("3.4.7", false, win, Mirrors::default());
        assert_eq!(haxe.target(), "win");
        assert_eq!(haxe.archive_ext(), ArchiveExt::Zip);
        assert_eq!(haxe.file_name(), "haxe-3.4.7-win.zip");

        let neko = NekoAsset::for_haxe_version("3.4.7", win, Mirrors::default());
        assert_eq!(neko.target(), "win");
        assert_eq!(neko.file_name(), "neko-2.1.0-win.zip");
    }

    #[test]
    fn windows_haxe_4_uses_64_bit_builds() {
        let win = platform("win32", "x64");
        assert_eq!(HaxeAsset::new("4.3.6", false, win, Mirrors::default()).target(), "win64");
        assert_eq!(
            NekoAsset::for_haxe_version("4.3.6", win, Mirrors::default()).target(),
            "win64"
        );
    }

    #[test]
    fn osx_uses_universal_builds() {
        let mac = platform("darwin", "arm64");
        let neko = NekoAsset::for_haxe_version("4.3.6", mac, Mirrors::default());
        assert_eq!(neko.target(), "osx-universal");
        assert_eq!(neko.archive_base_name(), "neko-2.4.1-osx-universal");

        let old_neko = NekoAsset::for_haxe_version("3.4.7", mac, Mirrors::default());
        assert_eq!(old_neko.target(), "osx64");

        let haxe = HaxeAsset::new("4.3.6", false, mac, Mirrors::default());
        assert_eq!(haxe.target(), "osx");
        assert_eq!(haxe.file_name(), "haxe-4.3.6-osx.tar.gz");
    }

    #[test]
    fn nightly_urls_use_build_channels() {
        let cases = [
            (platform("darwin", "x64"), "mac", ".tar.gz"),
            (platform("linux", "x64"), "linux64", ".tar.gz"),
            (platform("win32", "x64"), "windows64", ".zip"),
        ];
        for (platform, channel, ext) in cases {
            let haxe = HaxeAsset::new(
                "2024-02-01_development_8b9c3a2",
                true,
                platform,
                Mirrors::default(),
            );
            assert_eq!(haxe.nightly_channel(), channel);
            assert_eq!(haxe.archive_base_name(), "haxe_2024-02-01_development_8b9c3a2");
            assert_eq!(
                haxe.download_url(),
                format!(
                    "https://build.haxe.org/builds/haxe/{}/{}{}",
                    channel, "haxe_2024-02-01_development_8b9c3a2", ext
                )
            );
        }
    }

    #[test]
    fn nightly_latest_is_not_cacheable() {
        let linux = platform("linux", "x64");
        assert!(!HaxeAsset::new("latest", true, linux, Mirrors::default()).is_cacheable());
        assert!(HaxeAsset::new("2024-02-01_development_8b9c3a2", true, linux, Mirrors::default())
            .is_cacheable());
    }

    #[test]
    fn mirrors_replace_hosts() {
        let mirrors = Mirrors {
            release_base: "file:///srv/mirror".into(),
            nightly_base: "file:///srv/nightly".into(),
        };
        let linux = platform("linux", "x64");
        assert_eq!(
            NekoAsset::for_haxe_version("4.0.5", linux, mirrors.clone()).download_url(),
            "file:///srv/mirror/neko/releases/download/v2-4-1/neko-2.4.1-linux64.tar.gz"
        );
        assert_eq!(
            HaxeAsset::new("latest", true, linux, mirrors).download_url(),
            "file:///srv/nightly/linux64/haxe_latest.tar.gz"
        );
    }

    #[test]
    fn archive_ext_from_file_name() {
        assert_eq!(ArchiveExt::from_file_name("a.tar.gz").unwrap(), ArchiveExt::TarGz);
        assert_eq!(ArchiveExt::from_file_name("a.zip").unwrap(), ArchiveExt::Zip);
        let err = ArchiveExt::from_file_name("a.tar.xz").unwrap_err();
        assert!(matches!(err, ToolchainError::UnknownArchiveExtension { ref ext } if ext == ".xz"));
    }
}
