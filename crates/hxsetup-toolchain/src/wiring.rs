use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use hxsetup_util::step::StepCommands;
use tracing::info;

use crate::acquire::{Acquirer, ToolInstallation};
use crate::asset::{Asset, HaxeAsset, NekoAsset};
use crate::config::Mirrors;
use crate::error::Result;
use crate::platform::{Os, PlatformId};
use crate::process::{ProcessRunner, RunOptions};
use crate::version::RequestedVersion;

pub const NEKOPATH: &str = "NEKOPATH";
pub const LD_LIBRARY_PATH: &str = "LD_LIBRARY_PATH";
pub const HAXEPATH: &str = "HAXEPATH";
pub const HAXE_STD_PATH: &str = "HAXE_STD_PATH";

/// Search-path variables inherited from the surrounding environment.
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    pub path: Option<OsString>,
    pub ld_library_path: Option<OsString>,
}

impl HostEnv {
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os("PATH"),
            ld_library_path: std::env::var_os(LD_LIBRARY_PATH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub platform: PlatformId,
    pub neko: ToolInstallation,
    pub haxe: ToolInstallation,
    /// Platform token of the Haxe archive (`linux64`, `osx`, `win`, ...).
    pub haxe_target: String,
    pub haxelib_path: PathBuf,
}

/// Installs Neko then Haxe and makes both usable by later steps.
pub struct EnvironmentWiring<'a> {
    acquirer: &'a Acquirer<'a>,
    runner: &'a dyn ProcessRunner,
    commands: &'a dyn StepCommands,
    platform: PlatformId,
    mirrors: Mirrors,
    host_env: HostEnv,
}

impl<'a> EnvironmentWiring<'a> {
    pub fn new(
        acquirer: &'a Acquirer<'a>,
        runner: &'a dyn ProcessRunner,
        commands: &'a dyn StepCommands,
        platform: PlatformId,
        mirrors: Mirrors,
        host_env: HostEnv,
    ) -> Self {
        Self {
            acquirer,
            runner,
            commands,
            platform,
            mirrors,
            host_env,
        }
    }

    pub async fn setup(&self, request: &RequestedVersion) -> Result<SetupOutcome> {
        // haxelib runs on Neko, so Neko has to be wired before Haxe.
        let neko_asset =
            NekoAsset::for_haxe_version(&request.version, self.platform, self.mirrors.clone());
        let neko = self.acquirer.acquire(&neko_asset.descriptor()).await?;
        let ld_library_path = prepend_path(&neko.root, self.host_env.ld_library_path.as_ref())?;

        self.commands.add_path(&neko.root)?;
        info!("[neko] NEKOPATH = {}", neko.root.display());
        self.commands
            .export_variable(NEKOPATH, &neko.root.to_string_lossy())?;
        self.commands
            .export_variable(LD_LIBRARY_PATH, &ld_library_path.to_string_lossy())?;

        let haxe_asset = HaxeAsset::new(
            request.version.clone(),
            request.nightly,
            self.platform,
            self.mirrors.clone(),
        );
        let haxe = self.acquirer.acquire(&haxe_asset.descriptor()).await?;
        let std_path = haxe.root.join("std");

        self.commands.add_path(&haxe.root)?;
        info!("[haxe] HAXE_STD_PATH = {}", std_path.display());
        self.commands
            .export_variable(HAXEPATH, &haxe.root.to_string_lossy())?;
        self.commands
            .export_variable(HAXE_STD_PATH, &std_path.to_string_lossy())?;

        if self.platform.os == Os::Osx {
            patch_haxelib_rpath(self.runner, &haxe.root, &neko.root).await?;
        }

        let haxelib_path = haxe.root.join("lib");
        info!("[haxelib] setup start = {}", haxelib_path.display());
        let with_neko = prepend_path(&neko.root, self.host_env.path.as_ref())?;
        let search_path = prepend_path(&haxe.root, Some(&with_neko))?;
        let opts = RunOptions {
            ignore_return_code: false,
            env: vec![
                ("PATH".into(), search_path),
                (NEKOPATH.into(), neko.root.clone().into_os_string()),
                (LD_LIBRARY_PATH.into(), ld_library_path),
                (HAXEPATH.into(), haxe.root.clone().into_os_string()),
                (HAXE_STD_PATH.into(), std_path.into_os_string()),
            ],
        };
        self.runner
            .run(
                "haxelib",
                &["setup".to_string(), haxelib_path.to_string_lossy().to_string()],
                &opts,
            )
            .await?;

        Ok(SetupOutcome {
            platform: self.platform,
            neko,
            haxe,
            haxe_target: haxe_asset.target(),
            haxelib_path,
        })
    }
}

/// Adds the Neko root to the rpath of the bundled `haxelib` binary.
///
/// SIP strips `DYLD_*` variables, so `haxelib` cannot find `libneko.dylib` through the
/// environment. Returns `false` when `otool` already lists the Neko root.
pub async fn patch_haxelib_rpath(
    runner: &dyn ProcessRunner,
    haxe_root: &Path,
    neko_root: &Path,
) -> Result<bool> {
    info!("[neko] fixing dylib paths");
    let haxelib_bin = haxe_root.join("haxelib").to_string_lossy().to_string();
    let neko_root = neko_root.to_string_lossy().to_string();

    let load_commands = runner
        .run(
            "otool",
            &["-l".to_string(), haxelib_bin.clone()],
            &RunOptions::default(),
        )
        .await?;
    if load_commands.stdout.contains(&neko_root) {
        info!("[neko] rpath already patched");
        return Ok(false);
    }

    info!("[neko] patching rpath for {haxelib_bin}");
    runner
        .run(
            "install_name_tool",
            &["-add_rpath".to_string(), neko_root, haxelib_bin],
            &RunOptions::default(),
        )
        .await?;
    Ok(true)
}

fn prepend_path(dir: &Path, existing: Option<&OsString>) -> Result<OsString> {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(existing) = existing.filter(|value| !value.is_empty()) {
        entries.extend(std::env::split_paths(existing));
    }
    std::env::join_paths(entries)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err).into())
}
