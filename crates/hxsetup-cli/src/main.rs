use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hxsetup_cache::{DependencyCacheProtocol, DirArchiveStore};
use hxsetup_toolchain::{
    parse_version_input, resolve_platform, Acquirer, DirToolCache, EnvironmentWiring, HostEnv,
    HttpDownloader, SystemRunner, ToolchainConfig,
};
use hxsetup_util::step::{FileCommands, StepCommands};
use tracing::info;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "hxsetup", version, about = "Haxe + Neko toolchain setup for CI runners")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Install Neko and Haxe, wire the environment, and restore the haxelib cache
    Setup {
        /// Release version (`4.3.6`), nightly build token, or `latest`
        #[arg(long, env = "INPUT_HAXE_VERSION")]
        haxe_version: String,
        /// Newline-separated globs of dependency manifests; empty disables caching
        #[arg(long, env = "INPUT_CACHE_DEPENDENCY_PATH", default_value = "")]
        cache_dependency_path: String,
    },
    /// Save the haxelib cache recorded by `setup`
    Post {
        #[arg(long, env = "INPUT_CACHE_DEPENDENCY_PATH", default_value = "")]
        cache_dependency_path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = hxsetup_util::init_tracing() {
        eprintln!("{}", failure_message(err.as_ref()));
        return ExitCode::FAILURE;
    }
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", failure_message(err.as_ref()));
            ExitCode::FAILURE
        }
    }
}

/// The single line the runner surfaces when a step fails.
fn failure_message(err: &dyn std::error::Error) -> String {
    format!("Error: {err}")
}

async fn run(cli: Cli) -> CliResult<()> {
    let commands = FileCommands::from_env();
    match cli.cmd {
        Cmd::Setup {
            haxe_version,
            cache_dependency_path,
        } => {
            hxsetup_util::init_run_telemetry(
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                "setup",
            );
            setup(&commands, &haxe_version, &cache_dependency_path).await
        }
        Cmd::Post {
            cache_dependency_path,
        } => {
            hxsetup_util::init_run_telemetry(
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                "post",
            );
            let store = DirArchiveStore::from_env();
            let stage = DependencyCacheProtocol::new(&store, &commands)
                .save_dependencies(&cache_dependency_path)
                .await?;
            info!(?stage, "post step finished");
            Ok(())
        }
    }
}

async fn setup(
    commands: &dyn StepCommands,
    haxe_version: &str,
    cache_dependency_path: &str,
) -> CliResult<()> {
    commands.reset_state()?;
    let request = parse_version_input(haxe_version)?;
    let platform = resolve_platform()?;
    info!(%platform, version = %request.version, nightly = request.nightly, "resolved request");

    let config = ToolchainConfig::from_env();
    let cache = DirToolCache::new(&config.tool_cache_dir);
    let downloader = HttpDownloader::new(config.download_dir());
    let runner = SystemRunner;
    let acquirer = Acquirer::new(&cache, &downloader, &runner, config.staging_dir());
    let wiring = EnvironmentWiring::new(
        &acquirer,
        &runner,
        commands,
        platform,
        config.mirrors.clone(),
        HostEnv::from_env(),
    );
    let outcome = wiring.setup(&request).await?;

    let store = DirArchiveStore::from_env();
    let workspace = hxsetup_util::workspace_dir()?;
    let stage = DependencyCacheProtocol::new(&store, commands)
        .restore_dependencies(
            cache_dependency_path,
            &outcome.haxe_target,
            &request.version,
            &workspace,
            &outcome.haxelib_path,
        )
        .await?;
    info!(?stage, "setup finished");
    Ok(())
}
