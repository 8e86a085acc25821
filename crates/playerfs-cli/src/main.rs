//! playerfs command-line player.
//!
//! Usage:
//!   # Stage the namespace described by the default config and list it
//!   playerfs stage
//!
//!   # Print the runtime argument vector
//!   playerfs --config ./player.toml args
//!
//!   # Boot, add user files, and run the runtime
//!   playerfs run --add ~/roms/extra.nes
//!
//!   # Boot, add user files, and copy user data out
//!   playerfs export --out ./saved --add ~/roms/extra.nes

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use playerfs_kernel::{CommandRuntime, Composer, Launcher, Namespace, PlayerConfig, UploadBatch};

/// Compose, stage and run an emulator player filesystem.
#[derive(Parser, Debug)]
#[command(name = "playerfs")]
#[command(about = "Compose, stage and run an emulator player filesystem")]
struct Cli {
    /// Player configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose and stage the namespace, then list the staged files
    Stage,
    /// Print the runtime argument vector, one per line
    Args,
    /// Boot, upload files, and run the runtime
    Run {
        /// File to upload into the content directory (repeatable)
        #[arg(long = "add", value_name = "FILE")]
        add: Vec<PathBuf>,
    },
    /// Boot, upload files, and write all user data into a directory
    Export {
        /// Destination directory
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// File to upload into the content directory (repeatable)
        #[arg(long = "add", value_name = "FILE")]
        add: Vec<PathBuf>,
    },
}

fn subscriber()
-> impl tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span> + Send + Sync + 'static
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
}

#[cfg(feature = "telemetry")]
fn init_tracing() -> Option<playerfs_telemetry::OtelGuard> {
    let registry = subscriber();

    if playerfs_telemetry::otel_enabled() {
        match playerfs_telemetry::otel_layer("playerfs") {
            Ok((otel_layer, guard)) => {
                registry.with(otel_layer).init();
                return Some(guard);
            }
            Err(e) => eprintln!("OTel exporter setup failed, continuing without it: {e}"),
        }
    }
    registry.init();
    None
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing() {
    subscriber().init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _otel_guard = init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = PlayerConfig::load(&config_path)
        .await
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(core) = &config.core {
        info!(core = %core, content = %config.content, "player configured");
    }

    match cli.command {
        Command::Stage => cmd_stage(&config).await,
        Command::Args => {
            for arg in config.layout().runtime_args().iter() {
                println!("{arg}");
            }
            Ok(())
        }
        Command::Run { add } => cmd_run(&config, &add).await,
        Command::Export { out, add } => cmd_export(&config, &out, &add).await,
    }
}

fn default_config_path() -> Result<PathBuf> {
    let Some(dir) = dirs::config_dir() else {
        bail!("no config directory on this platform; pass --config");
    };
    Ok(dir.join("playerfs").join("player.toml"))
}

/// Compose and stage without a runtime.
async fn boot_namespace(config: &PlayerConfig) -> Result<(Composer, Namespace)> {
    let composer = config.composer();
    let mounts = config.build_mounts().await.context("building mounts")?;
    let ns = composer.compose(mounts)?;
    composer.stage(&ns, &config.layout().manifest()).await?;
    Ok((composer, ns))
}

async fn cmd_stage(config: &PlayerConfig) -> Result<()> {
    let (_, ns) = boot_namespace(config).await?;
    for mount in ns.mounts() {
        let mode = if mount.read_only { "ro" } else { "rw" };
        println!("mount  {} ({mode})", mount.path.display());
    }
    for entry in &config.layout().manifest() {
        println!("staged {}", entry.destination.display());
    }
    Ok(())
}

async fn cmd_run(config: &PlayerConfig, add: &[PathBuf]) -> Result<()> {
    config
        .require_local_roots()
        .context("the runtime runs as a separate process")?;

    let layout = config.layout();
    let composer = config.composer();
    let mounts = config.build_mounts().await.context("building mounts")?;

    let launcher = Launcher::new(CommandRuntime::new(&config.runtime.program));
    let ns = launcher.boot(&composer, mounts, &layout.manifest()).await?;

    let files = read_uploads(add).await?;
    report_uploads(composer.upload_batch(&ns, files)).await;

    launcher.start(&layout.runtime_args()).await?;
    Ok(())
}

async fn cmd_export(config: &PlayerConfig, out: &Path, add: &[PathBuf]) -> Result<()> {
    let (composer, ns) = boot_namespace(config).await?;

    let files = read_uploads(add).await?;
    report_uploads(composer.upload_batch(&ns, files)).await;

    let exported = composer
        .export(&ns, &config.layout().userdata_root)
        .await
        .context("collecting user data")?;

    for file in &exported {
        let dest = out.join(&file.path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&dest, &file.contents)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;
        println!("{}", dest.display());
    }
    Ok(())
}

/// Read each file from disk, keyed by its leaf name.
async fn read_uploads(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = path.file_name() else {
            bail!("{} has no file name", path.display());
        };
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        files.push((name.to_string_lossy().into_owned(), data));
    }
    Ok(files)
}

/// Print each upload as it completes. Failures are reported, not fatal.
async fn report_uploads(mut batch: UploadBatch) {
    while let Some(outcome) = batch.next().await {
        match outcome.result {
            Ok(path) => println!("uploaded {} -> {}", outcome.file_name, path.display()),
            Err(e) => warn!(file = %outcome.file_name, error = %e, "upload failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_uploads() {
        let cli = Cli::try_parse_from([
            "playerfs", "run", "--add", "a.nes", "--add", "b.nes", "--config", "p.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("p.toml")));
        match cli.command {
            Command::Run { add } => {
                assert_eq!(add, vec![PathBuf::from("a.nes"), PathBuf::from("b.nes")])
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_export_requires_out() {
        assert!(Cli::try_parse_from(["playerfs", "export"]).is_err());
    }

    #[tokio::test]
    async fn test_read_uploads_uses_leaf_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extra.nes");
        std::fs::write(&path, b"NES").unwrap();

        let files = read_uploads(&[path]).await.unwrap();
        assert_eq!(files, vec![("extra.nes".to_string(), b"NES".to_vec())]);
    }

    #[tokio::test]
    async fn test_export_writes_user_data() {
        let content = tempfile::tempdir().unwrap();
        std::fs::write(content.path().join("retroarch.cfg"), b"X=1").unwrap();
        std::fs::write(content.path().join("game.nes"), b"NES").unwrap();
        let upload = content.path().join("extra.nes");
        std::fs::write(&upload, b"EXTRA").unwrap();

        let config = PlayerConfig::from_toml(&format!(
            "content = \"game.nes\"\n[content_source]\nkind = \"local\"\nroot = \"{}\"\nread_only = true\n",
            content.path().display()
        ))
        .unwrap();

        let out = tempfile::tempdir().unwrap();
        cmd_export(&config, out.path(), &[upload]).await.unwrap();

        assert_eq!(std::fs::read(out.path().join("retroarch.cfg")).unwrap(), b"X=1");
        assert_eq!(
            std::fs::read(out.path().join("content/extra.nes")).unwrap(),
            b"EXTRA"
        );
    }

    #[tokio::test]
    async fn test_run_requires_local_userdata() {
        let content = tempfile::tempdir().unwrap();
        std::fs::write(content.path().join("retroarch.cfg"), b"X=1").unwrap();
        std::fs::write(content.path().join("game.nes"), b"NES").unwrap();

        let config = PlayerConfig::from_toml(&format!(
            "content = \"game.nes\"\n[runtime]\nprogram = \"sh\"\n[content_source]\nkind = \"local\"\nroot = \"{}\"\nread_only = true\n",
            content.path().display()
        ))
        .unwrap();

        let err = cmd_run(&config, &[]).await.unwrap_err();
        assert!(format!("{err:#}").contains("userdata must be a local directory"), "{err:#}");
    }
}
