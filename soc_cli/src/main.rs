mod cli;
mod error_fmt;
mod estimator;
mod rt;

use clap::Parser;
use eyre::WrapErr;
use soc_config::BusBackend;
use soc_core::{ShutdownFlag, SocError};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, LoopArgs};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::estimator::{RunRequest, load_model, print_summary, run_estimator, summary_json};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(err) = real_main(cli) {
        tracing::debug!(error = ?err, "run failed");
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = load_config(&cli.config)?;
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let tables_dir = cli.tables.clone().unwrap_or_else(|| cfg.tables.dir.clone());

    let shutdown = ShutdownFlag::new();
    {
        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.raise();
        })
        .wrap_err("installing ctrl-c handler")?;
    }

    match &cli.cmd {
        Commands::SelfCheck => self_check(&cfg, &tables_dir, cli.json),
        Commands::Run { trace, opts } => run(
            &cfg,
            &tables_dir,
            cfg.bus.backend,
            trace.as_deref(),
            opts,
            cli.json,
            &shutdown,
        ),
        Commands::Simulate { trace, opts } => run(
            &cfg,
            &tables_dir,
            BusBackend::Sim,
            Some(trace.as_path()),
            opts,
            cli.json,
            &shutdown,
        ),
    }
}

fn load_config(path: &Path) -> eyre::Result<soc_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| SocError::Config(format!("reading {}", path.display())))?;
    let cfg = soc_config::load_toml(&text)
        .wrap_err_with(|| SocError::Config(format!("parsing {}", path.display())))?;
    cfg.validate()
        .wrap_err_with(|| SocError::Config(format!("validating {}", path.display())))?;
    Ok(cfg)
}

/// Console layer on stderr (pretty or JSON) plus an optional JSON file layer.
fn init_tracing(json: bool, level: &str, logging: &soc_config::Logging) -> eyre::Result<()> {
    use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

    // RUST_LOG wins over --log-level
    let console_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let console = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };

    let file = match &logging.file {
        Some(file) => {
            let path = PathBuf::from(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| {
                    SocError::Config(format!("logging.file '{file}' has no file name"))
                })?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))?;
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(file_filter)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("initialising tracing")?;
    Ok(())
}

fn self_check(cfg: &soc_config::Config, tables_dir: &Path, json: bool) -> eyre::Result<()> {
    let model = load_model(tables_dir)?;
    let temps = model.params.temperatures().len();
    tracing::info!(tables = %tables_dir.display(), temps, "self-check passed");
    if json {
        println!(
            "{}",
            serde_json::json!({
                "status": "ok",
                "par": cfg.pack.par,
                "ser": cfg.pack.ser,
                "temperature_columns": temps,
            })
        );
    } else {
        println!(
            "OK: {}x{} pack, {} temperature columns, tables in {}",
            cfg.pack.par,
            cfg.pack.ser,
            temps,
            tables_dir.display()
        );
    }
    Ok(())
}

fn run(
    cfg: &soc_config::Config,
    tables_dir: &Path,
    backend: BusBackend,
    trace: Option<&Path>,
    opts: &LoopArgs,
    json: bool,
    shutdown: &ShutdownFlag,
) -> eyre::Result<()> {
    let started = Instant::now();
    let req = RunRequest {
        cfg,
        tables_dir,
        backend,
        trace,
        opts,
    };
    let summary = run_estimator(&req, shutdown)?;
    if json {
        println!(
            "{}",
            summary_json(&summary, started.elapsed().as_millis() as u64)
        );
    } else {
        print_summary(&summary);
    }
    Ok(())
}
