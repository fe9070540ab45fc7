use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;

use android_collector::backup::decode_backup;
use android_collector::case::{IntegrityState, TargetOutcome};
use android_collector::cli::{Args, Commands};
use android_collector::config::{load_or_create_config, EngineConfig};
use android_collector::engine::Engine;
use android_collector::error::AcquisitionError;
use android_collector::security::{safe_entry_path, validate_output_path};
use android_collector::timeline::EXPORT_TIME_FORMAT;
use android_collector::transport::AdbTransport;
use android_collector::utils::hash::calculate_sha256;

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    match &args.command {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            EngineConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
        Commands::Decode { input, output } => decode_container(input, output),
        command => {
            let config = load_config(&args)?;
            let runtime = Runtime::new().context("Failed to start async runtime")?;
            runtime.block_on(run_command(command, config))
        }
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(log_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)
        .context("Failed to initialize logger")?;
    Ok(())
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = load_or_create_config(args.config.as_deref())?;
    if let Some(root) = &args.evidence_root {
        config.evidence_root = root.clone();
    }
    if let Commands::Acquire { backup_timeout: Some(secs), .. } = &args.command {
        config.backup_timeout_secs = *secs;
    }
    config.validate()?;
    Ok(config)
}

fn with_hint(e: AcquisitionError) -> anyhow::Error {
    anyhow!("{} (hint: {})", e, e.remediation_hint())
}

async fn run_command(command: &Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Acquire { case_id, adb, serial, no_timeline, .. } => {
            let mut transport = match adb {
                Some(path) => AdbTransport::with_path(path, config.command_timeout()),
                None => AdbTransport::new(config.command_timeout()),
            };
            if let Some(serial) = serial {
                transport = transport.with_serial(serial);
            }
            info!("Using adb at {}", transport.adb_path().display());

            let engine = Engine::new(Arc::new(transport), config);
            acquire(&engine, case_id).await?;
            if !no_timeline {
                let path = engine.export_timeline(case_id, None)?;
                info!("Timeline written to {}", path.display());
            }
            Ok(())
        }
        Commands::Summary { case_id, json } => {
            let engine = offline_engine(config);
            let summary = engine.case_summary(case_id).map_err(|e| anyhow!("{} (hint: {})", e, e.remediation_hint()))?;
            if *json {
                println!("{}", summary.to_json()?);
                return Ok(());
            }

            println!("Case {} (created {})", summary.case_id, summary.created_at.format(EXPORT_TIME_FORMAT));
            println!("Runs: {}, artifacts: {}, attempts: {}", summary.runs.len(), summary.artifacts.len(), summary.attempts.len());
            for target in &summary.targets {
                let outcome = match target.outcome {
                    TargetOutcome::Acquired => "acquired",
                    TargetOutcome::AcquiredEmpty => "acquired (no records)",
                    TargetOutcome::Failed => "FAILED",
                    TargetOutcome::Skipped => "skipped",
                };
                println!("  {:<16} {:<22} {} attempt(s)", target.kind.name(), outcome, target.attempts);
            }
            for note in &summary.warnings {
                println!("warning: {}", note.message);
            }
            for note in &summary.errors {
                match &note.hint {
                    Some(hint) => println!("error: {} (hint: {})", note.message, hint),
                    None => println!("error: {}", note.message),
                }
            }
            Ok(())
        }
        Commands::Verify { case_id, json } => {
            let engine = offline_engine(config);
            let report = engine.verification_report(case_id)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?);
            } else {
                for check in &report.artifacts {
                    println!(
                        "{:<16} {:<14} {:<10} {}",
                        check.kind.name(),
                        format!("{:?}", check.status),
                        format!("{:?}", check.integrity),
                        check.path.display()
                    );
                    if let Some(failure) = &check.failure {
                        println!("  {}", failure);
                    }
                    for warning in &check.findings.warnings {
                        println!("  warning: {}", warning);
                    }
                }
                for backup in &report.backups {
                    println!("{:<16} {:<14} {:<10} {}", "backup", backup.package, format!("{:?}", backup.integrity), backup.path.display());
                }
                for path in &report.untracked_files {
                    println!("untracked: {}", path.display());
                }
            }
            if !report.is_intact() {
                bail!(
                    "case {} failed the integrity check: {} modified or missing, {} untracked",
                    case_id,
                    report.tampered_count(),
                    report.untracked_files.len()
                );
            }
            let not_hashed = report.artifacts.iter().filter(|a| a.integrity == IntegrityState::NotHashed).count();
            info!("All hashed evidence intact ({} artifacts without digest)", not_hashed);
            Ok(())
        }
        Commands::Timeline { case_id, search, json } => {
            let engine = offline_engine(config);
            let timeline = engine.build_timeline(case_id)?;
            let records = match search {
                Some(needle) => timeline.search(needle),
                None => timeline.records.iter().collect(),
            };
            if *json {
                println!("{}", serde_json::to_string_pretty(&records).context("Failed to serialize timeline")?);
                return Ok(());
            }
            for record in &records {
                let when = record
                    .timestamp
                    .map(|t| t.format(EXPORT_TIME_FORMAT).to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<19}  {:<15} {}", when, record.kind.name(), record.summary());
            }
            info!("{} of {} records shown", records.len(), timeline.len());
            Ok(())
        }
        Commands::Export { case_id, output } => {
            if let Some(path) = output {
                validate_output_path(path)?;
            }
            let engine = offline_engine(config);
            let path = engine.export_timeline(case_id, output.as_deref())?;
            info!("Timeline written to {}", path.display());
            Ok(())
        }
        Commands::Cases => {
            let engine = offline_engine(config);
            for case in engine.list_cases()? {
                println!("{}", case);
            }
            Ok(())
        }
        Commands::InitConfig { .. } | Commands::Decode { .. } => Ok(()),
    }
}

/// Engine for commands that only read the case store
fn offline_engine(config: EngineConfig) -> Engine {
    let transport = AdbTransport::with_path("adb", config.command_timeout());
    Engine::new(Arc::new(transport), config)
}

async fn acquire(engine: &Engine, case_id: &str) -> Result<()> {
    let mut run = engine.start_acquisition(case_id).map_err(with_hint)?;
    info!("Run {} started for case {}", run.run_id(), case_id);

    let token = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current target");
            token.cancel();
        }
    });

    while let Some(event) = run.next_event().await {
        info!("[{:>3}%] {}", event.percent, event.message);
    }

    let report = run.wait().await.map_err(with_hint)?;
    info!(
        "Run finished ({:?}): {} of {} targets acquired",
        report.status,
        report.acquired(),
        report.targets.len()
    );
    if !report.permission_denied.is_empty() {
        let names: Vec<&str> = report.permission_denied.iter().map(|k| k.name()).collect();
        warn!("Direct copy refused for: {}", names.join(", "));
    }
    Ok(())
}

/// Extract every entry of a container file, skipping entry names that
/// would escape the output directory
fn decode_container(input: &Path, output: &Path) -> Result<()> {
    validate_output_path(output)?;
    let data = fs::read(input).context(format!("Failed to read {}", input.display()))?;
    info!("SHA-256 of {}: {}", input.display(), calculate_sha256(input)?);

    let decoded = decode_backup(&data).map_err(|e| anyhow!("{} (hint: {})", e, e.remediation_hint()))?;
    info!(
        "Container version {} ({})",
        decoded.header.version,
        if decoded.header.compressed { "compressed" } else { "stored" }
    );

    let mut written = 0;
    for entry in &decoded.entries {
        let relative = match safe_entry_path(&entry.path) {
            Some(relative) => relative,
            None => {
                warn!("Skipping unsafe entry name {}", entry.path);
                continue;
            }
        };
        let target = output.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&target, &entry.data).context(format!("Failed to write {}", target.display()))?;
        written += 1;
    }
    info!("Extracted {} of {} entries to {}", written, decoded.entries.len(), output.display());

    if let Some(e) = decoded.error {
        bail!("container only partly decoded: {} (hint: {})", e, e.remediation_hint());
    }
    Ok(())
}
