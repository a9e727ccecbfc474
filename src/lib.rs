// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod gc;
pub mod journal;
pub mod logging;
pub mod resources;
pub mod serve;
pub mod store;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::cli::CliArgs;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::config::{default_config_path, load_from_path, load_or_default};
use crate::engine::{CoreOptions, JournalWriter, ManagerCore, ManagerEvent, ManagerHandle, Reply};
use crate::journal::Journal;

/// High-level entry point used by `main.rs`.
///
/// Loads config, recovers the journal into a fresh core, then serves client
/// requests from stdin until input ends or Ctrl-C arrives. Either way the
/// manager shuts down gracefully (final collection, pool teardown, pending
/// journal writes flushed).
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;
    let journal = Journal::new(&cfg.manager.state_dir).with_retries(cfg.journal.commit_retries);

    let recovered = journal
        .recover_all()
        .with_context(|| format!("recovering journal at {}", journal.root().display()))?;
    let (core, normalization_ops) = ManagerCore::from_recovered(recovered, core_options(&cfg))?;

    if args.check {
        print_check(&cfg, &core, normalization_ops.len());
        return Ok(());
    }

    let (mut writer, fatal_rx) = JournalWriter::new(journal, cfg.journal.max_concurrent_writes);
    if !normalization_ops.is_empty() {
        info!(ops = normalization_ops.len(), "journaling recovery clean-up");
        let (tx, rx) = tokio::sync::oneshot::channel();
        writer.submit(normalization_ops, Ok(Reply::Ack), Some(tx));
        rx.await.context("journal writer dropped recovery clean-up")??;
    }

    let (handle, runtime) = ManagerHandle::spawn(core, writer, fatal_rx, cfg.sweep_interval());

    // Ctrl-C -> graceful shutdown.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            if handle.notify(ManagerEvent::Shutdown).await.is_err() {
                warn!("manager already stopped");
            }
        });
    }

    // Client requests on stdin; end of input shuts down.
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = serve::serve_lines(&handle, stdin, tokio::io::stdout()).await {
                warn!(error = %e, "client front end stopped");
            }
            let _ = handle.notify(ManagerEvent::Shutdown).await;
        });
    }
    drop(handle);

    runtime.await.context("manager runtime panicked")??;
    Ok(())
}

/// Config file (explicit path, or the default path if present) with CLI
/// overrides applied, then validated.
pub fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let raw = match &args.config {
        Some(path) => load_from_path(path).with_context(|| format!("loading config {path}"))?,
        None => load_or_default(default_config_path())?,
    };
    let raw = apply_overrides(raw, args);
    Ok(ConfigFile::try_from(raw)?)
}

fn apply_overrides(mut raw: RawConfigFile, args: &CliArgs) -> RawConfigFile {
    if let Some(dir) = &args.state_dir {
        raw.manager.state_dir = PathBuf::from(dir);
    }
    if let Some(devices) = args.devices {
        raw.manager.devices = devices;
    }
    if let Some(method) = args.gc {
        raw.gc.method = method;
    }
    raw
}

pub fn core_options(cfg: &ConfigFile) -> CoreOptions {
    CoreOptions {
        devices: cfg.manager.devices,
        gc_method: cfg.gc.method,
        capacity_bytes: cfg.gc.capacity_bytes,
        threshold_bytes: cfg.gc.threshold_bytes,
    }
}

fn print_check(cfg: &ConfigFile, core: &ManagerCore, pending_ops: usize) {
    println!("swarmstate check");
    println!("  state_dir = {}", cfg.manager.state_dir.display());
    println!("  devices = {}", cfg.manager.devices);
    println!("  gc.method = {}", cfg.gc.method);
    println!();

    let store = core.store();
    println!("files ({}):", store.file_count());
    for file in store.files() {
        println!("  - {} {} size={}", file.file_id, file.state, file.size);
    }
    println!("tasks ({}):", store.task_count());
    for task in store.tasks() {
        println!("  - {} {} {}", task.task_id, task.state, task.command);
    }
    if pending_ops > 0 {
        println!();
        println!("{pending_ops} record(s) would be rewritten by recovery clean-up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GcMethod;
    use clap::Parser;

    #[test]
    fn cli_overrides_beat_file_values() {
        let raw: RawConfigFile =
            toml::from_str("[manager]\ndevices = 2\nstate_dir = \"a\"\n[gc]\nmethod = \"force\"").unwrap();
        let args = CliArgs::try_parse_from(["swarmstate", "--devices", "8", "--gc", "none"]).unwrap();
        let raw = apply_overrides(raw, &args);
        assert_eq!(raw.manager.devices, 8);
        assert_eq!(raw.manager.state_dir, PathBuf::from("a"));
        assert_eq!(raw.gc.method, GcMethod::None);
    }
}
