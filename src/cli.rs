use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use jobcache_model::Structural;
use jobcache_utils::init_logging;
use tracing::debug;

use crate::cache::persist::{self, CacheSnapshot, FileAdapter, PersistenceAdapter};
use crate::cache::{CacheConfig, Chunk, default_cache_file};

#[derive(Parser, Debug)]
#[command(name = "jobcache", version, about = "Inspect and maintain persisted job caches")]
pub struct JobCacheCli {
    #[arg(long, global = true)]
    /// YAML cache configuration; its persistence target is the default file.
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl JobCacheCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Prints the chunks, slots and mappings held in a cache file.
    Inspect { path: Option<PathBuf> },
    /// Checks every chunk of a cache file against its mapping invariants.
    Verify { path: Option<PathBuf> },
    /// Deletes a cache file.
    Clear { path: Option<PathBuf> },
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = JobCacheCli::parse();
    match &cli.command {
        Command::Inspect { path } => handle_inspect(&resolve_path(&cli, path.as_deref())?),
        Command::Verify { path } => handle_verify(&resolve_path(&cli, path.as_deref())?),
        Command::Clear { path } => handle_clear(&resolve_path(&cli, path.as_deref())?),
    }
}

fn resolve_path(cli: &JobCacheCli, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let config = match &cli.config {
        Some(file) => CacheConfig::from_yaml_file(file)?,
        None => CacheConfig::default(),
    }
    .with_env_overrides()?;

    match config.persistence_target {
        Some(path) => Ok(path),
        None => default_cache_file(),
    }
}

fn load_snapshot(path: &Path) -> Result<Option<CacheSnapshot>> {
    let Some(bytes) = FileAdapter::new(path).load()? else {
        return Ok(None);
    };
    debug!(path = %path.display(), bytes = bytes.len(), "decoding cache file");
    let snapshot = persist::decode(&bytes)
        .with_context(|| format!("cache file {} is not usable", path.display()))?;
    Ok(Some(snapshot))
}

fn handle_inspect(path: &Path) -> Result<()> {
    let Some(snapshot) = load_snapshot(path)? else {
        println!("{} {}", "empty".yellow().bold(), path.display());
        return Ok(());
    };

    println!(
        "{} {} (saved {})",
        "cache".green().bold(),
        path.display(),
        snapshot.saved_at.to_rfc3339()
    );
    for (index, chunk) in snapshot.chunks.iter().enumerate() {
        match chunk {
            Some(chunk) => print_chunk(index, chunk),
            None => println!("{:>8} {}", format!("#{index}"), "absent".dimmed()),
        }
    }
    Ok(())
}

fn print_chunk(index: usize, chunk: &Chunk) {
    println!(
        "{:>8} backend={} slots={}",
        format!("#{index}").bold(),
        chunk.job.backend,
        chunk.slot_count()
    );
    for (slot, (sub_job, mapping)) in chunk.job.sub_jobs.iter().zip(&chunk.mappings).enumerate() {
        let markers = sub_job
            .instructions
            .iter()
            .filter(|inst| inst.tag().is_marker())
            .count();
        let key = chunk
            .keys
            .get(slot)
            .and_then(|k| k.as_str().get(..8))
            .unwrap_or("-");
        println!(
            "{:>12} {:<16} instructions={:<5} mapped={:<5} markers={:<3} key={key}",
            format!("slot {slot}"),
            sub_job.name,
            sub_job.instructions.len(),
            mapping.len(),
            markers,
        );
    }
}

fn handle_verify(path: &Path) -> Result<()> {
    match load_snapshot(path)? {
        Some(snapshot) => {
            let chunks = snapshot.chunks.iter().flatten().count();
            println!("{} {} chunks valid", "ok".green().bold(), chunks);
        }
        None => println!("{} {}", "empty".yellow().bold(), path.display()),
    }
    Ok(())
}

fn handle_clear(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => println!("{} {}", "removed".green().bold(), path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            println!("{} {}", "empty".yellow().bold(), path.display());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to remove {}", path.display()));
        }
    }
    Ok(())
}
