//! svnharvest CLI - poll and harvest Subversion repositories
//!
//! Usage:
//!   svnharvest entries [--since TS | --since-file FILE] PATH...   New entries since a checkpoint
//!   svnharvest log [--first REV --last REV] PATH...               Revision history
//!   svnharvest export PATH INTO                                   Export, printing files as they arrive
//!   svnharvest init [DIR]                                         Write a default .harvest/config.toml
//!
//! Exit codes:
//!   0  success
//!   1  at least one path failed
//!   2  bad invocation (unparseable timestamp, usage errors)

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use harvest_core::{Entry, HarvestConfig, LogElement};
use harvest_svn::{since, Repository, SvnCommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "svnharvest")]
#[command(author, version, about = "Poll and harvest Subversion repositories")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to .harvest/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Replace an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// List entries committed after a checkpoint
    Entries {
        /// Repository to check
        #[arg(long)]
        repository: Option<String>,

        /// Checkpoint timestamp (RFC 3339 unless --since-format is given)
        #[arg(long)]
        since: Option<String>,

        /// Use the modification time of this file as checkpoint; takes precedence over --since
        #[arg(long, value_name = "FILE")]
        since_file: Option<PathBuf>,

        /// chrono format string for --since, e.g. "%Y-%m-%d %H:%M:%S"
        #[arg(long, value_name = "FORMAT", requires = "since")]
        since_format: Option<String>,

        /// Paths relative to the repository
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show the revision history of paths
    Log {
        /// Repository to read
        #[arg(long)]
        repository: Option<String>,

        /// First revision of the range
        #[arg(long, requires = "last")]
        first: Option<String>,

        /// Last revision of the range
        #[arg(long, requires = "first")]
        last: Option<String>,

        /// Paths relative to the repository
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Export a path into a local directory
    Export {
        /// Repository to export from
        #[arg(long)]
        repository: Option<String>,

        /// Path relative to the repository
        path: String,

        /// Local destination directory
        into: PathBuf,
    },
}

/// Invocation problem that maps to exit code 2
#[derive(Debug, Error)]
#[error("{0}")]
struct UsageError(String);

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let output = Output { json: cli.json };
    let config_file = cli.config;
    let config = || load_config(config_file.as_deref());

    let result = match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| true),
        Commands::Entries {
            repository,
            since: since_arg,
            since_file,
            since_format,
            paths,
        } => {
            cmd_entries(
                &config()?,
                output,
                repository,
                since_arg,
                since_file,
                since_format,
                paths,
            )
            .await
        }
        Commands::Log {
            repository,
            first,
            last,
            paths,
        } => cmd_log(&config()?, output, repository, first.zip(last), paths).await,
        Commands::Export {
            repository,
            path,
            into,
        } => cmd_export(&config()?, output, cli.verbose, repository, path, into).await,
    };

    match result {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::from(1)),
        Err(e) if e.is::<UsageError>() => {
            error!("{:#}", e);
            Ok(ExitCode::from(2))
        }
        Err(e) => Err(e),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    let config_path = path.join(".harvest/config.toml");
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to replace it)",
            config_path.display()
        );
    }

    HarvestConfig::write_default(path)
        .with_context(|| format!("Failed to initialize {}", path.display()))?;
    info!("Initialized svnharvest in {:?}", path);
    println!("Created {}", config_path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    let config = match path {
        Some(path) => HarvestConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().context("Cannot determine current directory")?;
            HarvestConfig::load_or_default(&cwd)?
        }
    };
    Ok(config)
}

fn open_repository(config: &HarvestConfig, repository: Option<String>) -> Result<Repository> {
    let location = repository.unwrap_or_else(|| config.repository.clone());
    let executor = SvnCommand::from_config(&config.svn);
    Repository::with_executor(location, executor)
        .map_err(|e| UsageError(e.to_string()).into())
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

async fn cmd_entries(
    config: &HarvestConfig,
    output: Output,
    repository: Option<String>,
    since_arg: Option<String>,
    since_file: Option<PathBuf>,
    since_format: Option<String>,
    paths: Vec<String>,
) -> Result<bool> {
    let repo = open_repository(config, repository)?;

    // Prefer since_file over since
    let cutoff = match (since_file, since_arg) {
        (Some(file), _) => file_mtime(&file)?,
        (None, Some(value)) => parse_since(&value, since_format.as_deref())?,
        (None, None) => default_since(Utc::now(), config.since.lookback_hours)?,
    };
    info!(since = %cutoff.to_rfc3339(), "looking for new entries");

    let mut all_ok = true;
    for path in &paths {
        let entries = match repo.list(path, &mut tokio::io::sink()).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(path = %path, "error checking: {}", e);
                if let Some(tool_output) = e.output() {
                    debug!("svn said: {}", tool_output.trim_end());
                }
                all_ok = false;
                continue;
            }
        };

        let fresh = since(&entries, cutoff);
        debug!(path = %path, total = entries.len(), new = fresh.len(), "filtered listing");
        print_entries(output, &repo.full_path(path), &fresh)?;
    }

    Ok(all_ok)
}

async fn cmd_log(
    config: &HarvestConfig,
    output: Output,
    repository: Option<String>,
    range: Option<(String, String)>,
    paths: Vec<String>,
) -> Result<bool> {
    let repo = open_repository(config, repository)?;

    let mut all_ok = true;
    for path in &paths {
        let mut sink = tokio::io::sink();
        let result = match &range {
            Some((first, last)) => repo.log_by_range(path, &mut sink, first, last).await,
            None => repo.log(path, &mut sink).await,
        };

        match result {
            Ok(log) => print_log(output, &repo.full_path(path), &log)?,
            Err(e @ harvest_core::HarvestError::InvalidArgument(_)) => {
                return Err(UsageError(e.to_string()).into());
            }
            Err(e) => {
                error!(path = %path, "error checking: {}", e);
                all_ok = false;
            }
        }
    }

    Ok(all_ok)
}

async fn cmd_export(
    config: &HarvestConfig,
    output: Output,
    verbose: bool,
    repository: Option<String>,
    path: String,
    into: PathBuf,
) -> Result<bool> {
    let repo = open_repository(config, repository)?;
    let (tx, mut rx) = mpsc::channel::<String>(config.export.channel_capacity);

    let printer = tokio::spawn(async move {
        while let Some(file) = rx.recv().await {
            if output.json {
                println!("{}", serde_json::json!({ "exported": file }));
            } else {
                println!("{}", file);
            }
        }
    });

    // Tool output is only interesting when debugging
    let mut sink: Box<dyn AsyncWrite + Unpin + Send> = if verbose {
        Box::new(tokio::io::stderr())
    } else {
        Box::new(tokio::io::sink())
    };

    let result = repo.export(&path, &into, &mut sink, tx).await;
    printer.await.context("Notification printer failed")?;

    match result {
        Ok(summary) => {
            info!(
                files = summary.files,
                revision = summary.revision.as_deref().unwrap_or("unknown"),
                "export finished"
            );
            if output.json {
                println!("{}", serde_json::to_string(&summary)?);
            }
            Ok(true)
        }
        Err(e @ harvest_core::HarvestError::InvalidArgument(_)) => {
            Err(UsageError(e.to_string()).into())
        }
        Err(e) => {
            error!(path = %path, "error exporting: {}", e);
            Ok(false)
        }
    }
}

fn print_entries(output: Output, url: &str, entries: &[Entry]) -> Result<()> {
    for entry in entries {
        if output.json {
            println!(
                "{}",
                serde_json::json!({ "url": url, "entry": serde_json::to_value(entry)? })
            );
        } else {
            println!(
                "r{}\t{}\t{}\t{}\t{}/{}",
                entry.commit.revision,
                entry.commit.date.to_rfc3339(),
                entry.commit.author,
                entry.kind,
                url,
                entry.name
            );
        }
    }
    Ok(())
}

fn print_log(output: Output, url: &str, log: &LogElement) -> Result<()> {
    if output.json {
        println!(
            "{}",
            serde_json::json!({ "url": url, "log": serde_json::to_value(log)? })
        );
        return Ok(());
    }

    for entry in &log.entries {
        println!("r{} | {} | {}", entry.revision, entry.author, entry.date);
        for path in &entry.paths {
            println!("   {} {} ({})", path.action, path.path, path.kind);
        }
    }
    Ok(())
}

/// Checkpoint used when none is given: `lookback_hours` before `now`
fn default_since(now: DateTime<Utc>, lookback_hours: i64) -> Result<DateTime<Utc>> {
    Duration::try_hours(lookback_hours)
        .and_then(|lookback| now.checked_sub_signed(lookback))
        .ok_or_else(|| {
            UsageError(format!("lookback of {} hours is out of range", lookback_hours)).into()
        })
}

/// Parse a checkpoint timestamp.
///
/// Without a format the value must be RFC 3339. A format may carry an
/// offset (`%z`); if it does not, the value is taken as UTC.
fn parse_since(value: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    let parsed = match format {
        None => DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .ok(),
        Some(format) => DateTime::parse_from_str(value, format)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
            .or_else(|| {
                NaiveDate::parse_from_str(value, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
    };

    parsed.ok_or_else(|| {
        UsageError(format!(
            "cannot parse timestamp '{}' with format '{}'",
            value,
            format.unwrap_or("RFC 3339")
        ))
        .into()
    })
}

fn file_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| {
            UsageError(format!(
                "cannot determine timestamp of file {}: {}",
                path.display(),
                e
            ))
        })?;
    Ok(DateTime::<Utc>::from(modified))
}
