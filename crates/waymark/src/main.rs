//! waymark CLI
//!
//! Inspects and manages the durable marker store that AR sessions write to.
//!
//! ```bash
//! waymark stats
//! waymark markers --event EVENT-A --json
//! waymark events
//! waymark export --out markers.json
//! waymark clear --yes
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use waymark_core::config::{Config, LogFormat, resolve_config_path};
use waymark_core::error::format_error_with_remediation;
use waymark_core::logging::{LogConfig, init_logging};
use waymark_core::marker::Marker;
use waymark_core::store::{JsonFileStore, MarkerStore, StoreSummary};

/// waymark - code-anchored AR marker store
#[derive(Parser, Debug)]
#[command(name = "waymark")]
#[command(author, version, about = "Inspect and manage code-anchored AR marker stores")]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (overrides WAYMARK_CONFIG and the platform default)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding marker documents
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Marker and event counts
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// List stored markers
    Markers {
        /// Only markers recorded under this event code
        #[arg(long, value_name = "ID")]
        event: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// List event codes with marker counts
    Events {
        #[arg(long)]
        json: bool,
    },

    /// Write the whole collection as JSON, in stored record format
    Export {
        /// Output file (stdout if omitted)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Delete every marker for every event
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(core) = err.downcast_ref::<waymark_core::Error>() {
                eprint!("{}", format_error_with_remediation(core));
            } else {
                eprintln!("Error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match resolve_config_path(cli.config.as_deref()) {
        Some(path) => Config::load_from(&path)?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = Some(dir.clone());
    }
    if let Some(level) = &cli.log_level {
        config.general.log_level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config.validate().map_err(waymark_core::Error::from)?;
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    init_logging(&LogConfig::from(&config.general)).context("failed to initialize logging")?;

    let mut store = JsonFileStore::from_config(&config.storage).map_err(waymark_core::Error::from)?;
    tracing::debug!(path = %store.document_path().display(), command = ?cli.command, "Running command");

    match cli.command {
        Commands::Stats { json } => {
            let summary = store.summary().map_err(waymark_core::Error::from)?;
            print_stats(&summary, store.document_path(), json)?;
        }
        Commands::Markers { event, json } => {
            let markers = match &event {
                Some(id) => store.markers_for_event(id),
                None => store.load_all_markers(),
            }
            .map_err(waymark_core::Error::from)?;
            print_markers(&markers, json)?;
        }
        Commands::Events { json } => {
            let summary = store.summary().map_err(waymark_core::Error::from)?;
            print_events(&summary, json)?;
        }
        Commands::Export { out } => {
            let markers = store.load_all_markers().map_err(waymark_core::Error::from)?;
            export(&markers, out.as_deref())?;
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to delete every marker without --yes");
            }
            let count = store
                .load_all_markers()
                .map_err(waymark_core::Error::from)?
                .len();
            store.clear_all_markers().map_err(waymark_core::Error::from)?;
            tracing::info!(removed = count, "Marker store cleared");
            println!("Removed {count} marker(s).");
        }
    }
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

#[derive(Serialize)]
struct StatsOutput<'a> {
    store: String,
    #[serde(flatten)]
    summary: &'a StoreSummary,
}

fn print_stats(summary: &StoreSummary, path: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        let out = StatsOutput {
            store: path.display().to_string(),
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!("Store:   {}", path.display());
    println!("Markers: {}", summary.marker_count);
    println!("Events:  {}", summary.event_count);
    Ok(())
}

fn print_markers(markers: &[Marker], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(markers)?);
        return Ok(());
    }
    if markers.is_empty() {
        println!("No markers.");
        return Ok(());
    }
    println!(
        "{:<24} {:<16} {:<32} {:<20} ROLE",
        "ID", "EVENT", "RELATIVE POSITION", "CREATED"
    );
    for marker in markers {
        let created = marker.created_at().map_or_else(
            || marker.created_at_ms.to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        println!(
            "{:<24} {:<16} {:<32} {:<20} {}",
            marker.id,
            marker.event_id,
            marker.relative_position.to_string(),
            created,
            marker.created_by
        );
    }
    Ok(())
}

fn print_events(summary: &StoreSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&summary.per_event)?);
        return Ok(());
    }
    if summary.per_event.is_empty() {
        println!("No events.");
        return Ok(());
    }
    for (event_id, count) in &summary.per_event {
        println!("{event_id}\t{count}");
    }
    Ok(())
}

fn export(markers: &[Marker], out: Option<&Path>) -> anyhow::Result<()> {
    let document = serde_json::to_string_pretty(markers)?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{document}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Exported {} marker(s) to {}", markers.len(), path.display());
        }
        None => println!("{document}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "waymark",
            "markers",
            "--event",
            "EVENT-A",
            "--data-dir",
            "/tmp/w",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/w")));
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Markers { event: Some(ref id), json: false } if id == "EVENT-A"
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["waymark", "--log-format", "xml", "stats"]).is_err());
    }
}
