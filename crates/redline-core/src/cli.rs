//! `redline` command line
//!
//! Read-only inspection of a project memory directory plus offline tools for
//! edit batches (conflict marking and redline rendering).

use crate::config::RedlineConfig;
use crate::error::{ConfigError, CoreError};
use crate::memory::ProjectMemory;
use clap::{Parser, Subcommand, ValueEnum};
use redline_composition::{
    render_redline, resolve_conflicts, ConflictStrategy, PairwiseResolver, RedlineFormat,
    SuggestedEdit, SweepResolver,
};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Contract review memory and redline tools
#[derive(Parser, Debug)]
#[command(name = "redline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "REDLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project memory directory (overrides the configuration)
    #[arg(long, global = true)]
    pub memory_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Version history of a project
    History {
        /// Project ID
        project: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Agent audit events of a project
    Events {
        /// Project ID
        project: String,
        /// Only events for this version
        #[arg(long = "version-id", id = "version_id")]
        version: Option<String>,
        /// Only events from this agent
        #[arg(long)]
        agent: Option<String>,
        /// Show at most the last N events
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Preferences recorded for one user
    Preferences {
        /// Project ID
        project: String,
        /// User or session ID
        user: String,
    },

    /// Render a redline document from contract text and a JSON edit batch
    Render {
        /// Contract text file
        text: PathBuf,
        /// JSON array of suggested edits with document offsets
        edits: PathBuf,
        /// html or markdown
        #[arg(short, long, default_value = "html")]
        format: RedlineFormat,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Mark overlapping edits in a JSON edit batch
    Resolve {
        /// JSON array of suggested edits
        edits: PathBuf,
        /// Detection strategy
        #[arg(long, value_enum, default_value_t = StrategyArg::Pairwise)]
        strategy: StrategyArg,
        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

/// Conflict detection strategy selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    /// Compare every pair within a clause
    Pairwise,
    /// Sort ranges and sweep
    Sweep,
}

impl StrategyArg {
    fn strategy(self) -> Box<dyn ConflictStrategy> {
        match self {
            Self::Pairwise => Box::new(PairwiseResolver),
            Self::Sweep => Box::new(SweepResolver),
        }
    }
}

/// Effective configuration: file (or defaults), environment, then flags
pub fn load_config(cli: &Cli) -> Result<RedlineConfig, CoreError> {
    let mut config = match &cli.config {
        Some(path) => RedlineConfig::load(path)?,
        None => {
            let mut config = RedlineConfig::default();
            config.apply_env();
            config
        }
    };
    if let Some(dir) = &cli.memory_dir {
        config.memory_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Run one subcommand, writing its output to `out`
pub fn execute(
    command: Commands,
    config: &RedlineConfig,
    out: &mut impl Write,
) -> Result<(), CoreError> {
    match command {
        Commands::History { project, json } => history(config, &project, json, out),
        Commands::Events {
            project,
            version,
            agent,
            limit,
            json,
        } => events(
            config,
            &project,
            version.as_deref(),
            agent.as_deref(),
            limit,
            json,
            out,
        ),
        Commands::Preferences { project, user } => preferences(config, &project, &user, out),
        Commands::Render {
            text,
            edits,
            format,
            output,
        } => {
            let text = std::fs::read_to_string(&text).map_err(|e| CoreError::io(&text, e))?;
            let edits = read_edits(&edits)?;
            let rendered = render_redline(&text, &edits, format)?;
            emit(output.as_deref(), &rendered, out)
        }
        Commands::Resolve {
            edits,
            strategy,
            output,
        } => {
            let mut edits = read_edits(&edits)?;
            let report = resolve_conflicts(strategy.strategy().as_ref(), &mut edits);
            tracing::info!(
                pairs = report.conflicting_pairs,
                edits_with_conflicts = report.edits_with_conflicts,
                "Marked conflicts"
            );
            emit(output.as_deref(), &serde_json::to_string_pretty(&edits)?, out)
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(config).map_err(ConfigError::from)?;
            write!(out, "{rendered}")?;
            Ok(())
        }
    }
}

fn open_memory(config: &RedlineConfig) -> Result<ProjectMemory, CoreError> {
    Ok(ProjectMemory::open(&config.memory_dir)?)
}

fn history(
    config: &RedlineConfig,
    project: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<(), CoreError> {
    let versions = open_memory(config)?.version_history(project)?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&versions)?)?;
        return Ok(());
    }
    for v in &versions {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            v.version_id,
            v.created_at.to_rfc3339(),
            v.checksum.get(..12).unwrap_or(&v.checksum),
            v.source,
            v.notes.as_deref().unwrap_or("-"),
        )?;
    }
    Ok(())
}

fn events(
    config: &RedlineConfig,
    project: &str,
    version: Option<&str>,
    agent: Option<&str>,
    limit: Option<usize>,
    json: bool,
    out: &mut impl Write,
) -> Result<(), CoreError> {
    let mut events: Vec<_> = open_memory(config)?
        .agent_events(project)?
        .into_iter()
        .filter(|e| version.map_or(true, |v| e.version_id == v))
        .filter(|e| agent.map_or(true, |a| e.agent == a))
        .collect();
    if let Some(limit) = limit {
        let skip = events.len().saturating_sub(limit);
        events.drain(..skip);
    }
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&events)?)?;
        return Ok(());
    }
    for e in &events {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            e.timestamp.to_rfc3339(),
            e.version_id,
            e.agent,
            e.action,
            e.payload
        )?;
    }
    Ok(())
}

fn preferences(
    config: &RedlineConfig,
    project: &str,
    user: &str,
    out: &mut impl Write,
) -> Result<(), CoreError> {
    let prefs = open_memory(config)?.preferences(project, user)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&prefs)?)?;
    Ok(())
}

fn read_edits(path: &Path) -> Result<Vec<SuggestedEdit>, CoreError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

fn emit(output: Option<&Path>, content: &str, out: &mut impl Write) -> Result<(), CoreError> {
    match output {
        Some(path) => std::fs::write(path, content).map_err(|e| CoreError::io(path, e))?,
        None => writeln!(out, "{content}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::VersionRecord;
    use redline_composition::EditId;
    use chrono::Utc;
    use serde_json::json;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("redline").chain(args.iter().copied())).unwrap()
    }

    fn run(config: &RedlineConfig, args: &[&str]) -> String {
        let mut out = Vec::new();
        execute(parse(args).command, config, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = parse(&["history", "acme", "--memory-dir", "/tmp/m", "--json-logs"]);
        assert_eq!(cli.memory_dir.as_deref(), Some(Path::new("/tmp/m")));
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::History { ref project, json: false } if project == "acme"));
    }

    #[test]
    fn memory_dir_flag_overrides_config() {
        let cli = parse(&["--memory-dir", "elsewhere", "config"]);
        assert_eq!(load_config(&cli).unwrap().memory_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn history_and_filtered_events() {
        let dir = tempfile::tempdir().unwrap();
        let config = RedlineConfig::new().with_memory_dir(dir.path());
        let memory = ProjectMemory::open(dir.path()).unwrap();
        memory
            .record_version(
                "acme",
                VersionRecord {
                    version_id: "v1".into(),
                    source: "upload".into(),
                    checksum: "abcdef0123456789".into(),
                    created_at: Utc::now(),
                    notes: Some("first draft".into()),
                    diff_summary: None,
                    graph_snapshot: None,
                },
                Some("text"),
            )
            .unwrap();
        for agent in ["orchestrator", "reviewer", "editor"] {
            memory
                .log_event("acme", "v1", agent, "completed", json!({}))
                .unwrap();
        }

        let history = run(&config, &["history", "acme"]);
        assert!(history.starts_with("v1\t"));
        assert!(history.contains("\tabcdef012345\tupload\tfirst draft"));

        let events = run(&config, &["events", "acme", "--agent", "reviewer"]);
        assert_eq!(events.lines().count(), 1);
        assert!(events.contains("\treviewer\tcompleted"));

        let last = run(&config, &["events", "acme", "-n", "2"]);
        assert_eq!(last.lines().count(), 2);
        assert!(!last.contains("orchestrator"));
    }

    #[test]
    fn resolve_marks_conflicts_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("edits.json");
        let edits = vec![
            SuggestedEdit::new("c1", "f1").with_id("a").with_deletion(0, 10, "x"),
            SuggestedEdit::new("c1", "f2").with_id("b").with_deletion(5, 15, "y"),
        ];
        std::fs::write(&input, serde_json::to_string(&edits).unwrap()).unwrap();

        let out = run(
            &RedlineConfig::default(),
            &["resolve", input.to_str().unwrap(), "--strategy", "sweep"],
        );
        let resolved: Vec<SuggestedEdit> = serde_json::from_str(&out).unwrap();
        assert_eq!(resolved[0].conflicts_with, vec![EditId::from("b")]);
        assert_eq!(resolved[1].conflicts_with, vec![EditId::from("a")]);
    }

    #[test]
    fn render_markdown_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("contract.txt");
        let edits = dir.path().join("edits.json");
        let output = dir.path().join("redline.md");
        std::fs::write(&text, "Net 90 days").unwrap();
        let batch = vec![SuggestedEdit::new("c1", "f1")
            .with_deletion(4, 6, "90")
            .with_insertion(4, "30")];
        std::fs::write(&edits, serde_json::to_string(&batch).unwrap()).unwrap();

        let stdout = run(
            &RedlineConfig::default(),
            &[
                "render",
                text.to_str().unwrap(),
                edits.to_str().unwrap(),
                "--format",
                "md",
                "--output",
                output.to_str().unwrap(),
            ],
        );
        assert!(stdout.is_empty());
        let rendered = std::fs::read_to_string(&output).unwrap();
        assert!(rendered.contains("~~90~~"));
        assert!(rendered.contains("**30**"));
    }

    #[test]
    fn missing_edit_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let cli = parse(&["resolve", missing.to_str().unwrap()]);
        let mut out = Vec::new();
        let err = execute(cli.command, &RedlineConfig::default(), &mut out).unwrap_err();
        assert!(matches!(err, CoreError::Io { ref path, .. } if path == &missing));
    }

    #[test]
    fn invalid_config_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("redline.toml");
        std::fs::write(&file, "review_concurrency = 0").unwrap();
        let cli = parse(&["--config", file.to_str().unwrap(), "config"]);
        assert!(matches!(
            load_config(&cli).unwrap_err(),
            CoreError::Config(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn config_prints_toml() {
        let out = run(&RedlineConfig::default(), &["config"]);
        let parsed = RedlineConfig::from_toml_str(&out).unwrap();
        assert_eq!(parsed, RedlineConfig::default());
    }
}
