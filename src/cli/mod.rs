//! CLI surface for mdsync.
//!
//! One entry point: parse the markdown epic, compare it to the remote tree,
//! print or apply the resulting plan. Dry-run is the default; mutation is
//! opt-in via `--execute`.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::config::Config;
use crate::core::IssueKey;
use crate::exec::{Answer, Confirmer, ExecMode, Executor, export_snapshot};
use crate::plan::{Phase, PlanOptions, SyncOperation, TransitionGraph};
use crate::tracker::{CachedTracker, SnapshotTracker, TrackerApi};
use crate::{config, parse, plan, telemetry};

mod render;

// =============================================================================
// Argument surface
// =============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "mdsync",
    version,
    about = "Reconcile a markdown epic with an issue tracker",
    infer_long_args = true
)]
pub struct Cli {
    /// Markdown epic document.
    #[arg(short = 'm', long, value_name = "PATH")]
    pub markdown: PathBuf,

    /// Tracker epic key (default: taken from the document header).
    #[arg(short = 'e', long, value_name = "KEY")]
    pub epic: Option<String>,

    /// Apply the plan. Without this, every operation is listed dry-run.
    #[arg(long, default_value_t = false)]
    pub execute: bool,

    /// Skip the per-operation prompt when executing.
    #[arg(long, default_value_t = false)]
    pub no_confirm: bool,

    /// Restrict to one phase: 1/stories, 2/subtasks, 3/comments.
    #[arg(long, value_name = "PHASE", value_parser = parse_phase)]
    pub phase: Option<Phase>,

    /// Restrict to one story, by local id or tracker key.
    #[arg(long, value_name = "ID")]
    pub story: Option<String>,

    /// Parse and report document problems, touch nothing else.
    #[arg(long, default_value_t = false)]
    pub validate_only: bool,

    /// Plan and print without executing.
    #[arg(long, default_value_t = false)]
    pub analyze_only: bool,

    /// Repair mode: re-render every matched story's description.
    #[arg(long, default_value_t = false)]
    pub fix_descriptions: bool,

    /// Only status transitions.
    #[arg(long, default_value_t = false)]
    pub sync_status_only: bool,

    /// Write a JSON snapshot of the remote tree and exit.
    #[arg(long, default_value_t = false)]
    pub export: bool,

    /// Serve the remote tree from a previously exported snapshot instead of
    /// a live tracker.
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Machine-readable JSON report on stdout.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

fn parse_phase(raw: &str) -> Result<Phase, String> {
    Phase::parse(raw).ok_or_else(|| format!("unknown phase {raw:?} (expected 1-3 or a name)"))
}

// =============================================================================
// Driver
// =============================================================================

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_USAGE: i32 = 2;

pub fn run(cli: Cli) -> i32 {
    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("warning: config load failed, using defaults: {e}");
            Config::default()
        }
    };
    telemetry::init(cli.verbose, &config.logging);

    match run_inner(&cli, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_USAGE
        }
    }
}

fn run_inner(cli: &Cli, config: &Config) -> crate::Result<i32> {
    let text = std::fs::read_to_string(&cli.markdown).map_err(|e| {
        crate::Error::io(format!("failed to read {}", cli.markdown.display()), e)
    })?;
    let parsed = match parse::parse(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", render::render_parse_failure(&e));
            return Ok(EXIT_USAGE);
        }
    };
    if !parsed.warnings.is_empty() && !cli.json {
        eprint!("{}", render::render_parse_warnings(&parsed.warnings));
    }

    if cli.validate_only {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&parsed.warnings).unwrap_or_default());
        } else {
            println!("{}", render::render_validation(&parsed.document, &parsed.warnings));
        }
        return Ok(EXIT_OK);
    }

    let epic = resolve_epic_key(cli, &parsed.document)?;
    let tracker = build_tracker(cli, config)?;

    if cli.export {
        let cwd = std::env::current_dir()
            .map_err(|e| crate::Error::io("failed to resolve working directory", e))?;
        let path = export_snapshot(tracker.as_ref(), &epic, &cwd)?;
        println!("exported {}", path.display());
        return Ok(EXIT_OK);
    }

    let remote = tracker.fetch_tree(&epic).map_err(crate::Error::Api)?;
    let options = PlanOptions {
        phase: cli.phase,
        story: cli.story.clone(),
        fix_descriptions: cli.fix_descriptions,
        status_only: cli.sync_status_only,
    };
    let graph = effective_graph(&config.workflow);
    let sync_plan = plan::plan(&parsed.document, &remote, &graph, &options);

    if cli.analyze_only {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&sync_plan).unwrap_or_default());
        } else {
            println!("{}", render::render_plan(&sync_plan));
        }
        return Ok(if sync_plan.warnings.is_empty() {
            EXIT_OK
        } else {
            EXIT_FAILED
        });
    }

    let mode = if !cli.execute {
        ExecMode::DryRun
    } else if cli.no_confirm {
        ExecMode::NoConfirm
    } else {
        ExecMode::Confirm
    };
    let prompt = TerminalConfirmer;
    let report = Executor::new(tracker.as_ref(), mode, &prompt)
        .with_retry(config.sync.retry.policy())
        .with_workers(config.sync.workers)
        .run(&sync_plan);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        println!("{}", render::render_report(&report));
    }
    Ok(if report.success() { EXIT_OK } else { EXIT_FAILED })
}

fn resolve_epic_key(cli: &Cli, document: &crate::core::EpicDocument) -> crate::Result<IssueKey> {
    if let Some(raw) = &cli.epic {
        return IssueKey::parse(raw).map_err(crate::Error::Core);
    }
    document
        .key
        .clone()
        .ok_or(crate::Error::Config(config::ConfigError::MissingSetting(
            "epic key (pass --epic or add it to the document header)",
        )))
}

fn build_tracker(cli: &Cli, config: &Config) -> crate::Result<Box<dyn TrackerApi>> {
    let Some(path) = &cli.snapshot else {
        // Live tracker adapters plug in behind the trait; this binary only
        // ships the snapshot-backed one.
        return Err(crate::Error::Config(config::ConfigError::MissingSetting(
            "remote source (pass --snapshot with an exported tree)",
        )));
    };
    let inner = SnapshotTracker::load(path)?;
    let ttl = Duration::from_secs(config.tracker.cache_ttl_secs);
    Ok(Box::new(CachedTracker::new(inner, ttl)))
}

/// Projects usually keep the default forward-only workflow; the config's
/// graph replaces it wholesale when edges are present.
fn effective_graph(configured: &TransitionGraph) -> TransitionGraph {
    if configured.edges.is_empty() {
        TransitionGraph::default()
    } else {
        configured.clone()
    }
}

// =============================================================================
// Prompt
// =============================================================================

struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&self, op: &SyncOperation) -> Answer {
        eprint!("{} [y/N/a(bort)] ", op.summary);
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return Answer::Abort;
        }
        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => Answer::Apply,
            "a" | "abort" | "q" | "quit" => Answer::Abort,
            _ => Answer::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_argument_accepts_number_and_name() {
        let cli = Cli::try_parse_from(["mdsync", "--markdown", "epic.md", "--phase", "2"])
            .expect("parse");
        assert_eq!(cli.phase, Some(Phase::Subtasks));

        let cli = Cli::try_parse_from(["mdsync", "--markdown", "epic.md", "--phase", "comments"])
            .expect("parse");
        assert_eq!(cli.phase, Some(Phase::Comments));

        assert!(Cli::try_parse_from(["mdsync", "--markdown", "epic.md", "--phase", "9"]).is_err());
    }

    #[test]
    fn markdown_path_is_required() {
        assert!(Cli::try_parse_from(["mdsync"]).is_err());
    }

    #[test]
    fn dry_run_is_the_default() {
        let cli = Cli::try_parse_from(["mdsync", "--markdown", "epic.md"]).expect("parse");
        assert!(!cli.execute);
        assert!(!cli.no_confirm);
    }

    #[test]
    fn empty_workflow_falls_back_to_default_graph() {
        let empty = TransitionGraph {
            initial: "Open".into(),
            edges: vec![],
        };
        let graph = effective_graph(&empty);
        assert!(!graph.edges.is_empty());
    }
}
