use std::path::Path;
use std::sync::Arc;

use ahx_diff::{
    compare, ChangeKind, DiffNode, DifferenceTree, TextLine, UnresolvedProperty,
    RIGHT_REVISION_LABEL,
};
use ahx_history::{
    DirectorySourceControl, RevisionHistory, RevisionHistoryResolver, SourceControl,
};
use ahx_session::{DiffSessionController, SessionConfig, SessionError, SessionStatus};
use ahx_types::{JsonSnapshot, ObjectPath, PropertySource, RevisionPair, RevisionRef};
use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;

use crate::cli::*;

const CONFIG_FILE: &str = "ahx.toml";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Diff(args) => {
            let config = load_config(cli.config.as_deref(), Path::new("."))?;
            cmd_diff(args, &config, format)
        }
        Command::History(args) => {
            let config = load_config(cli.config.as_deref(), &args.root)?;
            cmd_history(args, &config, format).await
        }
        Command::Compare(args) => {
            let config = load_config(cli.config.as_deref(), &args.root)?;
            cmd_compare(args, config, format).await
        }
    }
}

fn load_config(explicit: Option<&Path>, root: &Path) -> anyhow::Result<SessionConfig> {
    let config = match explicit {
        Some(path) => SessionConfig::load(path),
        None => SessionConfig::load_or_default(&root.join(CONFIG_FILE)),
    };
    config.context("loading configuration")
}

fn cmd_diff(args: DiffArgs, config: &SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let old = read_snapshot(&args.old, config)?;
    let new = read_snapshot(&args.new, config)?;
    let comparison = compare(&old, &new);
    let skipped = comparison.skipped;
    let tree = DifferenceTree::build(comparison.entries, &config.diff.category());

    match format {
        OutputFormat::Json => print_json(&tree_report(&tree, &skipped))?,
        OutputFormat::Text => {
            println!(
                "{} {} → {}",
                "Comparing".bold(),
                args.old.display(),
                args.new.display()
            );
            for line in tree_lines(&tree) {
                println!("{line}");
            }
            print_skipped(&skipped);
        }
    }
    Ok(())
}

async fn cmd_history(args: HistoryArgs, config: &SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let provider: Arc<dyn SourceControl> = Arc::new(
        DirectorySourceControl::new(&args.root).with_enumeration(config.diff.enumeration()),
    );
    let mut resolver = RevisionHistoryResolver::new(Arc::clone(&provider), config.history.clone());
    resolver.open(ObjectPath::new(args.object.as_str()))?;
    resolver.wait().await;
    if args.refresh {
        resolver.refresh()?;
        resolver.wait().await;
    }

    let history = resolver
        .history()
        .unwrap_or_else(|| Arc::new(RevisionHistory::empty(ObjectPath::new(args.object.as_str()))));
    let pairs = history.selectable_pairs();

    match format {
        OutputFormat::Json => print_json(&json!({
            "object": history.object(),
            "locally_modified": history.is_locally_modified(),
            "error": resolver.last_error(),
            "pairs": pairs,
        }))?,
        OutputFormat::Text => {
            if pairs.is_empty() {
                println!("{}", "No revisions found".yellow());
                if let Some(error) = resolver.last_error() {
                    println!("  {}", error.dimmed());
                }
                return Ok(());
            }
            println!("History of {}", history.object().as_str().bold());
            for pair in &pairs {
                println!("{}", pair_line(pair, resolver.uses_changelists()));
            }
        }
    }
    Ok(())
}

async fn cmd_compare(args: CompareArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let directory = Arc::new(
        DirectorySourceControl::new(&args.root).with_enumeration(config.diff.enumeration()),
    );
    let object = ObjectPath::new(args.object.as_str());
    let provider: Arc<dyn SourceControl> = directory.clone();

    let mut session = DiffSessionController::new(provider, object.clone(), config);
    if directory.working_digest(&object).await?.is_some() {
        session = session.with_live(directory.load_working(&object).await?);
    }

    session.open_history()?;
    session.wait_for_history().await;
    let history = match session.history() {
        Some(history) if !history.is_empty() => history,
        _ => bail!("No revisions found for {object}"),
    };
    let Some(pair) = history.pair_for_candidate(&args.candidate) else {
        bail!("{} is not a revision of {object}", args.candidate);
    };

    match session.select_pair(pair).await {
        Ok(()) => {}
        Err(SessionError::SnapshotLoadFailed { revision, source }) => {
            eprintln!("{} {revision}: {source}", "Unable to load assets to diff".red().bold());
            bail!("unable to load {revision}");
        }
        Err(e) => return Err(e.into()),
    }

    if *session.status() == SessionStatus::Viewing {
        return print_viewed(&session, format);
    }

    match format {
        OutputFormat::Json => {
            let mut report = tree_report(session.tree(), session.skipped());
            report["title"] = json!(session.title());
            report["pair"] = json!(session.pair());
            print_json(&report)?;
        }
        OutputFormat::Text => {
            println!("{}", session.title().bold());
            for line in tree_lines(session.tree()) {
                println!("{line}");
            }
            print_skipped(session.skipped());
        }
    }

    if args.walk {
        let total = session.navigator().len();
        let mut step = 0;
        while let Some(entry) = session.next() {
            step += 1;
            println!(
                "[{step}/{total}] {} {}",
                "focus".cyan(),
                session.describe(&entry)
            );
        }
        if total > 0 {
            println!("{}", "End of differences.".dimmed());
        }
    }
    Ok(())
}

fn print_viewed(session: &DiffSessionController, format: OutputFormat) -> anyhow::Result<()> {
    let Some(snapshot) = session.viewed() else {
        return Ok(());
    };
    let snapshot: &dyn PropertySource = snapshot.as_ref();
    let properties: Vec<(String, serde_json::Value)> = snapshot
        .enumerate_properties()
        .into_iter()
        .filter_map(|path| {
            let value = snapshot.resolve(&path).ok()??;
            Some((path.to_string(), value))
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&json!({
            "title": session.title(),
            "properties": properties.into_iter().collect::<serde_json::Map<_, _>>(),
        }))?,
        OutputFormat::Text => {
            println!("{} {}", session.title().bold(), "(no previous revision)".dimmed());
            for (path, value) in properties {
                println!("  {path} = {value}");
            }
        }
    }
    Ok(())
}

fn read_snapshot(path: &Path, config: &SessionConfig) -> anyhow::Result<JsonSnapshot> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let snapshot = JsonSnapshot::from_json_str(name, &text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(snapshot.with_options(config.diff.enumeration()))
}

/// Display lines for a difference tree, two spaces of indent per level.
pub(crate) fn tree_lines(tree: &DifferenceTree) -> Vec<String> {
    let mut lines = Vec::new();
    for row in tree.rows() {
        let indent = "  ".repeat(row.depth);
        match row.node {
            DiffNode::Category { has_differences, .. } => {
                let text = row.node.display_text(RIGHT_REVISION_LABEL);
                let label = if *has_differences { text.bold() } else { text.dimmed() };
                lines.push(format!("{indent}{label}"));
            }
            DiffNode::NoDifferences => {
                lines.push(format!("{indent}{}", row.node.display_text(RIGHT_REVISION_LABEL).dimmed()));
            }
            DiffNode::Leaf(entry) => {
                let marker = match entry.kind {
                    ChangeKind::Added => "+".green(),
                    ChangeKind::Removed => "-".red(),
                    ChangeKind::Changed => "~".yellow(),
                };
                lines.push(format!("{indent}{marker} {}", entry.message(RIGHT_REVISION_LABEL)));
                if let Some(text) = entry.text_diff() {
                    for hunk in &text.hunks {
                        lines.push(format!(
                            "{indent}    {}",
                            format!(
                                "@@ -{},{} +{},{} @@",
                                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
                            )
                            .cyan()
                        ));
                        for line in &hunk.lines {
                            lines.push(match line {
                                TextLine::Context(l) => format!("{indent}     {l}"),
                                TextLine::Added(l) => format!("{indent}    {}", format!("+{l}").green()),
                                TextLine::Removed(l) => format!("{indent}    {}", format!("-{l}").red()),
                            });
                        }
                    }
                }
            }
        }
    }
    lines
}

fn tree_report(tree: &DifferenceTree, skipped: &[UnresolvedProperty]) -> serde_json::Value {
    let differences: Vec<_> = tree.real_differences().iter().map(|e| e.as_ref()).collect();
    json!({
        "has_differences": tree.has_differences(),
        "differences": differences,
        "skipped": skipped,
    })
}

fn print_skipped(skipped: &[UnresolvedProperty]) {
    if skipped.is_empty() {
        return;
    }
    println!("{} {} not compared:", "!".yellow(), skipped.len());
    for property in skipped {
        println!("  {} ({})", property.path, property.reason.dimmed());
    }
}

fn pair_line(pair: &RevisionPair, uses_changelists: bool) -> String {
    match (&pair.previous, &pair.candidate) {
        (_, RevisionRef::Local) => format!(
            "  {}  {} vs {}",
            "HEAD".yellow().bold(),
            "local changes".italic(),
            pair.previous
        ),
        (RevisionRef::NoRevision, candidate) => format!(
            "  {}  {}",
            candidate.label().yellow(),
            first_line(candidate, uses_changelists).dimmed()
        ),
        (previous, candidate) => format!(
            "  {}  {} (vs {})",
            candidate.label().yellow(),
            first_line(candidate, uses_changelists),
            previous
        ),
    }
}

fn first_line(revision: &RevisionRef, uses_changelists: bool) -> String {
    revision
        .record()
        .map(|r| {
            r.tooltip(uses_changelists)
                .lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .unwrap_or_default()
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
