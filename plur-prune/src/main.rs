//! plur-prune - Delete, unlike, and unshare old posts
//!
//! Runs the pruning pipeline once against a single platform and streams every
//! classified post to stdout as it goes.

use clap::{ArgGroup, Parser, ValueEnum};
use libplurprune::config::Config;
use libplurprune::logging;
use libplurprune::platforms::archive::ArchiveSource;
use libplurprune::platforms::PostSource;
use libplurprune::prune::preserve;
use libplurprune::prune::{
    ActionOutcome, ContinuationDriver, PruneOptions, RoundObserver, RoundResult, RunSummary,
    TerminationReason,
};
use libplurprune::types::{ActionKind, Post};
use libplurprune::{PruneError, Result};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "plur-prune")]
#[command(version)]
#[command(about = "Delete, unlike, and unshare old posts")]
#[command(long_about = "\
plur-prune - Delete, unlike, and unshare old posts

DESCRIPTION:
    plur-prune pages through your post history newest-first and acts on
    everything older than a maximum age or a cutoff date. Originals,
    replies and quotes are deleted; likes are undone with --unlike and
    reposts with --unshare. Pinned and self-liked posts can be kept.

    Every classified post is printed to stdout, so a --dry-run shows
    exactly what a live run would do.

USAGE:
    # Preview what would go
    plur-prune --archive ~/exports/mastodon.json --max-age 90d --dry-run

    # Walk the whole history, one page per round
    plur-prune --platform mastodon --max-age 1y --unlike --continue

    # Machine-readable output
    plur-prune --platform bluesky --before 2023-01-01 --format json

EXIT CODES:
    0 - Every action succeeded
    1 - Platform unreachable or some actions failed
    2 - Authentication error
    3 - Invalid input or configuration
")]
#[command(group(ArgGroup::new("source").required(true).args(["platform", "archive"])))]
struct Cli {
    /// Config file (defaults to $PLURPRUNE_CONFIG or ~/.config/plurprune/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Platform entry from the config file
    #[arg(short, long)]
    platform: Option<String>,

    /// Prune a JSON export directly
    #[arg(long, value_name = "PATH")]
    archive: Option<String>,

    /// Label for --archive posts
    #[arg(long, default_value = "archive")]
    name: String,

    /// Account whose history is pruned
    #[arg(short, long)]
    user: Option<String>,

    /// Act on posts older than this (e.g. 90d, 1y)
    #[arg(long, value_name = "DURATION")]
    max_age: Option<String>,

    /// Act on posts created before this date (YYYY-MM-DD, RFC 3339, or Unix time)
    #[arg(long, value_name = "DATE")]
    before: Option<String>,

    /// Keep pinned posts
    #[arg(long)]
    preserve_pinned: bool,

    /// Keep your own posts that you liked
    #[arg(long)]
    preserve_self_liked: bool,

    /// Also undo likes
    #[arg(long)]
    unlike: bool,

    /// Also undo reposts
    #[arg(long)]
    unshare: bool,

    /// Classify and report without changing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Keep fetching pages until the history is exhausted
    #[arg(long = "continue")]
    continuous: bool,

    /// Do not stop at the first page that crosses the threshold
    #[arg(long)]
    drain: bool,

    /// Pause before each action (e.g. 500ms)
    #[arg(long, value_name = "DURATION")]
    delay: Option<String>,

    /// Posts per page
    #[arg(long)]
    page_size: Option<usize>,

    /// Stop a continuous run after this many rounds
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::config_from_env(cli.verbose).init();

    match run(cli).await {
        Ok(summary) => {
            if summary.is_fetch_error() || summary.result.error_count > 0 {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load_or_default()?,
    };

    let options = build_options(&cli, &config)?;
    let (source, user) = open_source(&cli, &config)?;

    let printer = Arc::new(StreamPrinter {
        format: cli.format,
        options: options.clone(),
    });
    let driver = ContinuationDriver::new(source, user, options)?.with_observer(printer.clone());

    let summary = driver.run(cli.continuous).await;
    printer.print_summary(&summary);
    Ok(summary)
}

/// Config defaults overlaid with command-line flags
fn build_options(cli: &Cli, config: &Config) -> Result<PruneOptions> {
    let mut prune = config.prune.clone();

    if cli.max_age.is_some() || cli.before.is_some() {
        prune.max_age = cli.max_age.clone();
        prune.before = cli.before.clone();
    }
    prune.preserve_pinned |= cli.preserve_pinned;
    prune.preserve_self_liked |= cli.preserve_self_liked;
    prune.unlike |= cli.unlike;
    prune.unshare |= cli.unshare;
    prune.dry_run |= cli.dry_run;
    prune.drain |= cli.drain;
    if let Some(delay) = &cli.delay {
        prune.delay = delay.clone();
    }
    if let Some(page_size) = cli.page_size {
        prune.page_size = page_size;
    }
    if cli.max_rounds.is_some() {
        prune.max_rounds = cli.max_rounds;
    }

    prune.to_options()
}

fn open_source(cli: &Cli, config: &Config) -> Result<(Arc<dyn PostSource>, String)> {
    if let Some(path) = &cli.archive {
        let source: Arc<dyn PostSource> = Arc::new(ArchiveSource::open(&cli.name, path)?);
        let user = cli.user.clone().unwrap_or_else(|| "me".to_string());
        return Ok((source, user));
    }

    let name = cli
        .platform
        .as_deref()
        .ok_or_else(|| PruneError::InvalidInput("either --platform or --archive is required".to_string()))?;
    let platform = config.platform(name)?;
    let user = cli.user.clone().unwrap_or_else(|| platform.user.clone());
    Ok((platform.open_source()?, user))
}

/// Writes each round's classified posts to stdout
struct StreamPrinter {
    format: OutputFormat,
    options: PruneOptions,
}

impl StreamPrinter {
    /// Write one classified post; `outcome` is `None` for preserved posts
    fn print_post(
        &self,
        out: &mut impl Write,
        label: &str,
        outcome: Option<ActionOutcome>,
        post: &Post,
    ) {
        let result = match self.format {
            OutputFormat::Json => {
                let mut line = json!({
                    "type": "post",
                    "action": label,
                    "dry_run": self.options.dry_run,
                    "post": post,
                });
                if let Some(outcome) = outcome {
                    line["outcome"] = json!(outcome);
                }
                writeln!(out, "{}", line)
            }
            OutputFormat::Text => {
                let prefix = match outcome {
                    Some(ActionOutcome::Planned) => "would ",
                    Some(ActionOutcome::Failed) => "failed ",
                    _ => "",
                };
                writeln!(
                    out,
                    "{}{}\t{}\t{}\t{}\t{}",
                    prefix,
                    label,
                    post.label(),
                    post.created_at.format("%Y-%m-%d"),
                    post.kind,
                    excerpt(&post.text)
                )
            }
        };
        if let Err(e) = result {
            tracing::debug!("Failed to write output: {}", e);
        }
    }

    fn print_summary(&self, summary: &RunSummary) {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let totals = summary.result.summary();

        let result = match self.format {
            OutputFormat::Json => writeln!(
                out,
                "{}",
                json!({
                    "type": "summary",
                    "run": summary,
                    "totals": totals,
                    "errors": summary.result.errors,
                })
            ),
            OutputFormat::Text => {
                let mut lines = vec![format!(
                    "{} after {} round(s): {}",
                    describe(summary.termination),
                    summary.rounds,
                    totals
                )];
                lines.extend(summary.result.errors.iter().map(|e| format!("error: {}", e)));
                writeln!(out, "{}", lines.join("\n"))
            }
        };
        if let Err(e) = result {
            tracing::debug!("Failed to write summary: {}", e);
        }
    }
}

impl RoundObserver for StreamPrinter {
    fn on_round(&self, _platform: &str, round: &RoundResult) {
        let stdout = std::io::stdout();
        self.print_round(&mut stdout.lock(), round);
    }
}

impl StreamPrinter {
    fn print_round(&self, out: &mut impl Write, round: &RoundResult) {
        // Buckets and outcomes are both in call order, so the n-th post of a
        // kind pairs with the n-th outcome of that kind.
        for action in ActionKind::ALL {
            let outcomes = round
                .actions
                .iter()
                .filter(|(kind, _)| *kind == action)
                .map(|(_, outcome)| *outcome);
            for (post, outcome) in round.result.bucket(action).iter().zip(outcomes) {
                self.print_post(out, action.as_str(), Some(outcome), post);
            }
        }
        for post in &round.result.posts_preserved {
            let reason = preserve::evaluate(post, &self.options)
                .map(|r| r.as_str())
                .unwrap_or("preserved");
            self.print_post(out, &format!("keep:{}", reason), None, post);
        }
    }
}

fn describe(termination: TerminationReason) -> &'static str {
    match termination {
        TerminationReason::Exhausted => "History exhausted",
        TerminationReason::CursorStalled => "Reached end of history",
        TerminationReason::AgeThresholdReached => "Reached posts newer than the threshold",
        TerminationReason::FetchError => "Stopped on fetch error",
        TerminationReason::RoundLimitReached => "Stopped at round limit",
        TerminationReason::Cancelled => "Cancelled",
    }
}

/// First line of a post, shortened for a terminal
fn excerpt(text: &str) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > 60 {
        let short: String = line.chars().take(57).collect();
        format!("{}...", short)
    } else {
        line.to_string()
    }
}
