use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use dom_eval::config::{self, Provider};
use dom_eval::html::HtmlScorer;
use dom_eval::judge::{build_judge, check_health};
use dom_eval::runner::{Evaluator, ExecutionMode, run_batch};
use dom_eval::session::{SUMMARY_FILE, Session, list_sessions};
use dom_eval::store::{EvaluationStore, EvaluationSummary, GroupStats};
use dom_eval::task::{load_interactions, load_tasks, pair_tasks};

/// DOM Eval - score web-agent interactions against ground truth
#[derive(Parser, Debug)]
#[command(
    name = "dom-eval",
    about = "Score web-agent element interactions by HTML similarity and visual judgment",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DOM_EVAL_JUDGE_PROVIDER      openai, anthropic or pixel\n\
        DOM_EVAL_JUDGE_ENDPOINT      Evaluator API endpoint URL\n\
        DOM_EVAL_JUDGE_MODEL         Evaluator model name\n\
        DOM_EVAL_JUDGE_API_KEY       API key (falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY)\n\
        DOM_EVAL_SUCCESS_THRESHOLD   Final score needed for success\n\
        DOM_EVAL_WORKERS             Parallel worker count\n\
        DOM_EVAL_TASK_TIMEOUT        Per-task timeout (seconds)\n\
        DOM_EVAL_DYNAMIC_ATTRIBUTES  Comma-separated attributes to ignore\n\
        DOM_EVAL_OUTPUT_DIR          Base directory for evaluation runs\n\
        RUST_LOG                     Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    #[value(alias = "sequential")]
    Serial,
    Parallel,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a batch of executed tasks
    Evaluate {
        /// Task file (JSONL, one task per line)
        #[arg(short, long)]
        tasks: PathBuf,

        /// Executor results (JSON array of interaction records)
        #[arg(short, long)]
        results: PathBuf,

        /// Run directory (default: auto-generated under DOM_EVAL_OUTPUT_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scheduling mode
        #[arg(long, value_enum, default_value = "parallel")]
        mode: Mode,

        /// Worker count in parallel mode
        #[arg(short, long)]
        workers: Option<usize>,

        /// Ceiling on concurrent evaluator calls
        #[arg(long)]
        judge_concurrency: Option<usize>,

        /// Final score needed for success
        #[arg(long)]
        threshold: Option<f64>,

        /// Evaluator provider: openai, anthropic or pixel
        #[arg(short, long, env = "DOM_EVAL_JUDGE_PROVIDER")]
        provider: Option<Provider>,

        /// Per-task evaluator timeout in seconds, not counting the wait for a judge slot
        #[arg(long)]
        task_timeout: Option<u64>,

        /// Additional attribute to treat as dynamic (repeatable)
        #[arg(long = "dynamic-attr")]
        dynamic_attrs: Vec<String>,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two HTML snippets and print the scores as JSON
    ScoreHtml {
        /// Actual element HTML, or @path to read it from a file
        #[arg(short, long)]
        actual: String,

        /// Expected element HTML, or @path to read it from a file
        #[arg(short, long)]
        expected: String,

        /// Attribute to treat as dynamic (repeatable)
        #[arg(long = "dynamic-attr")]
        dynamic_attrs: Vec<String>,
    },

    /// List evaluation runs with their results
    List {
        /// Base directory (default: DOM_EVAL_OUTPUT_DIR)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Check that the configured evaluator endpoint is reachable
    Check {
        /// Endpoint to probe (default: configured endpoint)
        #[arg(long)]
        endpoint: Option<String>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Some(Commands::Evaluate {
            tasks,
            results,
            output,
            mode,
            workers,
            judge_concurrency,
            threshold,
            provider,
            task_timeout,
            dynamic_attrs,
            json,
        }) => {
            let mut cfg = config::get().clone();
            if let Some(provider) = provider {
                cfg.judge = cfg.judge.with_provider(provider);
            }
            if let Some(n) = judge_concurrency {
                cfg.judge.concurrency = n.max(1);
            }
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    bail!("Threshold must be between 0 and 1, got {}", t);
                }
                cfg.scoring.success_threshold = t;
            }
            if let Some(n) = workers {
                cfg.batch.workers = n.max(1);
            }
            if let Some(secs) = task_timeout {
                cfg.batch.task_timeout = secs;
            }
            cfg.scoring.dynamic_attributes.extend(dynamic_attrs);

            let task_list = load_tasks(&tasks)
                .with_context(|| format!("failed to load tasks from {}", tasks.display()))?;
            let interactions = load_interactions(&results)
                .with_context(|| format!("failed to load results from {}", results.display()))?;
            let pairs = pair_tasks(task_list, interactions);

            let judge = build_judge(&cfg.judge).context("failed to build evaluator")?;

            let session = match output {
                Some(dir) => Session::in_dir(dir),
                None => Session::with_name(&cfg.batch.output_dir, judge.name()),
            };
            session
                .init(judge.name(), cfg.scoring.success_threshold, pairs.len())
                .with_context(|| format!("failed to create {}", session.dir.display()))?;
            info!(session = %session.dir.display(), "evaluation run started");

            let store = EvaluationStore::open(&session.progress_path()).await?;
            let evaluator = Arc::new(Evaluator::from_config(judge, &cfg));
            let execution_mode = match mode {
                Mode::Serial => ExecutionMode::Sequential,
                Mode::Parallel => ExecutionMode::parallel(cfg.batch.workers),
            };

            let summary_path = session.summary_path();
            let summary = run_batch(evaluator, pairs, execution_mode, &store, Some(&summary_path))
                .await
                .context("failed to write summary")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
                println!("\nSession: {}", session.dir.display());
            }
        }

        Some(Commands::ScoreHtml {
            actual,
            expected,
            dynamic_attrs,
        }) => {
            let actual = read_snippet(&actual)?;
            let expected = read_snippet(&expected)?;
            let scorer = HtmlScorer::new()
                .dynamic_attributes(&config::get().scoring.dynamic_attributes)
                .dynamic_attributes(&dynamic_attrs);
            let result = scorer.compare(Some(&actual), &expected);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Some(Commands::List { dir }) => {
            let base = dir.unwrap_or_else(|| PathBuf::from(&config::get().batch.output_dir));
            let sessions = list_sessions(&base)
                .with_context(|| format!("failed to read {}", base.display()))?;
            if sessions.is_empty() {
                println!("No evaluation runs under {}", base.display());
            }
            for dir in sessions {
                match read_summary(&dir.join(SUMMARY_FILE)) {
                    Some(summary) => println!(
                        "{}  {}/{} successful ({:.1}%)",
                        dir.display(),
                        summary.successful_tasks,
                        summary.total_tasks,
                        summary.success_rate
                    ),
                    None => println!("{}  (incomplete)", dir.display()),
                }
            }
        }

        Some(Commands::Check { endpoint }) => {
            let settings = &config::get().judge;
            if endpoint.is_none() && settings.provider == Provider::Pixel {
                println!("Pixel judge runs locally, no endpoint to check");
                return Ok(());
            }

            let endpoint = endpoint.unwrap_or_else(|| settings.endpoint.clone());
            if check_health(&endpoint, settings.connect_timeout).await? {
                println!("Evaluator endpoint responding: {}", endpoint);
            } else {
                bail!("Evaluator endpoint not responding at {}", endpoint);
            }
        }

        None => {
            println!("DOM Eval - score web-agent interactions against ground truth");
            println!();
            println!("Usage: dom-eval <COMMAND>");
            println!();
            println!("Commands:");
            println!("  evaluate    Evaluate a batch of executed tasks");
            println!("  score-html  Compare two HTML snippets");
            println!("  list        List evaluation runs");
            println!("  check       Check the evaluator endpoint");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

/// Inline HTML, or the contents of a file when prefixed with `@`
fn read_snippet(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed to read {}", path)),
        None => Ok(arg.to_string()),
    }
}

/// Summary of a finished run, if one was written
fn read_summary(path: &Path) -> Option<EvaluationSummary> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn print_summary(summary: &EvaluationSummary) {
    println!(
        "Evaluated {} tasks: {} successful ({:.1}%), average score {:.3}",
        summary.total_tasks,
        summary.successful_tasks,
        summary.success_rate,
        summary.average_score()
    );

    let failed = summary.total_tasks.saturating_sub(summary.successful_tasks);
    if !summary.failure_reasons.is_empty() {
        println!("\nFailure reasons:");
        let mut reasons: Vec<_> = summary.failure_reasons.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1));
        for (reason, count) in reasons {
            println!(
                "  {:<24} {:>5.1}% ({} tasks)",
                reason,
                *count as f64 / failed.max(1) as f64 * 100.0,
                count
            );
        }
    }

    print_groups("By interaction", &summary.by_interaction);
    print_groups("By site", &summary.by_site);
    println!();

    for record in &summary.evaluations {
        let verdict = if record.success { "PASS" } else { "FAIL" };
        println!(
            "  {:<24} {} final {:.3} (visual {:.3}, html {:.3})",
            record.task_id,
            verdict,
            record.final_score,
            record.visual_score,
            record.html_score.total_score
        );
        if let Some(error) = record.execution_error.as_ref().or(record.visual_error.as_ref()) {
            let preview: String = error.chars().take(120).collect();
            println!("    Error: {}", preview);
        }
    }
}

fn print_groups(title: &str, groups: &BTreeMap<String, GroupStats>) {
    if groups.is_empty() {
        return;
    }
    println!("\n{}:", title);
    for (name, stats) in groups {
        println!(
            "  {:<24} {:>5.1}% ({}/{} tasks)",
            name,
            stats.success_rate(),
            stats.successful,
            stats.total
        );
    }
}
