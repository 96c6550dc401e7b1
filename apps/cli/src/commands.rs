//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use writerpack_core::{
    Capabilities, Clock, Orchestrator, PipelineRequest, PipelineSettings, ProgressReporter,
    PublishOutcome, PublishRequest, PublishSink, SinkOutcome, SystemClock,
};
use writerpack_providers::{
    CustomSearch, GeminiResearch, JsonDirTrendSource, OpenAiChat, WordPressDrafts,
};
use writerpack_shared::{
    AppConfig, AudienceSegment, ResearchPolicy, Role, StructureDirective, Topic, WriterPack,
    expand_home, init_config, load_config, load_config_from,
};
use writerpack_storage::Storage;

use crate::render;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// WriterPack: turn a topic into a reviewable Writer's Pack.
#[derive(Parser)]
#[command(
    name = "writerpack",
    version,
    about = "Research, draft and package trend-aware articles for human review.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.writerpack/writerpack.toml.
    #[arg(long, global = true, env = "WRITERPACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for a topic and print the Writer's Pack.
    Generate {
        /// Article topic, e.g. "exam stress".
        topic: String,

        /// Audience segment: youth or young-adult.
        #[arg(short, long, default_value = "youth")]
        audience: AudienceSegment,

        /// Article structure, or "auto" to let the model decide.
        #[arg(short, long, default_value = "auto")]
        structure: StructureDirective,

        /// Guiding question for the research stage (repeatable).
        #[arg(short = 'q', long = "question")]
        questions: Vec<String>,

        /// Override the configured research policy: proceed-degraded or abort.
        #[arg(long)]
        research_policy: Option<ResearchPolicy>,

        /// Create a WordPress draft from the pack once it is logged.
        #[arg(long)]
        publish: bool,

        /// Editorial role of the person running the pipeline.
        #[arg(long, env = "WRITERPACK_ROLE", default_value = "writer")]
        role: Role,

        /// Print the pack as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Inspect the daily keyword cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect the pack log.
    Log {
        #[command(subcommand)]
        action: LogAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show cached keyword summaries for a day.
    Show {
        /// Day to show (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        day: Option<NaiveDate>,
    },
}

/// Log subcommands.
#[derive(Subcommand)]
pub(crate) enum LogAction {
    /// List the most recent packs.
    List {
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const LOG_TARGETS: [&str; 5] = [
    "writerpack_cli",
    "writerpack_core",
    "writerpack_providers",
    "writerpack_shared",
    "writerpack_storage",
];

/// Initialize tracing based on CLI flags. Logs go to stderr so that
/// `--json` output on stdout stays machine-readable.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Generate {
            topic,
            audience,
            structure,
            questions,
            research_policy,
            publish,
            role,
            json,
        } => {
            let request = PipelineRequest {
                topic: Topic::parse(&topic)?,
                audience,
                directive: structure,
                guiding_questions: questions,
            };
            cmd_generate(config, request, research_policy, publish, role, json).await
        }
        Command::Cache { action } => match action {
            CacheAction::Show { day } => cmd_cache_show(&config, day).await,
        },
        Command::Log { action } => match action {
            LogAction::List { limit } => cmd_log_list(&config, limit).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.defaults.database_path);
    Ok(Arc::new(Storage::open(&path).await?))
}

async fn cmd_generate(
    mut config: AppConfig,
    request: PipelineRequest,
    research_policy: Option<ResearchPolicy>,
    publish: bool,
    role: Role,
    json: bool,
) -> Result<()> {
    if let Some(policy) = research_policy {
        config.pipeline.research_policy = policy;
    }

    let storage = open_storage(&config).await?;
    let publisher: Option<Arc<dyn PublishSink>> = if publish {
        let wp = WordPressDrafts::from_config(&config.wordpress)?
            .ok_or_else(|| eyre!("--publish needs [wordpress].url in the config"))?;
        Some(Arc::new(wp))
    } else {
        None
    };

    let caps = Capabilities {
        text: Arc::new(OpenAiChat::light(&config.openai)?),
        research: Arc::new(GeminiResearch::from_config(&config.gemini)?),
        draft: Arc::new(OpenAiChat::drafting(&config.openai)?),
        search: Arc::new(CustomSearch::from_config(&config.search)?),
        trend_source: Arc::new(JsonDirTrendSource::new(expand_home(
            &config.trends.source_dir,
        ))),
        cache: storage.clone(),
        log: storage,
        publisher,
        clock: Arc::new(SystemClock),
    };
    let orchestrator = Orchestrator::new(caps, PipelineSettings::from_config(&config));

    info!(
        topic = %request.topic,
        audience = %request.audience,
        structure = %request.directive,
        "generating writer's pack"
    );

    let reporter = CliProgress::new()?;
    let mut run = match orchestrator.run(&request, &reporter).await {
        Ok(run) => run,
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    let pack = run
        .pack()
        .cloned()
        .ok_or_else(|| eyre!("pipeline finished without a pack"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pack)?);
    } else {
        render::print_pack(&pack);
    }

    if let Some(SinkOutcome::Failed(reason)) = run.log_outcome() {
        eprintln!("warning: pack was not written to the log: {reason}");
    }

    if publish {
        let outcome = orchestrator
            .publish(
                &mut run,
                PublishRequest {
                    confirmed: true,
                    role,
                },
            )
            .await?;
        report_publish(&outcome);
    } else {
        run.finish()?;
    }

    Ok(())
}

fn report_publish(outcome: &PublishOutcome) {
    match outcome {
        PublishOutcome::Published(draft) => {
            println!();
            println!("  WordPress draft created (id {})", draft.id);
            if let Some(link) = &draft.link {
                println!("  Edit: {link}");
            }
        }
        PublishOutcome::Failed(reason) => {
            warn!(%reason, "publish failed");
            eprintln!("warning: could not create the WordPress draft: {reason}");
            eprintln!("The pack above is complete and logged; publish it manually.");
        }
        PublishOutcome::Skipped => {}
    }
}

async fn cmd_cache_show(config: &AppConfig, day: Option<NaiveDate>) -> Result<()> {
    let day = day.unwrap_or_else(|| SystemClock.today());
    let storage = open_storage(config).await?;
    let entries = storage.list_keyword_cache(day).await?;

    if entries.is_empty() {
        println!("No cached keywords for {day}.");
        return Ok(());
    }

    println!("Keyword cache for {day}:");
    for entry in entries {
        println!();
        println!(
            "  {} ({} rows, written {})",
            entry.source_platform,
            entry.raw_row_count,
            entry.created_at.format("%H:%M:%S UTC")
        );
        println!("    {}", entry.keywords.join(", "));
    }
    Ok(())
}

async fn cmd_log_list(config: &AppConfig, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let records = storage.list_pack_log(limit).await?;

    if records.is_empty() {
        println!("The pack log is empty.");
        return Ok(());
    }

    for record in records {
        let flag = if record.degraded { " [degraded]" } else { "" };
        println!(
            "{}  {:<11} {:<14} {}{}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.audience,
            record.structure_used,
            record.title,
            flag
        );
        println!("    id {} by {} | topic: {}", record.pack_id, record.created_by, record.topic);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn degraded(&self, stage: &str, reason: &str) {
        self.spinner.println(format!("  ! {stage}: {reason}"));
    }

    fn done(&self, _pack: &WriterPack) {
        self.spinner.finish_and_clear();
    }
}
