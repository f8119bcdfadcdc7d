#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use transhub::app_config::{self, Config, PipelineMode, TranslationProvider};
use transhub::driver::{PipelineDriver, RunRequest};
use transhub::reporting::{JsonlReviewSink, LogReviewSink, ProgressBarSink, ReviewSink};
use transhub::translation::{ContextComposer, backend_from_config};

/// CLI Wrapper for TranslationProvider to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationProvider {
    Gemini,
    Groq,
    #[value(name = "openrouter")]
    OpenRouter,
    #[value(name = "openai")]
    OpenAI,
    Anthropic,
    Ollama,
    #[value(name = "lmstudio")]
    LMStudio,
    Mock,
}

impl From<CliTranslationProvider> for TranslationProvider {
    fn from(cli_provider: CliTranslationProvider) -> Self {
        match cli_provider {
            CliTranslationProvider::Gemini => TranslationProvider::Gemini,
            CliTranslationProvider::Groq => TranslationProvider::Groq,
            CliTranslationProvider::OpenRouter => TranslationProvider::OpenRouter,
            CliTranslationProvider::OpenAI => TranslationProvider::OpenAI,
            CliTranslationProvider::Anthropic => TranslationProvider::Anthropic,
            CliTranslationProvider::Ollama => TranslationProvider::Ollama,
            CliTranslationProvider::LMStudio => TranslationProvider::LMStudio,
            CliTranslationProvider::Mock => TranslationProvider::Mock,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// Options shared by every command that talks to a backend
#[derive(Args, Debug)]
struct BackendArgs {
    /// Configuration file path (created with defaults if missing)
    #[arg(short, long, default_value = "transhub.json")]
    config: PathBuf,

    /// Translation backend to use
    #[arg(long, value_enum)]
    backend: Option<CliTranslationProvider>,

    /// Model name to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the selected backend
    #[arg(long, env = "TRANSHUB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Template (.pot) to translate
    #[arg(value_name = "TEMPLATE_PATH")]
    template_path: PathBuf,

    /// Target catalog (default: <template dir>/<locale>.po)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Entries per backend call
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Global standardization guide
    #[arg(short, long)]
    guide: Option<PathBuf>,

    /// Target language code (e.g., 'es', 'pt-BR')
    #[arg(short, long)]
    language: Option<String>,

    /// Score translations and send weak ones to review
    #[arg(short, long)]
    quality: bool,

    /// Regional profile (JSON) used in quality mode
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Glossary file (JSON)
    #[arg(long)]
    glossary: Option<PathBuf>,

    /// Term corrections file (JSON)
    #[arg(long)]
    corrections: Option<PathBuf>,

    /// Application-specific guide
    #[arg(long)]
    app_guide: Option<PathBuf>,

    /// Language-specific guide
    #[arg(long)]
    language_guide: Option<PathBuf>,

    /// Append review records to this JSON lines file
    #[arg(long)]
    review_output: Option<PathBuf>,

    #[command(flatten)]
    common: BackendArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate a template into the target catalog
    #[command(alias = "translate")]
    Run(RunArgs),

    /// Check that the configured backend is reachable
    Check(BackendArgs),

    /// Generate shell completions for transhub
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// transhub - AI translation pipeline for gettext catalogs
#[derive(Parser, Debug)]
#[command(name = "transhub")]
#[command(version)]
#[command(about = "AI-assisted translation of gettext catalogs")]
#[command(long_about = "transhub merges a .pot template into the target .po catalog and translates
pending entries in batches with an AI backend, saving after every batch.

EXAMPLES:
    transhub run locale/messages.pot -l es                  # Translate into locale/es.po
    transhub run messages.pot -l pt-BR -o pt_BR.po -b 20    # Custom output and batch size
    transhub run messages.pot --backend ollama -m llama3.2  # Local model
    transhub run messages.pot -q --profile br.json          # Quality mode with a regional profile
    transhub check --backend openai                         # Test the backend connection
    transhub completions bash > transhub.bash               # Generate bash completions

CONFIGURATION:
    Configuration is stored in transhub.json by default. If the file does not
    exist, a default one is created. Command line flags override file values.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,
}

/// Colored stderr logger with millisecond timestamps; filtered by `log::max_level`
struct CustomLogger;

impl CustomLogger {
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "❌"),
            Level::Warn => ("\x1B[1;33m", "🚧"),
            Level::Info => ("\x1B[1;32m", " "),
            Level::Debug => ("\x1B[1;36m", "🔍"),
            Level::Trace => ("\x1B[1;35m", "📋"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = chrono::Local::now().format("%H:%M:%S.%3f");
        let (color, emoji) = Self::style_for_level(record.level());
        let _ = writeln!(std::io::stderr(), "{}{} {} {}\x1B[0m", color, now, emoji, record.args());
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Level is refined once the config is loaded
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialize logger: {}", e);
    }

    let cli = CommandLineOptions::parse();

    let result = match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "transhub", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => run_translate(args).await,
        Commands::Check(args) => run_check(args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Load the config file and apply backend overrides from the command line
fn load_config(options: &BackendArgs) -> Result<Config> {
    if let Some(level) = &options.log_level {
        let level: app_config::LogLevel = level.clone().into();
        log::set_max_level(LevelFilter::from(&level));
    }

    let mut config = Config::load_or_create(&options.config)?;

    if let Some(backend) = &options.backend {
        config.translation.provider = backend.clone().into();
    }
    if let Some(model) = &options.model {
        config.translation.active_provider_config_mut().model = model.clone();
    }
    if let Some(api_key) = &options.api_key {
        config.translation.active_provider_config_mut().api_key = api_key.clone();
    }

    match &options.log_level {
        Some(level) => config.log_level = level.clone().into(),
        None => log::set_max_level(LevelFilter::from(&config.log_level)),
    }

    Ok(config)
}

fn apply_run_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    if args.quality {
        config.mode = PipelineMode::Quality;
    }
    if let Some(profile) = &args.profile {
        config.quality.profile = Some(profile.clone());
    }
    if let Some(path) = &args.guide {
        config.context.guide = Some(path.clone());
    }
    if let Some(path) = &args.app_guide {
        config.context.app_guide = Some(path.clone());
    }
    if let Some(path) = &args.language_guide {
        config.context.language_guide = Some(path.clone());
    }
    if let Some(path) = &args.glossary {
        config.context.glossary = Some(path.clone());
    }
    if let Some(path) = &args.corrections {
        config.context.corrections = Some(path.clone());
    }
    if let Some(path) = &args.review_output {
        config.review_output = Some(path.clone());
    }
}

async fn run_translate(args: RunArgs) -> Result<ExitCode> {
    let mut config = load_config(&args.common)?;
    apply_run_overrides(&mut config, &args);
    config.validate().context("Configuration validation failed")?;

    if !args.template_path.is_file() {
        return Err(anyhow!("Template does not exist: {}", args.template_path.display()));
    }
    if config.mode != PipelineMode::Quality && config.quality.profile.is_some() {
        warn!("A regional profile is only used in quality mode (--quality)");
    }

    let output = match &args.output {
        Some(path) => path.clone(),
        None => RunRequest::default_output_path(&args.template_path, &config.language)?,
    };

    let context = ContextComposer::from_config(&config.context, &config.source_language, &config.language)?.build();
    let backend = backend_from_config(&config.translation)?;
    let review: Arc<dyn ReviewSink> = match &config.review_output {
        Some(path) => Arc::new(JsonlReviewSink::open(path)?),
        None => Arc::new(LogReviewSink),
    };

    let driver = PipelineDriver::new(config, backend, context, Arc::new(ProgressBarSink::new()), review);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            interrupt.cancel();
        }
    });

    let mut request = RunRequest::new(&args.template_path, output);
    if let Some(batch_size) = args.batch_size {
        request = request.with_batch_size(batch_size);
    }

    let report = driver.run(&request, cancel).await;

    if !report.failed_keys.is_empty() {
        warn!("{} entries could not be translated:", report.failed_keys.len());
        for key in &report.failed_keys {
            warn!("  - {:?}", key);
        }
    }
    if report.counts.needs_review > 0 {
        info!("{} translations are waiting for review", report.counts.needs_review);
    }
    info!("Output: {}", report.output_path.display());

    Ok(ExitCode::from(report.status.exit_code() as u8))
}

async fn run_check(args: BackendArgs) -> Result<ExitCode> {
    let config = load_config(&args)?;
    config.validate().context("Configuration validation failed")?;

    let backend = backend_from_config(&config.translation)?;
    info!("Checking connection to {} ({})", backend.name(), config.translation.get_model());

    match backend.check().await {
        Ok(()) => {
            info!("{} is reachable", backend.name());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{} check failed: {}", backend.name(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}
