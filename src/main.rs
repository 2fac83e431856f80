// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use texlate::app_config::{self, Config, EngineKind};
use texlate::app_controller::{Controller, OutputTarget};

/// CLI wrapper for EngineKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliEngine {
    Google,
    #[value(name = "deepl")]
    DeepL,
    #[value(name = "openai")]
    OpenAI,
}

impl From<CliEngine> for EngineKind {
    fn from(cli_engine: CliEngine) -> Self {
        match cli_engine {
            CliEngine::Google => EngineKind::Google,
            CliEngine::DeepL => EngineKind::DeepL,
            CliEngine::OpenAI => EngineKind::OpenAI,
        }
    }
}

/// CLI wrapper for LogLevel to implement ValueEnum
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

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for texlate
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// texlate - translate LaTeX documents while keeping their markup intact
#[derive(Parser, Debug)]
#[command(name = "texlate")]
#[command(version)]
#[command(about = "Markup-aware LaTeX document translator")]
#[command(long_about = "texlate translates the prose of LaTeX documents and leaves math, references and markup untouched.

EXAMPLES:
    texlate paper.tex                          # Writes paper.zh-CN.tex with the default config
    texlate -e deepl -t de paper.tex           # Translate to German with DeepL
    texlate -o out.tex paper.tex               # Choose the output file
    texlate --in-place --no-cache project/     # Translate every .tex file under a directory in place
    texlate completions bash > texlate.bash    # Generate bash completions

CONFIGURATION:
    Configuration is stored in texlate.json by default. If the file does not
    exist, a default one is created.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input .tex file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Output file (single document) or directory (directory mode)
    #[arg(short, long, conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Overwrite the source files
    #[arg(long)]
    in_place: bool,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Translation engine to use
    #[arg(short, long, value_enum)]
    engine: Option<CliEngine>,

    /// Source language code (e.g., 'en', 'fr')
    #[arg(short, long = "from")]
    source_language: Option<String>,

    /// Target language code (e.g., 'zh-CN', 'de')
    #[arg(short, long = "to")]
    target_language: Option<String>,

    /// Worker count (0 = engine default)
    #[arg(long, env = "TEXLATE_THREADS")]
    threads: Option<usize>,

    /// Disable the translation cache for this run
    #[arg(long)]
    no_cache: bool,

    /// JSON file with additional multi-argument commands
    #[arg(long, value_name = "FILE")]
    commands: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "texlate.json")]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Colored stderr logger; the level is the global max level so it can change after startup
struct CustomLogger;

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI color for level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "{}{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "texlate", &mut std::io::stdout());
        return Ok(());
    }

    let input_path = cli
        .input_path
        .clone()
        .ok_or_else(|| anyhow!("INPUT_PATH is required when no subcommand is specified"))?;
    run_translate(cli, &input_path).await
}

/// Apply command line overrides on top of the loaded configuration
fn apply_overrides(config: &mut Config, options: &CommandLineOptions) -> Result<()> {
    if let Some(engine) = &options.engine {
        config.engine = engine.clone().into();
    }
    if let Some(source_language) = &options.source_language {
        config.source_language = source_language.clone();
    }
    if let Some(target_language) = &options.target_language {
        config.target_language = target_language.clone();
    }
    if let Some(threads) = options.threads {
        config.runtime.threads = threads;
    }
    if options.no_cache {
        config.cache.enabled = false;
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
    if let Some(commands) = &options.commands {
        let count = config.load_commands_file(commands)?;
        info!("Loaded {} multi-argument commands from {}", count, commands.display());
    }
    Ok(())
}

async fn run_translate(options: CommandLineOptions, input_path: &Path) -> Result<()> {
    if let Some(level) = &options.log_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }

    let mut config = Config::load_or_create(&options.config_path)
        .with_context(|| format!("Failed to load configuration from {}", options.config_path.display()))?;
    apply_overrides(&mut config, &options)?;
    log::set_max_level(level_filter(&config.log_level));

    let output = match (&options.output, options.in_place) {
        (_, true) => OutputTarget::InPlace,
        (Some(path), false) => OutputTarget::Path(path.clone()),
        (None, false) => OutputTarget::Alongside,
    };

    info!(
        "Translating {} from {} to {} with {}",
        input_path.display(),
        config.source_language,
        config.target_language,
        config.engine.display_name()
    );
    let controller = Controller::with_config(config)?;
    controller.run(input_path, &output, options.force_overwrite).await
}
