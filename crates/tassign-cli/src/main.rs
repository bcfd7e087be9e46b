mod config;
mod inspect;
mod solve;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::TassignConfig;
use console::style;
use indexmap::IndexMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tassign_solver::{ConfigLoader, MessageLevel, Properties, SessionSettings, SolverSession};

#[derive(Parser, Debug)]
#[command(name = "tassign")]
#[command(about = "Instructor assignment solver")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Folder holding backups (overrides tassign.toml and TASSIGN_BACKUP_DIR)
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    /// Ignore TASSIGN_* environment variables
    #[arg(long, global = true)]
    no_env: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a problem snapshot and solve it
    Solve(solve::SolveArgs),

    /// Restore a backup and continue solving it
    Resume(solve::ResumeArgs),

    /// Show the solution and progress log stored in a backup
    Status(inspect::StatusArgs),

    /// Export a backup, optionally anonymized
    Export(inspect::ExportArgs),

    /// List teaching requests of a backup as JSON
    Requests(inspect::RequestsArgs),

    /// Remove old backups and leftover partial files
    Gc(inspect::GcArgs),
}

/// Minimal progress message level to print
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum Level {
    Trace,
    Debug,
    Info,
    #[default]
    Stage,
    Warn,
    Error,
    Fatal,
}

impl From<Level> for MessageLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Trace => MessageLevel::Trace,
            Level::Debug => MessageLevel::Debug,
            Level::Info => MessageLevel::Info,
            Level::Stage => MessageLevel::Stage,
            Level::Warn => MessageLevel::Warn,
            Level::Error => MessageLevel::Error,
            Level::Fatal => MessageLevel::Fatal,
        }
    }
}

/// Configuration shared by every subcommand
pub struct AppContext {
    pub loader: ConfigLoader,
    pub settings: SessionSettings,
    pub properties: Properties,
}

impl AppContext {
    fn build(args: &Args) -> Result<Self> {
        let config = TassignConfig::load_from_cwd()
            .context("Failed to load tassign.toml")?
            .unwrap_or_default();
        let loader = ConfigLoader::new(!args.no_env);

        let mut settings = config.settings();
        for source in loader.apply_env(&mut settings) {
            log::debug!("Session setting taken from {}", source.as_str());
        }
        if let Some(dir) = &args.backup_dir {
            settings.backup_dir = dir.clone();
        }

        Ok(Self {
            loader,
            settings,
            properties: config.properties(),
        })
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_target(false)
        .init();
}

/// Prints a solution info map as aligned key/value lines.
pub fn print_info(title: &str, info: Option<&IndexMap<String, String>>) {
    let Some(info) = info else {
        println!("{} {}", style(title).cyan().bold(), style("none").dim());
        return;
    };
    println!("{}", style(title).cyan().bold());
    let width = info.keys().map(|k| k.len()).max().unwrap_or(0);
    for (key, value) in info {
        println!("  {:width$}  {}", key, style(value).white().bold(), width = width);
    }
}

/// Prints progress log messages at or above the given level.
pub fn print_messages(session: &SolverSession, level: Level) {
    for message in session.progress_messages(level.into()) {
        let line = message.to_string();
        match message.level {
            MessageLevel::Fatal | MessageLevel::Error => eprintln!("{}", style(line).red()),
            MessageLevel::Warn => eprintln!("{}", style(line).yellow()),
            MessageLevel::Stage => println!("{}", style(line).green()),
            _ => println!("{}", style(line).dim()),
        }
    }
}

fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(args.verbose);
    let ctx = AppContext::build(&args)?;

    match args.command {
        Commands::Solve(solve_args) => solve::execute(solve_args, &ctx),
        Commands::Resume(resume_args) => solve::resume(resume_args, &ctx),
        Commands::Status(status_args) => inspect::status(status_args, &ctx),
        Commands::Export(export_args) => inspect::export(export_args, &ctx),
        Commands::Requests(requests_args) => inspect::requests(requests_args, &ctx),
        Commands::Gc(gc_args) => inspect::gc(gc_args, &ctx),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
