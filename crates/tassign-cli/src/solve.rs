//! Solve and resume commands - run the solver in a session and report the outcome.

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tassign_solver::{
    DataSource, GreedyEngine, JsonSolutionSaver, JsonSource, Properties, SessionServices, SessionState,
    SolverSession,
};

use crate::inspect::restore_backup;
use crate::{print_info, print_messages, AppContext, Level};

#[derive(Args, Debug)]
pub struct SolveArgs {
    /// Problem snapshot (JSON)
    pub snapshot: PathBuf,

    /// Solver properties file (JSON object)
    #[arg(short, long)]
    pub properties: Option<PathBuf>,

    /// Set a solver property (can be used multiple times)
    #[arg(short = 'D', value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub define: Vec<String>,

    /// Session owner
    #[arg(long, default_value = "cli")]
    pub owner: String,

    /// Stop after loading, leaving the initial assignment in place
    #[arg(long)]
    pub no_solve: bool,

    /// Search time limit in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write the resulting assignments to this file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Back the session up under this id when done
    #[arg(long, value_name = "ID")]
    pub backup: Option<String>,

    /// Minimal progress message level to print
    #[arg(long, value_enum, default_value_t = Level::Stage)]
    pub level: Level,
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Backup id
    pub id: String,

    /// Set a solver property (can be used multiple times)
    #[arg(short = 'D', value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub define: Vec<String>,

    /// Search time limit in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Write the resulting assignments to this file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Minimal progress message level to print
    #[arg(long, value_enum, default_value_t = Level::Stage)]
    pub level: Level,
}

/// Parses KEY=VALUE defines; a bare key is set to "true".
fn parse_defines(defines: &[String]) -> Properties {
    let mut properties = Properties::new();
    for define in defines {
        match define.split_once('=') {
            Some((key, value)) => properties.set(key.trim(), value.trim()),
            None => properties.set(define.trim(), "true"),
        }
    }
    properties
}

pub(crate) fn services(ctx: &AppContext, source: Arc<dyn DataSource>, save: Option<&Path>) -> SessionServices {
    let services =
        SessionServices::new(source, Arc::new(GreedyEngine::new())).with_settings(ctx.settings.clone());
    match save {
        Some(path) => services.with_saver(Arc::new(JsonSolutionSaver::new(path))),
        None => services,
    }
}

/// Runs the search to completion and saves when asked.
fn solve_and_save(session: &SolverSession, save: bool) -> Result<()> {
    if session.state() == SessionState::Ready {
        println!("{} Solving ...", style("Solver").green().bold());
        session.start().context("Failed to start the solver")?;
        session.wait();
    }

    if save && session.state() == SessionState::Ready {
        session.save().context("Failed to save the solution")?;
        session.wait();
    }
    Ok(())
}

fn report(session: &SolverSession, level: Level) {
    print_messages(session, level);
    println!();
    print_info("Current solution", session.current_solution_info().as_ref());
    print_info("Best solution", session.best_solution_info().as_ref());
}

pub fn execute(args: SolveArgs, ctx: &AppContext) -> Result<i32> {
    let mut command = Properties::new();
    if let Some(timeout) = args.timeout {
        command.set("Termination.TimeOut", timeout);
    }
    command.extend(&parse_defines(&args.define));

    let mut properties = ctx.loader.load_properties(None, &Properties::new())?;
    properties.extend(&ctx.properties);
    if let Some(file) = &args.properties {
        properties.extend(&ctx.loader.load_properties_file(file)?);
    }
    properties.extend(&command);

    if !args.snapshot.exists() {
        bail!("Snapshot {} does not exist", args.snapshot.display());
    }

    let source = Arc::new(JsonSource::new(&args.snapshot));
    let session = SolverSession::new(args.owner.as_str(), services(ctx, source, args.save.as_deref()));

    println!(
        "{} Loading {}",
        style("Solver").green().bold(),
        style(args.snapshot.display()).white().bold()
    );
    session.load(&properties).context("Failed to start loading")?;
    session.wait();

    if session.state() == SessionState::Disposed {
        print_messages(&session, Level::Warn);
        bail!("Unable to load {}", args.snapshot.display());
    }

    if args.no_solve {
        if args.save.is_some() {
            session.save().context("Failed to save the solution")?;
            session.wait();
        }
    } else {
        solve_and_save(&session, args.save.is_some())?;
    }

    if let Some(id) = &args.backup {
        let path = session
            .backup(&ctx.settings.backup_dir, id)
            .with_context(|| format!("Failed to back up session as {}", id))?;
        println!("{} Backup written to {}", style("Success:").green().bold(), path.display());
    }

    report(&session, args.level);
    let code = if session.has_fatal() { 1 } else { 0 };
    session.dispose();
    Ok(code)
}

pub fn resume(args: ResumeArgs, ctx: &AppContext) -> Result<i32> {
    let session = restore_backup(ctx, &args.id, args.save.as_deref())?;

    let mut command = Properties::new();
    if let Some(timeout) = args.timeout {
        command.set("Termination.TimeOut", timeout);
    }
    command.extend(&parse_defines(&args.define));
    if !command.is_empty() {
        let mut properties = session.properties();
        properties.extend(&command);
        session.set_properties(&properties)?;
    }

    solve_and_save(&session, args.save.is_some())?;

    let path = session
        .backup(&ctx.settings.backup_dir, &args.id)
        .with_context(|| format!("Failed to back up session as {}", args.id))?;
    println!("{} Backup updated at {}", style("Success:").green().bold(), path.display());

    report(&session, args.level);
    let code = if session.has_fatal() { 1 } else { 0 };
    session.dispose();
    Ok(code)
}
