//! Commands working on sessions backed up in the backup folder.

use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tassign_solver::backup::BACKUP_TYPE;
use tassign_solver::{BackupStore, MemorySource, ProblemSnapshot, RequestFilter, SolverSession};

use crate::solve::services;
use crate::{print_info, print_messages, AppContext, Level};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Backup id
    pub id: String,

    /// Minimal progress message level to print
    #[arg(long, value_enum, default_value_t = Level::Stage)]
    pub level: Level,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Backup id
    pub id: String,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keep instructor, course and room names
    #[arg(long)]
    pub names: bool,

    /// Replace identifiers with sequential numbers
    #[arg(long)]
    pub convert_ids: bool,

    /// Leave the solver configuration out
    #[arg(long)]
    pub no_configuration: bool,
}

#[derive(Args, Debug)]
pub struct RequestsArgs {
    /// Backup id
    pub id: String,

    /// Only requests with an assigned instructor
    #[arg(long, conflicts_with = "unassigned")]
    pub assigned: bool,

    /// Only requests still waiting for an instructor
    #[arg(long)]
    pub unassigned: bool,

    /// Only requests of this subject area
    #[arg(long)]
    pub subject_area: Option<i64>,
}

/// Restores a backup into a fresh session. The backup file is kept.
pub(crate) fn restore_backup(ctx: &AppContext, id: &str, save: Option<&Path>) -> Result<SolverSession> {
    let folder = &ctx.settings.backup_dir;
    if !BackupStore::new(folder).has(BACKUP_TYPE, id) {
        bail!("No backup {} in {}", id, folder.display());
    }

    let source = Arc::new(MemorySource::new(ProblemSnapshot::default()));
    let session = SolverSession::new(id, services(ctx, source, save));
    session
        .restore(folder, id, false)
        .with_context(|| format!("Failed to restore backup {}", id))?;
    Ok(session)
}

pub fn status(args: StatusArgs, ctx: &AppContext) -> Result<i32> {
    let session = restore_backup(ctx, &args.id, None)?;

    println!("{} {}", style("Backup").green().bold(), style(&args.id).white().bold());
    if let Some(loaded) = session.loaded_date() {
        println!("  Loaded     {}", loaded.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("  Warnings   {}", session.warning_count());
    println!();
    print_messages(&session, args.level);
    println!();
    print_info("Current solution", session.current_solution_info().as_ref());
    print_info("Best solution", session.best_solution_info().as_ref());

    session.dispose();
    Ok(0)
}

pub fn export(args: ExportArgs, ctx: &AppContext) -> Result<i32> {
    let session = restore_backup(ctx, &args.id, None)?;

    let mut options = ctx.settings.export_options();
    options.names |= args.names;
    options.convert_ids |= args.convert_ids;
    if args.no_configuration {
        options.configuration = false;
    }

    let data = session.export_with(options).context("Failed to export session")?;
    session.dispose();

    match &args.output {
        Some(path) => {
            std::fs::write(path, &data).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Exported {} to {}", style("Success:").green().bold(), args.id, path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            writeln!(stdout)?;
        }
    }
    Ok(0)
}

pub fn requests(args: RequestsArgs, ctx: &AppContext) -> Result<i32> {
    let session = restore_backup(ctx, &args.id, None)?;

    let mut filter = if args.assigned {
        RequestFilter::assigned()
    } else if args.unassigned {
        RequestFilter::unassigned()
    } else {
        RequestFilter::default()
    };
    if let Some(area) = args.subject_area {
        filter = filter.with_subject_area(area);
    }

    let requests = session.teaching_requests(filter)?;
    session.dispose();

    println!(
        "{}",
        serde_json::to_string_pretty(&requests).context("Failed to serialize teaching requests")?
    );
    Ok(0)
}

#[derive(Args, Debug)]
pub struct GcArgs {
    /// Remove backups older than this many hours
    #[arg(long, default_value = "168")]
    pub older_than: u64,
}

pub fn gc(args: GcArgs, ctx: &AppContext) -> Result<i32> {
    let store = BackupStore::new(&ctx.settings.backup_dir);
    let freed = store
        .gc(BACKUP_TYPE, Duration::from_secs(args.older_than * 3600))
        .with_context(|| format!("Failed to clean {}", store.root().display()))?;
    println!(
        "{} Freed {} bytes in {}",
        style("Success:").green().bold(),
        freed,
        store.root().display()
    );
    Ok(0)
}
