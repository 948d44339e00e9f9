//! Terminal surface: one-shot edits and queries, plus `run`, the live
//! reminder loop fed by stdin.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::clock::SystemClock;
use crate::config;
use crate::export;
use crate::medications::MedicationError;
use crate::models::{Medication, MedicationInput};
use crate::notify::TerminalSink;
use crate::persistence::{MemoryPersistence, Persistence, PersistenceError, SqlitePersistence};
use crate::runtime::{spawn_session, SessionHandle};
use crate::scheduler::ReminderTimings;
use crate::session::{DashboardSummary, ReminderSession};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Medication(#[from] MedicationError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// MediCare: daily medication reminders with escalating alerts.
#[derive(Parser, Debug)]
#[command(name = "medicare", version, about)]
pub struct Cli {
    /// Data directory (defaults to $MEDICARE_DATA_DIR, then ~/MediCare).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is saved.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Output format for list and status.
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Never ring the terminal bell.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a medication.
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        dosage: String,

        /// Time of day, 24-hour HH:MM.
        #[arg(long)]
        time: String,

        #[arg(long, default_value = "daily")]
        frequency: String,

        /// Pills on hand.
        #[arg(long)]
        stock: Option<u32>,

        /// Warn when stock falls to this many pills.
        #[arg(long)]
        refill_alert: Option<u32>,
    },

    /// Change a medication; omitted fields keep their value.
    Edit {
        /// Id, id prefix, or name.
        selector: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        dosage: Option<String>,

        #[arg(long)]
        time: Option<String>,

        #[arg(long)]
        frequency: Option<String>,

        #[arg(long)]
        stock: Option<u32>,

        #[arg(long)]
        refill_alert: Option<u32>,
    },

    /// Delete a medication.
    Remove {
        /// Id, id prefix, or name.
        selector: String,
    },

    /// Show all medications ordered by time.
    List,

    /// Mark a medication as taken (the next pending one if omitted).
    Confirm {
        /// Id, id prefix, or name.
        selector: Option<String>,
    },

    /// Adherence, streak and what is next.
    Status,

    /// Write a CSV export.
    Export {
        #[command(subcommand)]
        target: ExportTarget,
    },

    /// Stay in the foreground and deliver reminders.
    Run,
}

#[derive(Subcommand, Debug)]
pub enum ExportTarget {
    /// `time,name,dosage` per medication.
    Schedule {
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Confirmation history with status.
    History {
        /// Output file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ═══════════════════════════════════════════
// Dispatch
// ═══════════════════════════════════════════

pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let interactive = matches!(cli.command, Commands::Run);
    let sink = Arc::new(TerminalSink {
        quiet: cli.quiet || !std::io::stdout().is_terminal(),
        stderr: !interactive,
    });
    let mut session = ReminderSession::new(
        open_persistence(&cli)?,
        sink,
        Arc::new(SystemClock),
        ReminderTimings::default(),
    );
    if interactive {
        session.start()?;
        return run_interactive(session).await;
    }

    // One-shot commands only report stock for the medication they touch
    session.load()?;
    let result = run_once(&mut session, cli.command, cli.format);
    session.shutdown();
    result
}

fn open_persistence(cli: &Cli) -> Result<Box<dyn Persistence>, CliError> {
    if cli.ephemeral {
        tracing::info!("Ephemeral session, nothing will be saved");
        return Ok(Box::new(MemoryPersistence::new()));
    }
    let data_dir = cli.data_dir.clone().unwrap_or_else(config::app_data_dir);
    let path = config::database_path(&data_dir);
    Ok(Box::new(SqlitePersistence::open(&path)?))
}

fn run_once(
    session: &mut ReminderSession,
    command: Commands,
    format: OutputFormat,
) -> Result<(), CliError> {
    match command {
        Commands::Add {
            name,
            dosage,
            time,
            frequency,
            stock,
            refill_alert,
        } => {
            let med = session.add(&MedicationInput {
                name,
                dosage,
                time,
                frequency,
                stock,
                refill_alert,
            })?;
            println!("{}", med.id);
        }
        Commands::Edit {
            selector,
            name,
            dosage,
            time,
            frequency,
            stock,
            refill_alert,
        } => {
            let id = session.resolve(&selector)?;
            let current = session
                .store()
                .get(id)
                .ok_or_else(|| MedicationError::NotFound(selector.clone()))?;
            let input = MedicationInput {
                name: name.unwrap_or_else(|| current.name.clone()),
                dosage: dosage.unwrap_or_else(|| current.dosage.clone()),
                time: time.unwrap_or_else(|| current.time.to_string()),
                frequency: frequency.unwrap_or_else(|| current.frequency.clone()),
                stock: stock.or(current.stock),
                refill_alert: refill_alert.or(current.refill_alert),
            };
            session.update(id, &input)?;
        }
        Commands::Remove { selector } => {
            let id = session.resolve(&selector)?;
            session.remove(id)?;
        }
        Commands::List => {
            let meds = session.store().list_by_time();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&meds)?),
                OutputFormat::Text => {
                    if meds.is_empty() {
                        println!("No medications scheduled.");
                    }
                    for med in meds {
                        println!("{}", format_medication(med));
                    }
                }
            }
        }
        Commands::Confirm { selector } => match selector {
            Some(selector) => {
                let id = session.resolve(&selector)?;
                session.confirm(id)?;
            }
            None => {
                if session.confirm_next()?.is_none() {
                    println!("All medications taken for today.");
                }
            }
        },
        Commands::Status => print_summary(&session.summary(), format)?,
        Commands::Export { target } => {
            let (csv, output) = match target {
                ExportTarget::Schedule { output } => {
                    (export::schedule_csv(session.store().records()), output)
                }
                ExportTarget::History { output } => {
                    (export::history_csv(session.store().records()), output)
                }
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    tracing::info!(path = %path.display(), "Export written");
                }
                None => print!("{csv}"),
            }
        }
        Commands::Run => {}
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Interactive loop
// ═══════════════════════════════════════════

/// A line typed while `run` is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinCommand {
    Confirm(String),
    Next,
    Status,
    Help,
    Quit,
    Empty,
}

pub fn parse_stdin_command(line: &str) -> Result<StdinCommand, String> {
    let line = line.trim();
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(v, r)| (v, r.trim()));

    match verb.to_lowercase().as_str() {
        "" => Ok(StdinCommand::Empty),
        "confirm" | "c" if rest.is_empty() => Ok(StdinCommand::Next),
        "confirm" | "c" => Ok(StdinCommand::Confirm(rest.to_string())),
        "next" | "n" => Ok(StdinCommand::Next),
        "status" | "s" => Ok(StdinCommand::Status),
        "help" | "?" => Ok(StdinCommand::Help),
        "quit" | "exit" | "q" => Ok(StdinCommand::Quit),
        other => Err(format!("Unknown command: {other} (try 'help')")),
    }
}

const HELP: &str = "Commands: confirm <name|id>, next, status, quit";

async fn run_interactive(session: ReminderSession) -> Result<(), CliError> {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let (handle, mut task) = spawn_session(session, ctrl_c);

    println!("{} {} running. {HELP}", config::APP_NAME, config::APP_VERSION);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            finished = &mut task => {
                finished?;
                return Ok(());
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !dispatch_line(&handle, &line).await? {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    handle.shutdown().await;
    task.await?;
    Ok(())
}

/// Returns false when the user asked to quit.
async fn dispatch_line(handle: &SessionHandle, line: &str) -> Result<bool, CliError> {
    match parse_stdin_command(line) {
        Ok(StdinCommand::Confirm(selector)) => {
            handle.confirm(selector).await;
        }
        Ok(StdinCommand::Next) => {
            handle.confirm_next().await;
        }
        Ok(StdinCommand::Status) => {
            if let Some(summary) = handle.status().await {
                print_summary(&summary, OutputFormat::Text)?;
            }
        }
        Ok(StdinCommand::Help) => println!("{HELP}"),
        Ok(StdinCommand::Quit) => return Ok(false),
        Ok(StdinCommand::Empty) => {}
        Err(message) => println!("{message}"),
    }
    Ok(true)
}

// ═══════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════

fn short_id(med: &Medication) -> String {
    med.id.to_string().chars().take(8).collect()
}

fn format_medication(med: &Medication) -> String {
    let mut line = format!(
        "{}  {:<20} {:<12} {}  {}",
        med.time,
        med.name,
        med.dosage,
        if med.taken { "taken  " } else { "pending" },
        short_id(med)
    );
    if let Some(stock) = med.stock {
        line.push_str(&format!("  stock {stock}"));
        if med.is_low_stock() {
            line.push_str(" (low)");
        }
    }
    line
}

pub fn format_summary(summary: &DashboardSummary) -> String {
    let mut out = format!(
        "Adherence: {}%  Streak: {}  Taken: {}/{}\nPending today: {}\n",
        summary.adherence_percent, summary.streak, summary.taken, summary.total, summary.pending
    );
    match &summary.next {
        Some(med) => out.push_str(&format!(
            "Next: {} {} ({})\n",
            med.time, med.name, med.dosage
        )),
        None => out.push_str("Next: nothing pending\n"),
    }
    if !summary.recent.is_empty() {
        out.push_str("Recent:\n");
        for med in &summary.recent {
            let at = med
                .taken_at
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default();
            out.push_str(&format!("  {at}  {} ({})\n", med.name, med.dosage));
        }
    }
    out
}

fn print_summary(summary: &DashboardSummary, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(summary)?),
        OutputFormat::Text => print!("{}", format_summary(summary)),
    }
    Ok(())
}
