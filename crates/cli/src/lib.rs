pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use crate::commands::{CommandResult, EXIT_COMMAND};

#[derive(Debug, Parser)]
#[command(
    name = "outreach",
    about = "Outreach operator CLI",
    long_about = "Inspect the lead queue, clear quarantined leads and run single pipeline stages on demand.",
    after_help = "Examples:\n  outreach doctor --json\n  outreach queue\n  outreach research jane@acme.test\n  outreach send jane@acme.test --step 2\n  outreach batch research --limit 5"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, sender identities, operator channel and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show lead counts per status and the quarantined count")]
    Queue,
    #[command(about = "List leads with recorded errors")]
    Quarantine {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    #[command(about = "Reset a lead's error count, optionally moving it to another status")]
    Clear {
        email: String,
        #[arg(long, help = "Status to reset the lead to, e.g. `scraped` or `ready`")]
        status: Option<String>,
    },
    #[command(about = "Research one scraped lead")]
    Research { email: String },
    #[command(about = "Draft the email sequence for one researched lead")]
    Draft { email: String },
    #[command(about = "Send one step of a lead's sequence")]
    Send {
        email: String,
        #[arg(long, default_value_t = 1)]
        step: u8,
    },
    #[command(about = "Run one stage as a batch: discovery, research, outreach, send-1, send-2, send-3")]
    Batch {
        stage: String,
        #[arg(long)]
        limit: Option<u32>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run() },
        Command::Doctor { json } => {
            let (passed, output) = commands::doctor::run(json);
            CommandResult { exit_code: if passed { 0 } else { EXIT_COMMAND }, output }
        }
        Command::Queue => commands::queue::run(),
        Command::Quarantine { limit } => commands::quarantine::run(limit),
        Command::Clear { email, status } => commands::clear::run(&email, status.as_deref()),
        Command::Research { email } => commands::stage::research(&email),
        Command::Draft { email } => commands::stage::draft(&email),
        Command::Send { email, step } => commands::stage::send(&email, step),
        Command::Batch { stage, limit } => commands::batch::run(&stage, limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
