pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::book::BookArgs;

#[derive(Debug, Parser)]
#[command(
    name = "maitre",
    about = "Maitre operator CLI",
    long_about = "Operate the restaurant assistant: migrations, config inspection, knowledge base indexing, bookings and chat.",
    after_help = "Examples:\n  maitre doctor --json\n  maitre book --date 2025-07-04 --date 2025-07-05 --party-size 6 --time-slot 7pm\n  maitre reservations list --date 2025-07-04\n  maitre chat \"Do you have vegan options?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, capacity policy, documents and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Build the knowledge base from the configured documents directory")]
    Index,
    #[command(about = "Admit one reservation per --date against the capacity ledger")]
    Book {
        #[arg(long = "date", required = true, help = "Reservation date (YYYY-MM-DD); repeatable")]
        dates: Vec<NaiveDate>,
        #[arg(long, default_value_t = 2)]
        party_size: u32,
        #[arg(long, help = "Service slot such as 7pm or 19:00; defaults to the configured slot")]
        time_slot: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, help = "Special requests")]
        notes: Option<String>,
    },
    #[command(subcommand, about = "List reservations or change their status")]
    Reservations(ReservationsCommand),
    #[command(about = "Send one message through the booking orchestrator")]
    Chat { message: String },
}

#[derive(Debug, Subcommand)]
enum ReservationsCommand {
    List {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        time_slot: Option<String>,
    },
    SetStatus {
        id: i64,
        status: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Index => commands::index::run(),
        Command::Book { dates, party_size, time_slot, name, email, phone, notes } => {
            commands::book::run(BookArgs {
                dates,
                party_size,
                time_slot,
                name,
                email,
                phone,
                notes,
            })
        }
        Command::Reservations(ReservationsCommand::List { date, time_slot }) => {
            commands::reservations::list(date, time_slot)
        }
        Command::Reservations(ReservationsCommand::SetStatus { id, status }) => {
            commands::reservations::set_status(id, &status)
        }
        Command::Chat { message } => commands::chat::run(&message),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
