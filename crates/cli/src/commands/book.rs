use chrono::NaiveDate;
use maitre_core::domain::reservation::ContactInfo;
use maitre_core::domain::time_slot::TimeSlot;
use maitre_db::{AdmissionOutcome, LedgerError};

use crate::commands::{
    ledger_error_class, ledger_failure, load_config, open_ledger, runtime, CommandResult,
    EXIT_CAPACITY, EXIT_INVALID_INPUT,
};

#[derive(Debug, Clone, Default)]
pub struct BookArgs {
    pub dates: Vec<NaiveDate>,
    pub party_size: u32,
    pub time_slot: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

/// Admits one reservation per date. Succeeds when at least one date was admitted.
pub fn run(args: BookArgs) -> CommandResult {
    if args.dates.is_empty() {
        return CommandResult::failure(
            "book",
            "invalid_input",
            "at least one --date is required",
            EXIT_INVALID_INPUT,
        );
    }

    let config = match load_config("book") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let time_slot = match args.time_slot.as_deref() {
        None => config.reservations.default_slot,
        Some(raw) => match TimeSlot::parse(raw) {
            Some(slot) if config.reservations.is_service_slot(slot) => slot,
            Some(slot) => {
                return CommandResult::failure(
                    "book",
                    "invalid_input",
                    format!("{slot} is not a service slot"),
                    EXIT_INVALID_INPUT,
                );
            }
            None => {
                return CommandResult::failure(
                    "book",
                    "invalid_input",
                    format!("unrecognized time slot `{raw}`"),
                    EXIT_INVALID_INPUT,
                );
            }
        },
    };

    let runtime = match runtime("book") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let contact = ContactInfo { name: args.name, email: args.email, phone: args.phone };
    let result = runtime.block_on(async {
        let (pool, ledger) = open_ledger(&config).await?;
        let outcomes = ledger
            .admit_many(&args.dates, Some(time_slot), args.party_size, contact, args.notes)
            .await
            .map_err(ledger_failure);
        pool.close().await;
        outcomes
    });

    match result {
        Ok(outcomes) => summarize(&outcomes, time_slot),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("book", error_class, message, exit_code)
        }
    }
}

type DateOutcome = (NaiveDate, Result<AdmissionOutcome, LedgerError>);

fn summarize(outcomes: &[DateOutcome], time_slot: TimeSlot) -> CommandResult {
    let lines: Vec<String> = outcomes
        .iter()
        .map(|(date, outcome)| match outcome {
            Ok(AdmissionOutcome::Admitted(reservation)) => {
                format!("{date} {time_slot}: admitted as reservation {}", reservation.id)
            }
            Ok(AdmissionOutcome::CapacityExceeded { availability }) => format!(
                "{date} {time_slot}: fully booked for {date}; max {} guests ({} remaining)",
                availability.max_capacity, availability.remaining
            ),
            Err(error) => format!("{date} {time_slot}: not recorded ({error})"),
        })
        .collect();

    let admitted = outcomes
        .iter()
        .any(|(_, outcome)| outcome.as_ref().is_ok_and(AdmissionOutcome::is_admitted));
    let first_error = outcomes.iter().find_map(|(_, outcome)| outcome.as_ref().err());

    match first_error {
        _ if admitted => CommandResult::success("book", lines.join("\n")),
        Some(error) => {
            let (error_class, exit_code) = ledger_error_class(error);
            CommandResult::failure("book", error_class, lines.join("\n"), exit_code)
        }
        None => {
            CommandResult::failure("book", "capacity_exceeded", lines.join("\n"), EXIT_CAPACITY)
        }
    }
}
