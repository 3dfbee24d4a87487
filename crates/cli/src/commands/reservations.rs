use chrono::NaiveDate;
use maitre_core::domain::reservation::{
    Reservation, ReservationFilter, ReservationId, ReservationStatus,
};
use maitre_core::domain::time_slot::TimeSlot;

use crate::commands::{
    ledger_failure, load_config, open_ledger, runtime, CommandResult, EXIT_INVALID_INPUT,
};

pub fn list(date: Option<NaiveDate>, time_slot: Option<String>) -> CommandResult {
    let time_slot = match time_slot.as_deref().map(|raw| (raw, TimeSlot::parse(raw))) {
        None => None,
        Some((_, Some(slot))) => Some(slot),
        Some((raw, None)) => {
            return CommandResult::failure(
                "reservations.list",
                "invalid_input",
                format!("unrecognized time slot `{raw}`"),
                EXIT_INVALID_INPUT,
            );
        }
    };

    let config = match load_config("reservations.list") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("reservations.list") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let filter = ReservationFilter { date, time_slot };
    let result = runtime.block_on(async {
        let (pool, ledger) = open_ledger(&config).await?;
        let rows = ledger.list_reservations(&filter).await.map_err(ledger_failure);
        pool.close().await;
        rows
    });

    match result {
        Ok(rows) if rows.is_empty() => {
            CommandResult::success("reservations.list", "no reservations found")
        }
        Ok(rows) => CommandResult::success(
            "reservations.list",
            rows.iter().map(render_row).collect::<Vec<_>>().join("\n"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("reservations.list", error_class, message, exit_code)
        }
    }
}

pub fn set_status(id: i64, status: &str) -> CommandResult {
    let Some(status) = ReservationStatus::parse(status) else {
        return CommandResult::failure(
            "reservations.set_status",
            "invalid_input",
            format!("unknown reservation status `{status}` (expected pending|confirmed|cancelled)"),
            EXIT_INVALID_INPUT,
        );
    };

    let config = match load_config("reservations.set_status") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("reservations.set_status") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, ledger) = open_ledger(&config).await?;
        let updated =
            ledger.update_status(ReservationId(id), status).await.map_err(ledger_failure);
        pool.close().await;
        updated
    });

    match result {
        Ok(reservation) => {
            CommandResult::success("reservations.set_status", render_row(&reservation))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("reservations.set_status", error_class, message, exit_code)
        }
    }
}

fn render_row(reservation: &Reservation) -> String {
    let slot = reservation.time_slot.map(|slot| slot.label()).unwrap_or_else(|| "-".to_string());
    let name = reservation.contact.name.as_deref().unwrap_or("-");
    format!(
        "#{} {} {} party={} status={} name={}",
        reservation.id,
        reservation.date,
        slot,
        reservation.party_size,
        reservation.status.as_str(),
        name
    )
}
