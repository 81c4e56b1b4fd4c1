//! CLI smoke entry point.
//!
//! # Responsibility
//! - Walk one parcel through the lifecycle against a real database file.
//! - Show that the registered-only gate rejects late edits and deletes.
//!
//! Reads `PARCEL_DB_PATH` (default `tracker.db`), `PARCEL_LOG_DIR` (optional,
//! absolute) and `PARCEL_LOG_LEVEL`.

use log::error;
use parcel_core::db::open_db;
use parcel_core::{
    default_log_level, init_logging, ClientId, ParcelService, SqliteParcelRepository,
};
use std::error::Error;
use std::process::ExitCode;

const DEFAULT_DB_PATH: &str = "tracker.db";
const DEMO_CLIENT: ClientId = 1000;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("PARCEL_LOG_DIR") {
        let level = std::env::var("PARCEL_LOG_LEVEL")
            .unwrap_or_else(|_| default_log_level().to_string());
        init_logging(&level, &log_dir)?;
    }

    let db_path = std::env::var("PARCEL_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let conn = open_db(&db_path)?;
    let service = ParcelService::new(SqliteParcelRepository::try_new(&conn)?);

    println!("parcel_core version={}", parcel_core::core_version());

    let parcel = service.register(DEMO_CLIENT, "Pskov, Vokzalnaya st, 4")?;
    println!(
        "registered number={} client={} created_at={}",
        parcel.number, parcel.client, parcel.created_at
    );

    service.change_address(parcel.number, "Saratov, Sadovaya st, 21")?;
    let status = service.next_status(parcel.number)?;
    println!("number={} status={status}", parcel.number);

    if let Err(err) = service.change_address(parcel.number, "Moscow, Tverskaya st, 1") {
        println!("address change rejected: {err}");
    }
    if let Err(err) = service.delete(parcel.number) {
        println!("delete rejected: {err}");
    }

    let spare = service.register(DEMO_CLIENT, "Tula, Lenina st, 10")?;
    service.delete(spare.number)?;
    println!("deleted number={}", spare.number);

    for parcel in service.client_parcels(DEMO_CLIENT)? {
        println!(
            "number={} status={} address={} created_at={}",
            parcel.number, parcel.status, parcel.address, parcel.created_at
        );
    }

    Ok(())
}
