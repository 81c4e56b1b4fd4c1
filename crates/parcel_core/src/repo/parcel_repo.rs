//! Parcel repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Translate parcel lifecycle operations into single SQL statements.
//! - Enforce the `registered`-only gate for address edits and deletion
//!   inside the mutating statement itself.
//!
//! # Invariants
//! - Gated writes fold the identity and status predicates into one
//!   `UPDATE`/`DELETE`; no read-then-write sequence is used.
//! - Unchecked writes report success when zero rows match.
//! - Read paths reject undecodable rows instead of masking them.
//! - Nothing is cached; SQLite is the only source of truth.

use crate::db::DbError;
use crate::model::parcel::{ClientId, Parcel, ParcelNumber, ParcelStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const PARCEL_SELECT_SQL: &str = "SELECT
    number,
    client,
    status,
    address,
    created_at
FROM parcel";

const PARCEL_COLUMNS: [&str; 5] = ["number", "client", "status", "address", "created_at"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for parcel persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// No parcel with this number exists.
    NotFound(ParcelNumber),
    /// The parcel exists but its status forbids the requested mutation.
    PreconditionFailed {
        number: ParcelNumber,
        status: ParcelStatus,
    },
    /// Storage failure while running `op`.
    Store { op: &'static str, source: DbError },
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(number) => write!(f, "parcel not found: {number}"),
            Self::PreconditionFailed { number, status } => write!(
                f,
                "parcel {number} is `{status}`; only `registered` parcels can be changed"
            ),
            Self::Store { op, source } => write!(f, "parcel {op} failed: {source}"),
            Self::InvalidData(message) => write!(f, "invalid persisted parcel data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store { source, .. } => Some(source),
            Self::NotFound(_)
            | Self::PreconditionFailed { .. }
            | Self::InvalidData(_)
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl RepoError {
    /// Returns whether this error is the `NotFound` signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Repository interface for the parcel lifecycle.
pub trait ParcelRepository {
    /// Inserts `parcel` and returns the store-assigned number.
    ///
    /// `parcel.number` is ignored.
    fn add(&self, parcel: &Parcel) -> RepoResult<ParcelNumber>;
    /// Fetches one parcel; `RepoError::NotFound` when no row matches.
    fn get(&self, number: ParcelNumber) -> RepoResult<Parcel>;
    /// Fetches all parcels of `client` in store order.
    fn get_by_client(&self, client: ClientId) -> RepoResult<Vec<Parcel>>;
    /// Sets `status` regardless of the current one. Zero matches is `Ok`.
    fn set_status(&self, number: ParcelNumber, status: ParcelStatus) -> RepoResult<()>;
    /// Sets `address` only while `registered`. A suppressed write is `Ok`.
    fn set_address(&self, number: ParcelNumber, address: &str) -> RepoResult<()>;
    /// Deletes only while `registered`. A suppressed delete is `Ok`.
    fn delete(&self, number: ParcelNumber) -> RepoResult<()>;
    /// Like `set_address`, but reports why zero rows changed.
    fn set_address_checked(&self, number: ParcelNumber, address: &str) -> RepoResult<()>;
    /// Like `delete`, but reports why zero rows changed.
    fn delete_checked(&self, number: ParcelNumber) -> RepoResult<()>;
    /// Moves `number` from `from` to `to` in one guarded statement.
    ///
    /// Returns `false` when the parcel is missing or not in `from`.
    fn advance_status(
        &self,
        number: ParcelNumber,
        from: ParcelStatus,
        to: ParcelStatus,
    ) -> RepoResult<bool>;
}

/// SQLite-backed parcel repository.
///
/// Borrows the connection; open one connection per thread for concurrent
/// callers.
pub struct SqliteParcelRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteParcelRepository<'conn> {
    /// Constructs a repository from a connection with the parcel schema.
    ///
    /// # Errors
    /// - `MissingRequiredTable` / `MissingRequiredColumn` when the schema was
    ///   not ensured on this connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_parcel_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn update_address(&self, number: ParcelNumber, address: &str) -> RepoResult<usize> {
        self.conn
            .execute(
                "UPDATE parcel
                 SET address = ?1
                 WHERE number = ?2
                   AND status = ?3;",
                params![address, number, ParcelStatus::Registered.as_str()],
            )
            .map_err(store_error("set_address"))
    }

    fn delete_registered(&self, number: ParcelNumber) -> RepoResult<usize> {
        self.conn
            .execute(
                "DELETE FROM parcel
                 WHERE number = ?1
                   AND status = ?2;",
                params![number, ParcelStatus::Registered.as_str()],
            )
            .map_err(store_error("delete"))
    }

    /// Explains a gated write that changed zero rows.
    ///
    /// Runs after the write, so it never guards the write itself.
    fn suppressed_write_error(&self, op: &'static str, number: ParcelNumber) -> RepoError {
        let status = self
            .conn
            .query_row(
                "SELECT status FROM parcel WHERE number = ?1;",
                [number],
                |row| row.get::<_, String>(0),
            )
            .optional();

        match status {
            Ok(None) => RepoError::NotFound(number),
            Ok(Some(text)) => match parse_status(&text) {
                Ok(status) => RepoError::PreconditionFailed { number, status },
                Err(err) => err,
            },
            Err(err) => store_error(op)(err),
        }
    }
}

impl ParcelRepository for SqliteParcelRepository<'_> {
    fn add(&self, parcel: &Parcel) -> RepoResult<ParcelNumber> {
        self.conn
            .execute(
                "INSERT INTO parcel (
                    client,
                    status,
                    address,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4);",
                params![
                    parcel.client,
                    parcel.status.as_str(),
                    parcel.address.as_str(),
                    parcel.created_at.as_str(),
                ],
            )
            .map_err(store_error("add"))?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get(&self, number: ParcelNumber) -> RepoResult<Parcel> {
        let row = self
            .conn
            .query_row(
                &format!("{PARCEL_SELECT_SQL} WHERE number = ?1;"),
                [number],
                ParcelRow::read,
            )
            .optional()
            .map_err(store_error("get"))?;

        match row {
            Some(row) => row.into_parcel(),
            None => Err(RepoError::NotFound(number)),
        }
    }

    fn get_by_client(&self, client: ClientId) -> RepoResult<Vec<Parcel>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PARCEL_SELECT_SQL} WHERE client = ?1;"))
            .map_err(store_error("get_by_client"))?;

        let rows = stmt
            .query_map([client], ParcelRow::read)
            .map_err(store_error("get_by_client"))?;

        let mut parcels = Vec::new();
        for row in rows {
            parcels.push(row.map_err(store_error("get_by_client"))?.into_parcel()?);
        }

        Ok(parcels)
    }

    fn set_status(&self, number: ParcelNumber, status: ParcelStatus) -> RepoResult<()> {
        self.conn
            .execute(
                "UPDATE parcel SET status = ?1 WHERE number = ?2;",
                params![status.as_str(), number],
            )
            .map_err(store_error("set_status"))?;

        Ok(())
    }

    fn set_address(&self, number: ParcelNumber, address: &str) -> RepoResult<()> {
        self.update_address(number, address)?;
        Ok(())
    }

    fn delete(&self, number: ParcelNumber) -> RepoResult<()> {
        self.delete_registered(number)?;
        Ok(())
    }

    fn set_address_checked(&self, number: ParcelNumber, address: &str) -> RepoResult<()> {
        if self.update_address(number, address)? == 0 {
            return Err(self.suppressed_write_error("set_address", number));
        }
        Ok(())
    }

    fn delete_checked(&self, number: ParcelNumber) -> RepoResult<()> {
        if self.delete_registered(number)? == 0 {
            return Err(self.suppressed_write_error("delete", number));
        }
        Ok(())
    }

    fn advance_status(
        &self,
        number: ParcelNumber,
        from: ParcelStatus,
        to: ParcelStatus,
    ) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute(
                "UPDATE parcel
                 SET status = ?1
                 WHERE number = ?2
                   AND status = ?3;",
                params![to.as_str(), number, from.as_str()],
            )
            .map_err(store_error("advance_status"))?;

        Ok(changed == 1)
    }
}

/// Raw row as stored, before status decoding.
struct ParcelRow {
    number: ParcelNumber,
    client: ClientId,
    status: String,
    address: String,
    created_at: String,
}

impl ParcelRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            number: row.get("number")?,
            client: row.get("client")?,
            status: row.get("status")?,
            address: row.get("address")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_parcel(self) -> RepoResult<Parcel> {
        Ok(Parcel {
            number: self.number,
            client: self.client,
            status: parse_status(&self.status)?,
            address: self.address,
            created_at: self.created_at,
        })
    }
}

fn parse_status(value: &str) -> RepoResult<ParcelStatus> {
    ParcelStatus::parse(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid status `{value}` in parcel.status"))
    })
}

fn store_error(op: &'static str) -> impl FnOnce(rusqlite::Error) -> RepoError {
    move |err| RepoError::Store {
        op,
        source: DbError::Sqlite(err),
    }
}

fn ensure_parcel_connection_ready(conn: &Connection) -> RepoResult<()> {
    if !table_exists(conn, "parcel")? {
        return Err(RepoError::MissingRequiredTable("parcel"));
    }

    for column in PARCEL_COLUMNS {
        if !table_has_column(conn, "parcel", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "parcel",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )
        .map_err(store_error("schema_check"))?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM pragma_table_info(?1)
                WHERE name = ?2
            );",
            [table, column],
            |row| row.get(0),
        )
        .map_err(store_error("schema_check"))?;
    Ok(exists == 1)
}
