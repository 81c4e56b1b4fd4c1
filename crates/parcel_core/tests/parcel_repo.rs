use parcel_core::db::{open_db, open_db_in_memory};
use parcel_core::{
    ClientId, Parcel, ParcelNumber, ParcelRepository, ParcelStatus, RepoError,
    SqliteParcelRepository,
};
use rusqlite::params;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

const WORKER_THREADS: usize = 8;

fn test_parcel() -> Parcel {
    Parcel::new(1000, "test", "2024-01-01T00:00:00Z")
}

fn add_sent(repo: &SqliteParcelRepository<'_>, address: &str) -> ParcelNumber {
    let mut parcel = test_parcel();
    parcel.address = address.to_string();
    let number = repo.add(&parcel).unwrap();
    repo.set_status(number, ParcelStatus::Sent).unwrap();
    number
}

#[test]
fn add_get_roundtrip_assigns_number() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let mut parcel = test_parcel();
    parcel.number = 42;
    let number = repo.add(&parcel).unwrap();
    assert_eq!(number, 1);

    parcel.number = number;
    assert_eq!(repo.get(number).unwrap(), parcel);
}

#[test]
fn numbers_are_not_reused_after_delete() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let first = repo.add(&test_parcel()).unwrap();
    let second = repo.add(&test_parcel()).unwrap();
    repo.delete(second).unwrap();

    let third = repo.add(&test_parcel()).unwrap();
    assert!(second > first);
    assert!(third > second);
}

#[test]
fn delete_registered_then_get_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = repo.add(&test_parcel()).unwrap();
    repo.delete(number).unwrap();

    let err = repo.get(number).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(n) if n == number));
    assert!(err.is_not_found());
}

#[test]
fn get_unknown_number_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();
    repo.add(&test_parcel()).unwrap();

    let err = repo.get(9_999).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(9_999)));
    assert!(err.source().is_none());
}

#[test]
fn set_address_updates_registered_parcel() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = repo.add(&test_parcel()).unwrap();
    repo.set_address(number, "new test address").unwrap();

    assert_eq!(repo.get(number).unwrap().address, "new test address");
}

#[test]
fn set_address_is_silently_ignored_once_sent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = add_sent(&repo, "original");
    repo.set_address(number, "X").unwrap();

    assert_eq!(repo.get(number).unwrap().address, "original");
}

#[test]
fn delete_is_silently_ignored_once_sent() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = add_sent(&repo, "original");
    repo.delete(number).unwrap();

    let kept = repo.get(number).unwrap();
    assert_eq!(kept.status, ParcelStatus::Sent);
    assert_eq!(kept.address, "original");
}

#[test]
fn set_status_is_visible_and_unconditional() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = repo.add(&test_parcel()).unwrap();
    repo.set_status(number, ParcelStatus::Sent).unwrap();
    assert_eq!(repo.get(number).unwrap().status, ParcelStatus::Sent);

    repo.set_status(number, ParcelStatus::Delivered).unwrap();
    repo.set_status(number, ParcelStatus::Registered).unwrap();
    assert_eq!(repo.get(number).unwrap().status, ParcelStatus::Registered);

    repo.set_address(number, "editable again").unwrap();
    assert_eq!(repo.get(number).unwrap().address, "editable again");
}

#[test]
fn writes_on_unknown_number_are_silent_no_ops() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    repo.set_status(77, ParcelStatus::Sent).unwrap();
    repo.set_address(77, "nowhere").unwrap();
    repo.delete(77).unwrap();

    assert!(repo.get(77).unwrap_err().is_not_found());
}

#[test]
fn get_by_client_returns_exactly_client_parcels() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let client = 7_654_321;
    let mut expected = HashMap::new();
    for address in ["first", "second", "third"] {
        let mut parcel = Parcel::new(client, address, "2024-01-01T00:00:00Z");
        parcel.number = repo.add(&parcel).unwrap();
        expected.insert(parcel.number, parcel);
    }
    repo.add(&Parcel::new(client + 1, "other", "2024-01-02T00:00:00Z"))
        .unwrap();
    repo.add(&test_parcel()).unwrap();

    let stored = repo.get_by_client(client).unwrap();
    assert_eq!(stored.len(), expected.len());
    for parcel in stored {
        assert_eq!(expected.get(&parcel.number), Some(&parcel));
    }

    assert!(repo.get_by_client(client + 2).unwrap().is_empty());
}

#[test]
fn lifecycle_scenario_blocks_changes_after_dispatch() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = repo.add(&test_parcel()).unwrap();
    assert_eq!(number, 1);

    repo.set_address(number, "new address").unwrap();
    assert_eq!(repo.get(number).unwrap().address, "new address");

    repo.set_status(number, ParcelStatus::Sent).unwrap();
    repo.set_address(number, "blocked").unwrap();
    assert_eq!(repo.get(number).unwrap().address, "new address");

    repo.delete(number).unwrap();
    assert_eq!(repo.get(number).unwrap().status, ParcelStatus::Sent);
}

#[test]
fn checked_writes_distinguish_gate_from_missing_row() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let registered = repo.add(&test_parcel()).unwrap();
    repo.set_address_checked(registered, "checked").unwrap();
    assert_eq!(repo.get(registered).unwrap().address, "checked");

    let sent = add_sent(&repo, "original");
    let address_err = repo.set_address_checked(sent, "X").unwrap_err();
    assert!(matches!(
        address_err,
        RepoError::PreconditionFailed { number, status: ParcelStatus::Sent } if number == sent
    ));
    let delete_err = repo.delete_checked(sent).unwrap_err();
    assert!(matches!(delete_err, RepoError::PreconditionFailed { .. }));
    assert_eq!(repo.get(sent).unwrap().address, "original");

    assert!(matches!(
        repo.set_address_checked(500, "X").unwrap_err(),
        RepoError::NotFound(500)
    ));
    assert!(matches!(
        repo.delete_checked(500).unwrap_err(),
        RepoError::NotFound(500)
    ));

    repo.delete_checked(registered).unwrap();
    assert!(repo.get(registered).unwrap_err().is_not_found());
}

#[test]
fn advance_status_only_applies_from_expected_state() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let number = repo.add(&test_parcel()).unwrap();
    assert!(!repo
        .advance_status(number, ParcelStatus::Sent, ParcelStatus::Delivered)
        .unwrap());
    assert!(repo
        .advance_status(number, ParcelStatus::Registered, ParcelStatus::Sent)
        .unwrap());
    assert_eq!(repo.get(number).unwrap().status, ParcelStatus::Sent);

    assert!(!repo
        .advance_status(404, ParcelStatus::Registered, ParcelStatus::Sent)
        .unwrap());
}

#[test]
fn unknown_persisted_status_is_reported_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO parcel (client, status, address, created_at)
         VALUES (?1, 'lost', 'somewhere', '2024-01-01T00:00:00Z');",
        params![1000],
    )
    .unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();

    let err = repo.get(1).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(message) if message.contains("lost")));
    assert!(matches!(
        repo.get_by_client(1000).unwrap_err(),
        RepoError::InvalidData(_)
    ));
}

#[test]
fn store_failures_keep_operation_context_and_cause() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();
    conn.execute_batch("DROP TABLE parcel;").unwrap();

    let err = repo.add(&test_parcel()).unwrap_err();
    assert!(matches!(err, RepoError::Store { op: "add", .. }));
    assert!(err.to_string().starts_with("parcel add failed"));
    assert!(err.source().is_some());

    assert!(matches!(
        repo.get(1).unwrap_err(),
        RepoError::Store { op: "get", .. }
    ));
    assert!(matches!(
        repo.set_address(1, "X").unwrap_err(),
        RepoError::Store {
            op: "set_address",
            ..
        }
    ));
    assert!(matches!(
        repo.get_by_client(1000).unwrap_err(),
        RepoError::Store {
            op: "get_by_client",
            ..
        }
    ));
    assert!(matches!(
        repo.set_status(1, ParcelStatus::Sent).unwrap_err(),
        RepoError::Store {
            op: "set_status",
            ..
        }
    ));
    assert!(matches!(
        repo.delete(1).unwrap_err(),
        RepoError::Store { op: "delete", .. }
    ));
}

#[test]
fn gate_holds_across_connections_to_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.db");
    let writer_conn = open_db(&path).unwrap();
    let other_conn = open_db(&path).unwrap();
    let writer = SqliteParcelRepository::try_new(&writer_conn).unwrap();
    let other = SqliteParcelRepository::try_new(&other_conn).unwrap();

    let number = writer.add(&test_parcel()).unwrap();
    other.set_status(number, ParcelStatus::Sent).unwrap();

    writer.set_address(number, "late edit").unwrap();
    writer.delete(number).unwrap();

    let seen = other.get(number).unwrap();
    assert_eq!(seen.address, "test");
    assert_eq!(seen.status, ParcelStatus::Sent);
}

#[test]
fn concurrent_connections_serialize_writes_on_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracker.db");
    let client = 31;
    let numbers: Vec<ParcelNumber> = {
        let conn = open_db(&path).unwrap();
        let repo = SqliteParcelRepository::try_new(&conn).unwrap();
        (0..50)
            .map(|i| {
                repo.add(&Parcel::new(client, format!("start {i}"), "2024-01-01T00:00:00Z"))
                    .unwrap()
            })
            .collect()
    };

    let barrier = Arc::new(Barrier::new(WORKER_THREADS));
    let workers: Vec<_> = (0..WORKER_THREADS)
        .map(|worker| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            let numbers = numbers.clone();
            thread::spawn(move || run_worker(&path, &barrier, worker, client, &numbers))
        })
        .collect();

    let failures: Vec<String> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();
    assert!(failures.is_empty(), "worker failures: {failures:?}");

    let conn = open_db(&path).unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();
    let stored = repo.get_by_client(client).unwrap();
    assert_eq!(stored.len(), numbers.len());
    for parcel in stored {
        assert!(matches!(
            parcel.status,
            ParcelStatus::Registered | ParcelStatus::Sent
        ));
    }
}

/// Even workers edit addresses, odd workers dispatch; all of them read.
fn run_worker(
    path: &Path,
    barrier: &Barrier,
    worker: usize,
    client: ClientId,
    numbers: &[ParcelNumber],
) -> Vec<String> {
    let mut failures = Vec::new();
    let conn = match open_db(path) {
        Ok(conn) => conn,
        Err(err) => {
            barrier.wait();
            return vec![format!("worker {worker} open: {err}")];
        }
    };
    let repo = match SqliteParcelRepository::try_new(&conn) {
        Ok(repo) => repo,
        Err(err) => {
            barrier.wait();
            return vec![format!("worker {worker} repo: {err}")];
        }
    };
    barrier.wait();

    for &number in numbers {
        let result = if worker % 2 == 0 {
            repo.set_address(number, &format!("worker {worker}"))
        } else {
            repo.set_status(number, ParcelStatus::Sent)
        };
        if let Err(err) = result {
            failures.push(format!("worker {worker} write {number}: {err}"));
        }
        if let Err(err) = repo.get_by_client(client) {
            failures.push(format!("worker {worker} read: {err}"));
        }
    }

    failures
}

#[test]
fn concurrent_open_of_fresh_file_creates_schema_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    let barrier = Arc::new(Barrier::new(WORKER_THREADS));

    let openers: Vec<_> = (0..WORKER_THREADS)
        .map(|worker| {
            let barrier = Arc::clone(&barrier);
            let path = path.clone();
            thread::spawn(move || {
                barrier.wait();
                let conn = open_db(&path).map_err(|err| format!("worker {worker}: {err}"))?;
                let repo = SqliteParcelRepository::try_new(&conn)
                    .map_err(|err| format!("worker {worker}: {err}"))?;
                repo.add(&Parcel::new(worker as i64, "fresh", "2024-01-01T00:00:00Z"))
                    .map_err(|err| format!("worker {worker}: {err}"))
            })
        })
        .collect();

    for opener in openers {
        opener.join().unwrap().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let repo = SqliteParcelRepository::try_new(&conn).unwrap();
    let total: usize = (0..WORKER_THREADS)
        .map(|worker| repo.get_by_client(worker as i64).unwrap().len())
        .sum();
    assert_eq!(total, WORKER_THREADS);
}
