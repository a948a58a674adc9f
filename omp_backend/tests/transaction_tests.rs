//! End-to-end tests of transaction scopes through the public API.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use omp_rust::db::{
    Cursor, Dialect, MemoryConnection, OmpError, OmpLock, OmpReadLock, ResultSet, Transact,
    Value,
};

/// Generic caller, as query layers are written.
fn count_rows<D: Transact>(db: &D, statement: &str) -> Result<usize, OmpError> {
    db.transaction(false, |c: &mut dyn Cursor| {
        c.execute(statement, &[])?;
        Ok(c.fetch_all()?.len())
    })
}

#[test]
fn test_read_only_manager_scenario() {
    let conn = MemoryConnection::new();
    let probe = conn.probe();
    let lock = OmpLock::new(conn, true);

    let err = lock
        .transaction(true, |_: &mut dyn Cursor| Ok::<_, OmpError>(()))
        .unwrap_err();
    assert!(err.is_policy_violation());
    assert!(!lock.is_locked());

    let rows = lock
        .transaction(false, |c: &mut dyn Cursor| {
            c.execute("SELECT 1", &[])?;
            c.fetch_all()
        })
        .unwrap();
    assert_eq!(rows, vec![vec![Value::Int(1)]]);
    assert_eq!(probe.commits(), 0);
    assert_eq!(probe.rollbacks(), 0);
}

#[test]
fn test_driver_error_scenario() {
    let conn = MemoryConnection::new().fail_on("UPDATE", "deadlock detected");
    let probe = conn.probe();
    let lock = OmpLock::new(conn, false);

    let err = lock
        .transaction(true, |c: &mut dyn Cursor| {
            c.execute("UPDATE ompobs SET el1=1", &[])
        })
        .unwrap_err();

    assert!(err.is_driver_error());
    assert!(err.to_string().contains("deadlock detected"));
    assert_eq!(probe.rollbacks(), 1);
    assert_eq!(probe.commits(), 0);
    assert_eq!(probe.open_cursors(), 0);
    assert!(!lock.is_locked());
}

#[test]
fn test_generic_callers_run_on_both_variants() {
    let rows = ResultSet::new(
        &["obsid"],
        vec![vec![Value::from("a")], vec![Value::from("b")]],
    );

    let write = OmpLock::new(
        MemoryConnection::new().respond("jcmt.COMMON", rows.clone()),
        false,
    );
    let read = OmpReadLock::new(
        MemoryConnection::new()
            .with_dialect(Dialect::Tds)
            .respond("jcmt..COMMON", rows),
    );

    assert_eq!(count_rows(&write, "SELECT obsid FROM jcmt.COMMON").unwrap(), 2);
    assert_eq!(count_rows(&read, "SELECT obsid FROM jcmt..COMMON").unwrap(), 2);
    assert_eq!(read.dialect(), Dialect::Tds);
}

#[test]
fn test_guard_released_for_other_threads_after_failures() {
    let conn = MemoryConnection::new().fail_on("broken", "server went away");
    let probe = conn.probe();
    let lock = Arc::new(OmpLock::new(conn, false));

    let failing = {
        let lock = Arc::clone(&lock);
        thread::spawn(move || {
            lock.transaction(true, |c: &mut dyn Cursor| c.execute("SELECT broken", &[]))
        })
    };
    assert!(failing.join().unwrap().is_err());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.transaction(false, |c: &mut dyn Cursor| {
                    c.execute(&format!("SELECT {}", i), &[])?;
                    c.fetch_one()
                })
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let row = handle.join().unwrap().unwrap();
        assert_eq!(row, Some(vec![Value::Int(i as i64)]));
    }
    assert_eq!(probe.max_open_cursors(), 1);
    assert_eq!(probe.open_cursors(), 0);
}

#[test]
fn test_scopes_are_serialized() {
    let conn = MemoryConnection::new().with_execute_delay(Duration::from_millis(5));
    let probe = conn.probe();
    let lock = Arc::new(OmpLock::new(conn, false));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.transaction(true, |c: &mut dyn Cursor| {
                    c.execute("UPDATE omp.omptle SET el1=1", &[])?;
                    c.execute("UPDATE omp.ompobs SET el1=1", &[])
                })
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(probe.max_open_cursors(), 1);
    assert_eq!(probe.commits(), 8);
    assert_eq!(probe.execute_count(), 16);

    // Statements of one scope are never interleaved with another's.
    let executed = probe.executed();
    for pair in executed.chunks(2) {
        assert!(pair[0].statement.contains("omptle"));
        assert!(pair[1].statement.contains("ompobs"));
    }
}

#[test]
fn test_cleanup_error_rules() {
    let conn = MemoryConnection::new()
        .fail_cursor_close("cursor already closed")
        .fail_on("bad", "syntax error");
    let lock = OmpLock::new(conn, false);

    let err = lock
        .transaction(false, |c: &mut dyn Cursor| c.execute("SELECT bad", &[]))
        .unwrap_err();
    assert_eq!(err, OmpError::Database("syntax error".to_string()));

    let err = lock
        .transaction(false, |c: &mut dyn Cursor| c.execute("SELECT 1", &[]))
        .unwrap_err();
    assert!(matches!(err, OmpError::CursorClose(ref msg) if msg == "cursor already closed"));
    assert!(!lock.is_locked());
}

#[test]
fn test_read_lock_guard_blocks_writes_before_driver() {
    let conn = MemoryConnection::new().with_dialect(Dialect::Tds);
    let probe = conn.probe();
    let lock = OmpReadLock::new(conn);

    let err = lock
        .transaction(|c: &mut dyn Cursor| c.execute("UPDATE x SET y=1", &[]))
        .unwrap_err();
    assert!(err.is_policy_violation());
    assert_eq!(probe.execute_count(), 0);
    assert_eq!(probe.cursors_closed(), 1);

    lock.close().unwrap();
    assert!(probe.is_closed());
}
