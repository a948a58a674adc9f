//! Tests for db::omp - OMP and JCMT queries over the in-memory backend.

use chrono::NaiveDate;

use omp_rust::db::{
    Dialect, IngestionQuery, MemoryConnection, OmpDb, OmpError, OmpLock, OmpReadLock,
    ResultSet, Value,
};
use omp_rust::obs::ObsState;

const OBSID: &str = "scuba2_00012_20140401T081422";

fn omp_db(conn: MemoryConnection) -> OmpDb<OmpLock<MemoryConnection>> {
    OmpDb::new(OmpLock::new(conn, false))
}

#[test]
fn test_get_obsid_common_returns_record() {
    let conn = MemoryConnection::new().respond(
        "jcmt.COMMON",
        ResultSet::new(
            &["obsid", "project", "utdate"],
            vec![vec![
                Value::from(OBSID),
                Value::from("M14AU01"),
                Value::Int(20140401),
            ]],
        ),
    );
    let probe = conn.probe();
    let db = omp_db(conn);

    let record = db.get_obsid_common(OBSID).unwrap().unwrap();
    assert_eq!(record.get("PROJECT"), Some(&Value::from("M14AU01")));
    assert_eq!(record.get("utdate").and_then(Value::as_i64), Some(20140401));

    let executed = probe.last_executed().unwrap();
    assert_eq!(executed.statement, "SELECT * FROM jcmt.COMMON WHERE obsid=$1");
    assert_eq!(executed.params, vec![Value::from(OBSID)]);
    assert_eq!(probe.commits(), 0);
}

#[test]
fn test_get_obsid_common_unknown_and_duplicate() {
    let empty = omp_db(
        MemoryConnection::new().respond("jcmt.COMMON", ResultSet::new(&["obsid"], vec![])),
    );
    assert!(empty.get_obsid_common(OBSID).unwrap().is_none());

    let duplicate = omp_db(MemoryConnection::new().respond(
        "jcmt.COMMON",
        ResultSet::new(
            &["obsid"],
            vec![vec![Value::from(OBSID)], vec![Value::from(OBSID)]],
        ),
    ));
    let err = duplicate.get_obsid_common(OBSID).unwrap_err();
    assert_eq!(
        err,
        OmpError::Database("multiple COMMON results for one obsid".to_string())
    );
}

#[test]
fn test_get_obsid_status_maps_to_state() {
    let db = omp_db(MemoryConnection::new().respond(
        "commentstatus",
        ResultSet::new(&["commentstatus"], vec![vec![Value::Int(2)]]),
    ));
    let code = db.get_obsid_status(OBSID).unwrap().unwrap();
    assert_eq!(ObsState::from_code(code).unwrap(), ObsState::Bad);
}

#[test]
fn test_find_obs_for_ingestion_on_read_backend() {
    let conn = MemoryConnection::new().with_dialect(Dialect::Tds).respond(
        "jcmt..COMMON",
        ResultSet::new(&["obsid"], vec![vec![Value::from("a")], vec![Value::from("b")]]),
    );
    let probe = conn.probe();
    let db = OmpDb::new(OmpReadLock::new(conn));

    let obsids = db
        .find_obs_for_ingestion(&IngestionQuery::since(20140401))
        .unwrap();
    assert_eq!(obsids, vec!["a".to_string(), "b".to_string()]);

    let executed = probe.last_executed().unwrap();
    assert!(executed.statement.contains("(utdate >= @P1)"));
    assert!(executed.statement.contains("(date_obs <= @P2)"));
    assert_eq!(executed.params[0], Value::Int(20140401));
    assert!(matches!(executed.params[1], Value::DateTime(_)));
}

#[test]
fn test_set_last_caom_mod() {
    let conn = MemoryConnection::new().respond("last_caom_mod", ResultSet::affected(1));
    let probe = conn.probe();
    let db = omp_db(conn);

    db.set_last_caom_mod(OBSID, false).unwrap();
    assert_eq!(
        probe.last_executed().unwrap().statement,
        "UPDATE jcmt.COMMON SET last_caom_mod = (NOW() AT TIME ZONE 'UTC') WHERE obsid=$1"
    );

    db.set_last_caom_mod(OBSID, true).unwrap();
    assert!(probe
        .last_executed()
        .unwrap()
        .statement
        .contains("SET last_caom_mod = NULL"));
    assert_eq!(probe.commits(), 2);
}

#[test]
fn test_set_last_caom_mod_wrong_row_count_rolls_back() {
    let conn = MemoryConnection::new().respond("last_caom_mod", ResultSet::affected(0));
    let probe = conn.probe();
    let db = omp_db(conn);

    let err = db.set_last_caom_mod(OBSID, false).unwrap_err();
    assert!(matches!(err, OmpError::Database(_)));
    assert_eq!(probe.rollbacks(), 1);
    assert_eq!(probe.commits(), 0);
}

#[test]
fn test_set_last_caom_mod_refused_on_read_only() {
    let conn = MemoryConnection::new();
    let probe = conn.probe();
    let db = OmpDb::new(OmpLock::new(conn, true));

    let err = db.set_last_caom_mod(OBSID, true).unwrap_err();
    assert!(err.is_policy_violation());
    assert_eq!(probe.cursors_opened(), 0);
}

#[test]
fn test_find_obs_by_date_with_instrument() {
    let conn = MemoryConnection::new().respond(
        "jcmt.COMMON",
        ResultSet::new(&["obsid"], vec![vec![Value::from(OBSID)]]),
    );
    let probe = conn.probe();
    let db = omp_db(conn);

    let obsids = db
        .find_obs_by_date(20140401, 20140402, Some("scuba-2"))
        .unwrap();
    assert_eq!(obsids, vec![OBSID.to_string()]);

    let executed = probe.last_executed().unwrap();
    assert_eq!(
        executed.statement,
        "SELECT obsid FROM jcmt.COMMON WHERE utdate >= $1 AND utdate <= $2 \
         AND UPPER(instrume) = $3"
    );
    assert_eq!(executed.params[2], Value::from("SCUBA-2"));
}

#[test]
fn test_find_releasedates() {
    let release = NaiveDate::from_ymd_opt(2015, 2, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let conn = MemoryConnection::new().respond(
        "release_date",
        ResultSet::new(
            &["obsid", "release_date"],
            vec![
                vec![Value::from("a"), Value::DateTime(release)],
                vec![Value::from("b"), Value::from("2015-02-01 00:00:00")],
                vec![Value::from("c"), Value::Null],
            ],
        ),
    );
    let probe = conn.probe();
    let db = omp_db(conn);

    let dates = db
        .find_releasedates(20140101, 20141231, Some("HARP"), Some("acsis"))
        .unwrap();
    assert_eq!(
        dates,
        vec![
            ("a".to_string(), Some(release)),
            ("b".to_string(), Some(release)),
            ("c".to_string(), None),
        ]
    );

    let executed = probe.last_executed().unwrap();
    assert!(executed.statement.ends_with("AND UPPER(backend) = $4"));
    assert_eq!(executed.params[3], Value::from("ACSIS"));
}

#[test]
fn test_get_project_pi_title() {
    let db = omp_db(MemoryConnection::new().respond(
        "op.title",
        ResultSet::new(
            &["uname", "title"],
            vec![vec![Value::from("A. Observer"), Value::from("Star formation")]],
        ),
    ));
    assert_eq!(
        db.get_project_pi_title("M14AU01").unwrap(),
        (
            Some("A. Observer".to_string()),
            Some("Star formation".to_string())
        )
    );

    let missing = omp_db(
        MemoryConnection::new().respond("op.title", ResultSet::new(&["uname", "title"], vec![])),
    );
    assert_eq!(missing.get_project_pi_title("X").unwrap(), (None, None));
}

#[test]
fn test_get_dates_for_project() {
    let db = omp_db(MemoryConnection::new().respond(
        "DISTINCT utdate",
        ResultSet::new(
            &["utdate"],
            vec![vec![Value::Int(20140401)], vec![Value::Int(20140402)]],
        ),
    ));
    assert_eq!(
        db.get_dates_for_project("M14AU01").unwrap(),
        vec![20140401, 20140402]
    );
}

#[test]
fn test_rename_project_updates_all_tables() {
    let conn = MemoryConnection::new().respond(
        "COUNT(*)",
        ResultSet::new(&["count"], vec![vec![Value::Int(0)]]),
    );
    let probe = conn.probe();
    let db = omp_db(conn);

    db.rename_project("M14AU01", "M14AU99").unwrap();

    let updates: Vec<_> = probe
        .executed()
        .into_iter()
        .filter(|e| e.statement.starts_with("UPDATE"))
        .collect();
    assert_eq!(updates.len(), 6);
    assert_eq!(
        updates[0].statement,
        "UPDATE omp.ompproj SET projectid=$1 WHERE projectid=$2"
    );
    assert_eq!(
        updates[0].params,
        vec![Value::from("M14AU99"), Value::from("M14AU01")]
    );
    assert_eq!(probe.commits(), 1);
}

#[test]
fn test_rename_project_refuses_code_in_use() {
    let conn = MemoryConnection::new().respond(
        "COUNT(*)",
        ResultSet::new(&["count"], vec![vec![Value::Int(1)]]),
    );
    let probe = conn.probe();
    let db = omp_db(conn);

    let err = db.rename_project("M14AU01", "M14AU02").unwrap_err();
    assert_eq!(
        err,
        OmpError::PolicyViolation("project code M14AU02 is already in use".to_string())
    );
    assert_eq!(probe.execute_count(), 1);
    assert_eq!(probe.rollbacks(), 1);
    assert_eq!(probe.commits(), 0);
}
