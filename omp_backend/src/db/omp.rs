//! OMP and JCMT database queries.
//!
//! [`OmpDb`] builds statements for the JCMT header tables (`jcmt.COMMON`,
//! `jcmt.FILES`, `jcmt.transfer`) and the OMP project tables, and runs each
//! of them inside one transaction scope of the wrapped manager.

use chrono::{Duration, NaiveDateTime, Utc};
use log::{debug, info};

use super::connection::Cursor;
use super::dialect::{Dialect, Params};
use super::lock::Transact;
use super::value::{Record, Value};
use crate::error::{OmpError, OmpResult};

const JCMT: &str = "jcmt";
const OMP: &str = "omp";

/// Observations are considered finished this long after they started.
const INGESTION_DELAY_HOURS: i64 = 4;

/// Project tables whose `projectid` column follows a project rename.
const PROJECT_TABLES: [&str; 6] = [
    "ompproj",
    "ompprojqueue",
    "ompprojuser",
    "ompmsb",
    "ompmsbdone",
    "ompfeedback",
];

/// Selection criteria for [`OmpDb::find_obs_for_ingestion`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionQuery {
    /// Earliest UT date (`YYYYMMDD`), inclusive.
    pub utdate_start: Option<i64>,
    /// Latest UT date (`YYYYMMDD`), inclusive.
    pub utdate_end: Option<i64>,
    /// Ignore comments made after the last ingestion.
    pub no_status_check: bool,
    /// Include observations whose files are still being transferred.
    pub no_transfer_check: bool,
}

impl IngestionQuery {
    pub fn since(utdate_start: i64) -> Self {
        Self {
            utdate_start: Some(utdate_start),
            ..Self::default()
        }
    }

    pub fn until(mut self, utdate_end: i64) -> Self {
        self.utdate_end = Some(utdate_end);
        self
    }

    pub fn no_status_check(mut self) -> Self {
        self.no_status_check = true;
        self
    }

    pub fn no_transfer_check(mut self) -> Self {
        self.no_transfer_check = true;
        self
    }
}

/// OMP and JCMT database access.
pub struct OmpDb<D: Transact> {
    db: D,
}

impl<D: Transact> OmpDb<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    /// The wrapped lock manager.
    pub fn inner(&self) -> &D {
        &self.db
    }

    pub fn into_inner(self) -> D {
        self.db
    }

    fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    fn jcmt(&self, table: &str) -> String {
        self.dialect().table(JCMT, table)
    }

    fn omp(&self, table: &str) -> String {
        self.dialect().table(OMP, table)
    }

    /// Run one read-only statement and return all rows' first column.
    fn first_column(&self, statement: &str, params: &Params) -> OmpResult<Vec<Value>> {
        self.db.transaction(false, |c: &mut dyn Cursor| {
            c.execute(statement, params.values())?;
            let mut values = Vec::new();
            while let Some(row) = c.fetch_one()? {
                values.extend(row.into_iter().next());
            }
            Ok(values)
        })
    }

    /// The COMMON row of an observation, or `None` if it is unknown.
    pub fn get_obsid_common(&self, obsid: &str) -> OmpResult<Option<Record>> {
        let mut params = Params::new(self.dialect());
        let statement = format!(
            "SELECT * FROM {} WHERE obsid={}",
            self.jcmt("COMMON"),
            params.bind(obsid)
        );

        let (columns, mut rows) = self.db.transaction(false, |c: &mut dyn Cursor| {
            c.execute(&statement, params.values())?;
            let rows = c.fetch_all()?;
            let columns = c.description().map(|d| d.to_vec()).unwrap_or_default();
            Ok::<_, OmpError>((columns, rows))
        })?;

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop().map(|row| Record::from_description(&columns, row))),
            _ => Err(OmpError::Database(
                "multiple COMMON results for one obsid".to_string(),
            )),
        }
    }

    /// Status of the most recent active comment on an observation.
    pub fn get_obsid_status(&self, obsid: &str) -> OmpResult<Option<i64>> {
        let mut params = Params::new(self.dialect());
        let obslog = self.omp("ompobslog");
        let statement = format!(
            "SELECT commentstatus FROM {obslog} WHERE obslogid = \
             (SELECT MAX(obslogid) FROM {obslog} WHERE obsid={} AND obsactive=1)",
            params.bind(obsid),
        );

        let values = self.first_column(&statement, &params)?;
        match values.as_slice() {
            [] => Ok(None),
            [status] => Ok(status.as_i64()),
            _ => Err(OmpError::Database(
                "multiple status results for one obsid".to_string(),
            )),
        }
    }

    /// Observations which are due for ingestion into CAOM-2.
    ///
    /// An observation qualifies when its UT date is in range, it started at
    /// least four hours ago, `last_caom_mod` is null or older than its last
    /// modification (or, unless disabled, its latest comment), and (unless
    /// disabled) none of its files are still in transfer.
    pub fn find_obs_for_ingestion(&self, query: &IngestionQuery) -> OmpResult<Vec<String>> {
        let cutoff = Utc::now().naive_utc() - Duration::hours(INGESTION_DELAY_HOURS);
        let (statement, params) = self.ingestion_statement(query, cutoff);

        let obsids = self
            .first_column(&statement, &params)?
            .into_iter()
            .filter_map(Value::into_string)
            .collect::<Vec<_>>();
        info!("Found {} observations for ingestion", obsids.len());
        Ok(obsids)
    }

    fn ingestion_statement(
        &self,
        query: &IngestionQuery,
        cutoff: NaiveDateTime,
    ) -> (String, Params) {
        let mut params = Params::new(self.dialect());
        let mut conditions = Vec::new();

        if let Some(start) = query.utdate_start {
            conditions.push(format!("(utdate >= {})", params.bind(start)));
        }
        if let Some(end) = query.utdate_end {
            conditions.push(format!("(utdate <= {})", params.bind(end)));
        }

        conditions.push(format!("(date_obs <= {})", params.bind(cutoff)));

        let mut status = vec![
            "(last_caom_mod IS NULL)".to_string(),
            "(last_modified > last_caom_mod)".to_string(),
        ];
        if !query.no_status_check {
            status.push(format!(
                "(last_caom_mod < (SELECT MAX(commentdate) FROM {} AS o WHERE o.obsid=c.obsid))",
                self.omp("ompobslog")
            ));
        }
        conditions.push(format!("({})", status.join(" OR ")));

        if !query.no_transfer_check {
            conditions.push(format!(
                "((SELECT COUNT(*) FROM {} AS f JOIN {} AS t ON f.file_id=t.file_id \
                 WHERE f.obsid=c.obsid AND t.status NOT IN ('t', 'd', 'D', 'z')) = 0)",
                self.jcmt("FILES"),
                self.jcmt("transfer")
            ));
        }

        let statement = format!(
            "SELECT obsid FROM {} AS c WHERE {}",
            self.jcmt("COMMON"),
            conditions.join(" AND ")
        );
        (statement, params)
    }

    /// Mark an observation as ingested by setting `last_caom_mod` to the
    /// current time, or clear the mark with `set_null`.
    pub fn set_last_caom_mod(&self, obsid: &str, set_null: bool) -> OmpResult<()> {
        let mut params = Params::new(self.dialect());
        let statement = format!(
            "UPDATE {} SET last_caom_mod = {} WHERE obsid={}",
            self.jcmt("COMMON"),
            if set_null { "NULL" } else { self.dialect().utc_now() },
            params.bind(obsid)
        );

        self.db.transaction(true, |c: &mut dyn Cursor| {
            c.execute(&statement, params.values())?;
            match c.row_count() {
                Some(1) | None => Ok(()),
                Some(n) => Err(OmpError::Database(format!(
                    "expected to update one COMMON row for {} but updated {}",
                    obsid, n
                ))),
            }
        })?;
        debug!("Updated last_caom_mod for {}", obsid);
        Ok(())
    }

    /// Observation identifiers between two UT dates (`YYYYMMDD`,
    /// inclusive), optionally restricted to one instrument.
    pub fn find_obs_by_date(
        &self,
        utstart: i64,
        utend: i64,
        instrument: Option<&str>,
    ) -> OmpResult<Vec<String>> {
        let mut params = Params::new(self.dialect());
        let mut statement = format!(
            "SELECT obsid FROM {} WHERE utdate >= {} AND utdate <= {}",
            self.jcmt("COMMON"),
            params.bind(utstart),
            params.bind(utend)
        );
        if let Some(instrument) = instrument.filter(|i| !i.is_empty()) {
            statement.push_str(&format!(
                " AND UPPER(instrume) = {}",
                params.bind(instrument.to_uppercase())
            ));
        }

        Ok(self
            .first_column(&statement, &params)?
            .into_iter()
            .filter_map(Value::into_string)
            .collect())
    }

    /// Observation identifiers with their release dates between two UT
    /// dates, optionally restricted by instrument and backend.
    pub fn find_releasedates(
        &self,
        utstart: i64,
        utend: i64,
        instrument: Option<&str>,
        backend: Option<&str>,
    ) -> OmpResult<Vec<(String, Option<NaiveDateTime>)>> {
        let mut params = Params::new(self.dialect());
        let mut statement = format!(
            "SELECT obsid, release_date FROM {} WHERE utdate >= {} AND utdate <= {}",
            self.jcmt("COMMON"),
            params.bind(utstart),
            params.bind(utend)
        );
        if let Some(instrument) = instrument.filter(|i| !i.is_empty()) {
            statement.push_str(&format!(
                " AND UPPER(instrume) = {}",
                params.bind(instrument.to_uppercase())
            ));
        }
        if let Some(backend) = backend.filter(|b| !b.is_empty()) {
            statement.push_str(&format!(
                " AND UPPER(backend) = {}",
                params.bind(backend.to_uppercase())
            ));
        }

        let rows = self.db.transaction(false, |c: &mut dyn Cursor| {
            c.execute(&statement, params.values())?;
            c.fetch_all()
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let mut values = row.into_iter();
                let obsid = values.next()?.into_string()?;
                let release = values.next().and_then(|v| v.as_datetime());
                Some((obsid, release))
            })
            .collect())
    }

    /// PI name and title of a project. Either may be `None` when the
    /// project or its (non-obfuscated) PI cannot be found.
    pub fn get_project_pi_title(
        &self,
        project: &str,
    ) -> OmpResult<(Option<String>, Option<String>)> {
        let mut params = Params::new(self.dialect());
        let statement = format!(
            "SELECT ou.uname, op.title FROM {} op \
             LEFT JOIN {} ou ON op.pi=ou.userid AND ou.obfuscated=0 \
             WHERE op.projectid={}",
            self.omp("ompproj"),
            self.omp("ompuser"),
            params.bind(project)
        );

        let row = self.db.transaction(false, |c: &mut dyn Cursor| {
            c.execute(&statement, params.values())?;
            c.fetch_one()
        })?;

        Ok(match row {
            Some(row) => {
                let mut values = row.into_iter();
                (
                    values.next().and_then(Value::into_string),
                    values.next().and_then(Value::into_string),
                )
            }
            None => (None, None),
        })
    }

    /// Distinct UT dates with observations for a project.
    pub fn get_dates_for_project(&self, project: &str) -> OmpResult<Vec<i64>> {
        let mut params = Params::new(self.dialect());
        let statement = format!(
            "SELECT DISTINCT utdate FROM {} WHERE project={}",
            self.jcmt("COMMON"),
            params.bind(project)
        );

        Ok(self
            .first_column(&statement, &params)?
            .iter()
            .filter_map(Value::as_i64)
            .collect())
    }

    /// Rename a project throughout the OMP project tables.
    ///
    /// # Errors
    /// [`OmpError::PolicyViolation`] if `new` is already in use; nothing is
    /// changed in that case.
    pub fn rename_project(&self, old: &str, new: &str) -> OmpResult<()> {
        let dialect = self.dialect();
        let mut check = Params::new(dialect);
        let check_statement = format!(
            "SELECT COUNT(*) FROM {} WHERE projectid={}",
            self.omp("ompproj"),
            check.bind(new)
        );
        let updates: Vec<(String, Params)> = PROJECT_TABLES
            .iter()
            .map(|table| {
                let mut params = Params::new(dialect);
                let statement = format!(
                    "UPDATE {} SET projectid={} WHERE projectid={}",
                    self.omp(table),
                    params.bind(new),
                    params.bind(old)
                );
                (statement, params)
            })
            .collect();

        self.db.transaction(true, |c: &mut dyn Cursor| {
            c.execute(&check_statement, check.values())?;
            let in_use = c
                .fetch_one()?
                .and_then(|row| row.first().and_then(Value::as_i64))
                .unwrap_or(0);
            if in_use > 0 {
                return Err(OmpError::PolicyViolation(format!(
                    "project code {} is already in use",
                    new
                )));
            }

            for (statement, params) in &updates {
                c.execute(statement, params.values())?;
            }
            Ok(())
        })?;
        info!("Renamed project {} to {}", old, new);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::backends::memory::{MemoryConnection, ResultSet};
    use crate::db::lock::OmpLock;
    use chrono::NaiveDate;

    fn cutoff() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 7, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    #[test]
    fn test_ingestion_statement_all_checks() {
        let db = OmpDb::new(OmpLock::new(MemoryConnection::new(), true));
        let query = IngestionQuery::since(20140101).until(20140131);
        let (statement, params) = db.ingestion_statement(&query, cutoff());

        assert!(statement.starts_with("SELECT obsid FROM jcmt.COMMON AS c WHERE "));
        assert!(statement.contains("(utdate >= $1)"));
        assert!(statement.contains("(utdate <= $2)"));
        assert!(statement.contains("(date_obs <= $3)"));
        assert!(statement.contains("FROM omp.ompobslog AS o"));
        assert!(statement.contains("JOIN jcmt.transfer AS t"));
        assert_eq!(
            params.values(),
            &[
                Value::Int(20140101),
                Value::Int(20140131),
                Value::DateTime(cutoff())
            ]
        );
    }

    #[test]
    fn test_ingestion_statement_checks_disabled() {
        let db = OmpDb::new(OmpLock::new(
            MemoryConnection::new().with_dialect(Dialect::Tds),
            true,
        ));
        let query = IngestionQuery::default()
            .no_status_check()
            .no_transfer_check();
        let (statement, params) = db.ingestion_statement(&query, cutoff());

        assert_eq!(
            statement,
            "SELECT obsid FROM jcmt..COMMON AS c WHERE (date_obs <= @P1) AND \
             ((last_caom_mod IS NULL) OR (last_modified > last_caom_mod))"
        );
        assert_eq!(params.values().len(), 1);
    }

    #[test]
    fn test_get_obsid_status_none() {
        let db = OmpDb::new(OmpLock::new(
            MemoryConnection::new().respond("commentstatus", ResultSet::new(&["commentstatus"], vec![])),
            true,
        ));
        assert_eq!(db.get_obsid_status("x").unwrap(), None);
    }
}
