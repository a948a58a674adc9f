//! Storage of satellite element sets in the OMP.

use log::debug;

use super::connection::Cursor;
use super::dialect::{Dialect, Params};
use super::lock::Transact;
use super::value::Value;
use crate::error::{OmpError, OmpResult};
use crate::tle::TleElements;

const OMP: &str = "omp";

/// Coordinate type of observations whose elements are refreshed
/// automatically.
pub const AUTO_TLE: &str = "AUTO-TLE";

/// TLE table access (`omptle`, `ompobs`).
pub struct TleDb<D: Transact> {
    db: D,
}

fn bind_elements(params: &mut Params, tle: &TleElements) -> [String; 8] {
    [
        tle.el1, tle.el2, tle.el3, tle.el4, tle.el5, tle.el6, tle.el7, tle.el8,
    ]
    .map(|el| params.bind(el))
}

impl<D: Transact> TleDb<D> {
    pub fn new(db: D) -> Self {
        Self { db }
    }

    pub fn inner(&self) -> &D {
        &self.db
    }

    pub fn into_inner(self) -> D {
        self.db
    }

    fn dialect(&self) -> Dialect {
        self.db.dialect()
    }

    /// Replace the stored element set of `tle.target`.
    pub fn submit_tle(&self, tle: &TleElements) -> OmpResult<()> {
        let table = self.dialect().table(OMP, "omptle");

        let mut delete_params = Params::new(self.dialect());
        let delete = format!(
            "DELETE FROM {} WHERE target={}",
            table,
            delete_params.bind(tle.target.as_str())
        );

        let mut insert_params = Params::new(self.dialect());
        let target = insert_params.bind(tle.target.as_str());
        let elements = bind_elements(&mut insert_params, tle);
        let insert = format!(
            "INSERT INTO {} (target, el1, el2, el3, el4, el5, el6, el7, el8) VALUES ({}, {})",
            table,
            target,
            elements.join(", ")
        );

        self.db.transaction(true, |c: &mut dyn Cursor| {
            debug!("Deleting old omptle row for {}", tle.target);
            c.execute(&delete, delete_params.values())?;
            debug!("Inserting new omptle row: {:?}", tle);
            c.execute(&insert, insert_params.values())
        })
    }

    /// Targets of all observations whose elements are refreshed
    /// automatically.
    pub fn retrieve_ids(&self) -> OmpResult<Vec<String>> {
        let mut params = Params::new(self.dialect());
        let statement = format!(
            "SELECT DISTINCT target FROM {} WHERE coordstype={}",
            self.dialect().table(OMP, "ompobs"),
            params.bind(AUTO_TLE)
        );

        let rows = self.db.transaction(false, |c: &mut dyn Cursor| {
            debug!("Retrieving list of distinct {} targets from ompobs", AUTO_TLE);
            c.execute(&statement, params.values())?;
            c.fetch_all()
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(Value::into_string))
            .collect())
    }

    /// Copy an element set into the automatically refreshed observations of
    /// its target. Returns the number of observations updated, when the
    /// backend reports it.
    pub fn update_tle_ompobs(&self, tle: &TleElements) -> OmpResult<Option<u64>> {
        let mut params = Params::new(self.dialect());
        let elements = bind_elements(&mut params, tle);
        let assignments = elements
            .iter()
            .enumerate()
            .map(|(i, placeholder)| format!("el{}={}", i + 1, placeholder))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "UPDATE {} SET {} WHERE coordstype={} AND target={}",
            self.dialect().table(OMP, "ompobs"),
            assignments,
            params.bind(AUTO_TLE),
            params.bind(tle.target.as_str())
        );

        self.db.transaction(true, |c: &mut dyn Cursor| {
            debug!("Updating ompobs with: {:?}", tle);
            c.execute(&statement, params.values())?;
            Ok::<_, OmpError>(c.row_count())
        })
    }
}
