//! In-memory coordinator for tests
//!
//! Holds scripted checksum answers and an audit table keyed by
//! (database, table) with the same replace semantics as the real table.

use actuator_core::domain::check::{SchemaDiscrepancy, ShardCheckRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{CoordinatorError, Result};
use crate::{Coordinator, CoordinatorSession, CoordinatorTarget};

type Key = (String, String);

#[derive(Default)]
struct State {
    responses: BTreeMap<Key, Vec<SchemaDiscrepancy>>,
    failing: HashSet<Key>,
    refuse_connections: bool,
    audit_table_created: bool,
    records: BTreeMap<Key, ShardCheckRecord>,
    connections: usize,
    checked: Vec<Key>,
}

/// Scriptable coordinator shared between a test and the code under test
#[derive(Clone, Default)]
pub struct InMemoryCoordinator {
    state: Arc<Mutex<State>>,
}

impl InMemoryCoordinator {
    /// Creates an empty coordinator; unscripted tables check as consistent
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the rows returned for `db`.`tbl`
    pub fn set_rows(&self, db: &str, tbl: &str, rows: Vec<SchemaDiscrepancy>) {
        self.lock()
            .responses
            .insert((db.to_string(), tbl.to_string()), rows);
    }

    /// Makes the checksum of `db`.`tbl` fail
    pub fn fail_checksum(&self, db: &str, tbl: &str) {
        self.lock()
            .failing
            .insert((db.to_string(), tbl.to_string()));
    }

    /// Makes every connection attempt fail
    pub fn refuse_connections(&self) {
        self.lock().refuse_connections = true;
    }

    /// Snapshot of the audit table in key order
    pub fn records(&self) -> Vec<ShardCheckRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// The stored record for one key
    pub fn record(&self, db: &str, tbl: &str) -> Option<ShardCheckRecord> {
        self.lock()
            .records
            .get(&(db.to_string(), tbl.to_string()))
            .cloned()
    }

    /// Number of sessions opened so far
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// Every checksum request in the order it was issued
    pub fn checked(&self) -> Vec<(String, String)> {
        self.lock().checked.clone()
    }

    /// True once `ensure_audit_table` ran
    pub fn audit_table_created(&self) -> bool {
        self.lock().audit_table_created
    }
}

#[async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn connect(&self, target: &CoordinatorTarget) -> Result<Box<dyn CoordinatorSession>> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(CoordinatorError::Unavailable(format!(
                "{} refused the connection",
                target.addr()
            )));
        }
        state.connections += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl CoordinatorSession for InMemoryCoordinator {
    async fn ensure_audit_table(&mut self) -> Result<()> {
        self.lock().audit_table_created = true;
        Ok(())
    }

    async fn checksum(&mut self, db: &str, tbl: &str) -> Result<Vec<SchemaDiscrepancy>> {
        let key = (db.to_string(), tbl.to_string());
        let mut state = self.lock();
        state.checked.push(key.clone());

        if state.failing.contains(&key) {
            return Err(CoordinatorError::Unavailable(format!(
                "checksum of {}.{} failed",
                db, tbl
            )));
        }

        Ok(state.responses.get(&key).cloned().unwrap_or_default())
    }

    async fn replace_record(&mut self, record: &ShardCheckRecord) -> Result<()> {
        let (db, tbl) = record.key();
        let key = (db.to_string(), tbl.to_string());
        self.lock().records.insert(key, record.clone());
        Ok(())
    }
}
