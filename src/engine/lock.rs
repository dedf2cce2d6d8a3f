use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

use super::error::{EngineError, Result};

/// One mutex per table, serializing the statements that touch it.
///
/// The table set is fixed when the manager is built from the schema.
/// Acquisition blocks until the current holder is done; there is no timeout.
pub struct LockManager {
    locks: HashMap<String, Mutex<()>>,
}

/// Locks held by one statement. Dropping it releases every table.
#[must_use = "tables are unlocked as soon as the guard is dropped"]
pub struct TableLocks<'a> {
    guards: Vec<(&'a str, MutexGuard<'a, ()>)>,
}

impl LockManager {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            locks: tables
                .into_iter()
                .map(|t| (t.into(), Mutex::new(())))
                .collect(),
        }
    }

    /// Locks every table in `tables`.
    ///
    /// Names are deduplicated and locked in lexicographic order whatever
    /// order the statement lists them in, so two statements over the same
    /// tables can never wait on each other in a cycle. Unknown names fail
    /// before anything is locked.
    pub fn lock<S: AsRef<str>>(&self, tables: &[S]) -> Result<TableLocks<'_>> {
        let ordered: BTreeSet<&str> = tables.iter().map(AsRef::as_ref).collect();

        let mut entries = Vec::with_capacity(ordered.len());
        for table in ordered {
            let entry = self
                .locks
                .get_key_value(table)
                .ok_or_else(|| EngineError::IncorrectTable(table.to_string()))?;
            entries.push(entry);
        }

        let guards = entries
            .into_iter()
            .map(|(name, mutex)| {
                let guard = mutex.lock();
                trace!(table = %name, "table locked");
                (name.as_str(), guard)
            })
            .collect();
        Ok(TableLocks { guards })
    }

    /// Whether some statement currently holds `table`.
    pub fn is_locked(&self, table: &str) -> bool {
        self.locks.get(table).is_some_and(|m| m.is_locked())
    }
}

impl TableLocks<'_> {
    /// Locked tables, in acquisition order.
    pub fn tables(&self) -> impl Iterator<Item = &str> + '_ {
        self.guards.iter().map(|(name, _)| *name)
    }
}

impl Drop for TableLocks<'_> {
    fn drop(&mut self) {
        for (name, _) in &self.guards {
            trace!(table = %name, "table unlocked");
        }
    }
}
