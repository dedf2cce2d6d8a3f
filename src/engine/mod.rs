use serde::Deserialize;
use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

mod catalog;
mod condition;
mod error;
mod executor;
mod join;
mod lock;
mod storage;

pub use catalog::{pk_column, Schema, PK_SUFFIX};
pub use condition::ConditionTree;
pub use error::{EngineError, Result};
pub use executor::execute_select_scan;
pub use join::{combine, cross_join};
pub use lock::{LockManager, TableLocks};
pub use storage::{PageId, Row, Sheet, TableStorage};

/// How a WHERE clause spanning several tables is enforced by SELECT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhereMode {
    /// Filter each table on its own, then check every joined row against
    /// the whole clause.
    #[default]
    Joined,
    /// Filter each table on its own and stop there. Comparisons on other
    /// tables count as satisfied, so cross-table clauses can let extra joined
    /// rows through. Kept for compatibility with older deployments.
    PerTable,
}

/// Engine construction parameters.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Root directory; the database lives in `<storage_path>/<schema name>`
    pub storage_path: PathBuf,
    pub where_mode: WhereMode,
}

impl EngineConfig {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            where_mode: WhereMode::default(),
        }
    }
}

/// The storage engine: every table of one schema, stored as sheets under
/// the storage root.
///
/// ```text
///   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
///   │    Schema    │   │ Lock Manager │   │   Executor   │
///   │ (tables, pk) │   │ (per table)  │   │ (scan, join) │
///   └──────────────┘   └──────────────┘   └──────────────┘
///          │                  │                  │
///          └──────────────────┼──────────────────┘
///                     ┌───────▼───────┐
///                     │    Engine     │
///                     └───────┬───────┘
///                     ┌───────▼───────┐
///                     │ Table Storage │
///                     │   (sheets)    │
///                     └───────────────┘
/// ```
///
/// ## Locking
/// The data operations (`insert`, `select`, `delete`, `delete_where`) do not
/// lock. The caller takes the statement's tables with
/// [`Engine::lock_tables`] first and keeps the guard until the operation
/// returns; [`crate::sql::execute`] does exactly that.
pub struct Engine {
    /// `<storage_path>/<schema name>`
    database_dir: PathBuf,
    storage_path: PathBuf,
    schema: Schema,
    tables: HashMap<String, TableStorage>,
    locks: LockManager,
    where_mode: WhereMode,
}

impl Engine {
    /// Opens the database described by `schema`, creating missing pieces.
    ///
    /// Ensures the storage root, the database directory and every table
    /// directory exist, each table with at least its first sheet and its pk
    /// sequence. Existing data is reused as is, so reopening after a restart
    /// loses nothing.
    ///
    /// ## Returns
    /// * `Ok(Engine)` - ready to serve statements
    /// * `Err(EngineError::StorageIo)` - the layout could not be created
    pub fn open(config: EngineConfig, schema: Schema) -> Result<Self> {
        let storage_path = config.storage_path;
        let database_dir = storage_path.join(&schema.name);
        fs::create_dir_all(&database_dir).map_err(EngineError::io(&database_dir))?;

        let mut tables = HashMap::with_capacity(schema.tables.len());
        for name in schema.tables.keys() {
            let columns = schema
                .columns_with_pk(name)
                .ok_or_else(|| EngineError::IncorrectTable(name.clone()))?;
            let storage = TableStorage::open(&database_dir, name, columns)?;
            tables.insert(name.clone(), storage);
        }

        info!(
            database = %schema.name,
            path = %database_dir.display(),
            tables = tables.len(),
            where_mode = ?config.where_mode,
            "engine opened"
        );
        Ok(Self {
            database_dir,
            storage_path,
            locks: LockManager::new(schema.tables.keys().cloned()),
            schema,
            tables,
            where_mode: config.where_mode,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn database_dir(&self) -> &Path {
        &self.database_dir
    }

    pub fn where_mode(&self) -> WhereMode {
        self.where_mode
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Locks the given tables for the duration of one statement.
    pub fn lock_tables<S: AsRef<str>>(&self, tables: &[S]) -> Result<TableLocks<'_>> {
        self.locks.lock(tables)
    }

    /// Storage handle of `table`.
    pub fn table(&self, table: &str) -> Result<&TableStorage> {
        self.tables
            .get(table)
            .ok_or_else(|| EngineError::IncorrectTable(table.to_string()))
    }

    /// Inserts one row and returns its primary key.
    ///
    /// `values` holds one value per declared column, in schema order; the pk
    /// is assigned from the table's sequence.
    ///
    /// ## Returns
    /// * `Ok(pk)` - the row is on disk and the sequence advanced
    /// * `Err(IncorrectTable)` - unknown table
    /// * `Err(IncorrectColumnCount)` - wrong number of values
    /// * `Err(ValueContainsComma)` / `Err(ValueContainsLineBreak)` - a value
    ///   the sheet format cannot hold; nothing is written
    pub fn insert(&self, table: &str, values: Vec<String>) -> Result<u64> {
        let storage = self.table(table)?;
        let expected = storage.columns.len() - 1;
        if values.len() != expected {
            return Err(EngineError::IncorrectColumnCount {
                expected,
                got: values.len(),
            });
        }
        for value in &values {
            if value.contains(',') {
                return Err(EngineError::ValueContainsComma);
            }
            if value.contains(['\n', '\r']) {
                return Err(EngineError::ValueContainsLineBreak);
            }
        }
        let pk = storage.append_row(self.schema.tuples_limit, values)?;
        info!(table, pk, "row inserted");
        Ok(pk)
    }

    /// Runs a SELECT: `fields` are `table.column` names over `tables`.
    ///
    /// Several tables are cross-joined. See [`execute_select_scan`] for how
    /// the condition is applied.
    pub fn select<S: AsRef<str>>(
        &self,
        fields: &[String],
        tables: &[S],
        condition: Option<&ConditionTree>,
    ) -> Result<Vec<Vec<String>>> {
        let storages = tables
            .iter()
            .map(|t| self.table(t.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let rows = execute_select_scan(&storages, fields, condition, self.where_mode)?;
        info!(?fields, tables = storages.len(), rows = rows.len(), "select completed");
        Ok(rows)
    }

    /// Empties `table`: every sheet is dropped and the pk sequence restarts
    /// at 1.
    pub fn delete(&self, table: &str) -> Result<()> {
        self.table(table)?.reset()
    }

    /// Deletes the rows of `table` matching `condition`, sheet by sheet, and
    /// returns how many were removed.
    pub fn delete_where(&self, table: &str, condition: &ConditionTree) -> Result<usize> {
        let storage = self.table(table)?;
        let scope = [table];
        let removed = storage.delete_where(|row| condition.evaluate(row, &scope, table))?;
        info!(table, removed, "rows deleted");
        Ok(removed)
    }

    /// Removes the whole storage root, every database in it included.
    pub fn destroy(self) -> Result<()> {
        match fs::remove_dir_all(&self.storage_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.storage_path.display(), "storage already gone");
                Ok(())
            }
            Err(e) => Err(EngineError::io(&self.storage_path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine(root: &Path) -> Engine {
        let schema = Schema::from_json(
            r#"{"name": "pub", "tuples_limit": 2, "structure": {"beer": ["name", "style"]}}"#,
        )
        .unwrap();
        Engine::open(EngineConfig::new(root), schema).unwrap()
    }

    fn values(name: &str, style: &str) -> Vec<String> {
        vec![name.to_string(), style.to_string()]
    }

    #[test]
    fn insert_rejects_values_the_sheet_cannot_hold() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        let beer = engine.table("beer").unwrap();

        for (bad, check) in [
            (values("Salt, Pepper", "x"), "comma"),
            (values("Salt", "Pale\nAle"), "newline"),
            (values("Salt\r", "x"), "carriage return"),
        ] {
            let err = engine.insert("beer", bad).unwrap_err();
            assert!(
                matches!(
                    err,
                    EngineError::ValueContainsComma | EngineError::ValueContainsLineBreak
                ),
                "{check}: {err:?}"
            );
        }
        assert!(matches!(
            engine.insert("beer", values("a,b", "x")),
            Err(EngineError::ValueContainsComma)
        ));
        assert!(matches!(
            engine.insert("beer", values("a", "b\nc")),
            Err(EngineError::ValueContainsLineBreak)
        ));

        assert_eq!(beer.read_pk_sequence().unwrap(), 1);
        assert_eq!(
            fs::read_to_string(beer.page_path(PageId::FIRST)).unwrap(),
            "beer_pk,name,style\n"
        );

        assert_eq!(engine.insert("beer", values("Duvel", "Ale")).unwrap(), 1);
        assert_eq!(
            engine.select(&["beer.name".to_string()], &["beer"], None).unwrap(),
            vec![vec!["Duvel"]]
        );
    }

    #[test]
    fn insert_checks_arity_and_table() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path());
        assert!(matches!(
            engine.insert("beer", vec!["only".to_string()]),
            Err(EngineError::IncorrectColumnCount { expected: 2, got: 1 })
        ));
        assert!(matches!(
            engine.insert("wine", values("a", "b")),
            Err(EngineError::IncorrectTable(t)) if t == "wine"
        ));
    }
}
