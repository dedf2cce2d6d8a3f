use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Suffix of the synthetic primary-key column every table gets.
pub const PK_SUFFIX: &str = "_pk";

/// Database schema as declared in the schema file.
///
/// The schema is loaded once at start-up and never changes afterwards. The
/// engine derives each table's physical column list from it (see
/// [`Schema::columns_with_pk`]) instead of rewriting the declared columns.
///
/// ## File Format
/// ```json
/// {
///   "name": "shop",
///   "tuples_limit": 1000,
///   "structure": {
///     "beer": ["name", "style", "alcohol"],
///     "cars": ["model", "maker"]
///   }
/// }
/// ```
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Schema {
    /// Database name, also the directory holding every table
    pub name: String,
    /// Maximum number of rows a sheet receives before a new one is started
    pub tuples_limit: usize,
    /// Table name -> ordered user columns (without the pk column)
    #[serde(rename = "structure")]
    pub tables: BTreeMap<String, Vec<String>>,
}

impl Schema {
    /// Reads and validates a schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("can't read schema file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid schema file {}", path.display()))
    }

    /// Parses and validates a schema from its JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(text)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Checks the constraints the storage layout relies on: names must be
    /// usable as directory names and in the command grammar, and column
    /// names must survive the comma-joined sheet format.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.name) {
            bail!("database name {:?} must be a non-empty word", self.name);
        }
        if self.tuples_limit == 0 {
            bail!("tuples_limit must be greater than 0");
        }
        if self.tables.is_empty() {
            bail!("schema declares no tables");
        }
        for (table, columns) in &self.tables {
            if !is_identifier(table) {
                bail!("table name {:?} must be a non-empty word", table);
            }
            if columns.is_empty() {
                bail!("table {} declares no columns", table);
            }
            let pk = pk_column(table);
            for (i, column) in columns.iter().enumerate() {
                if !is_identifier(column) {
                    bail!("column {:?} of table {} must be a non-empty word", column, table);
                }
                if *column == pk {
                    bail!("column {} of table {} clashes with the primary key", column, table);
                }
                if columns[..i].contains(column) {
                    bail!("column {} declared twice in table {}", column, table);
                }
            }
        }
        Ok(())
    }

    /// Physical column list of `table`: the pk column followed by the
    /// declared columns. `None` if the table is not declared.
    pub fn columns_with_pk(&self, table: &str) -> Option<Vec<String>> {
        let declared = self.tables.get(table)?;
        let mut columns = Vec::with_capacity(declared.len() + 1);
        columns.push(pk_column(table));
        columns.extend(declared.iter().cloned());
        Some(columns)
    }
}

/// Name of the synthetic primary-key column of `table`.
pub fn pk_column(table: &str) -> String {
    format!("{table}{PK_SUFFIX}")
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}
