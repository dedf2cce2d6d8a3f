use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error};

use crate::engine::{ConditionTree, Engine, EngineError, Result};

static SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^SELECT\s+(?P<fields>[\w.,\s]+?)\s+FROM\s+(?P<tables>\w+(?:\s*,\s*\w+)*)(?:\s+WHERE\s+(?P<cond>.*?))?\s*;?$",
    )
    .expect("static regex")
});
static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^INSERT\s+INTO\s+(?P<table>\w+)\s+VALUES\s*\((?P<values>.*)\)\s*;?$")
        .expect("static regex")
});
static DELETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^DELETE\s+FROM\s+(?P<tables>\w+(?:\s*,\s*\w+)*)\s*;?$").expect("static regex")
});
static DELETE_WHERE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^DELETE\s+FROM\s+(?P<tables>\w+(?:\s*,\s*\w+)*)\s+WHERE\s+(?P<cond>.*?)\s*;?$")
        .expect("static regex")
});

/// A statement of the command language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `SELECT t.a, u.b FROM t, u [WHERE cond]`
    Select {
        fields: Vec<String>,
        tables: Vec<String>,
        condition: Option<String>,
    },
    /// `INSERT INTO t VALUES ('x', 'y')`
    Insert { table: String, values: Vec<String> },
    /// `DELETE FROM t, u`
    Delete { tables: Vec<String> },
    /// `DELETE FROM t, u WHERE cond`
    DeleteWhere {
        tables: Vec<String>,
        condition: String,
    },
}

impl Command {
    /// Matches `line` against the statement forms, in order: SELECT,
    /// INSERT, DELETE, DELETE ... WHERE. Keywords are case-insensitive and a
    /// trailing `;` is optional.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();

        if let Some(caps) = SELECT.captures(line) {
            return Ok(Command::Select {
                fields: split_list(&caps["fields"]),
                tables: split_list(&caps["tables"]),
                condition: caps.name("cond").map(|c| c.as_str().to_string()),
            });
        }
        if let Some(caps) = INSERT.captures(line) {
            return Ok(Command::Insert {
                table: caps["table"].to_string(),
                values: split_values(&caps["values"])?,
            });
        }
        if let Some(caps) = DELETE.captures(line) {
            return Ok(Command::Delete {
                tables: split_list(&caps["tables"]),
            });
        }
        if let Some(caps) = DELETE_WHERE.captures(line) {
            return Ok(Command::DeleteWhere {
                tables: split_list(&caps["tables"]),
                condition: caps["cond"].to_string(),
            });
        }
        Err(EngineError::IncorrectCommand)
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',').map(|s| s.trim().to_string()).collect()
}

/// Splits an INSERT value list on the commas outside single quotes.
///
/// Each value is trimmed and loses its surrounding quotes. A comma inside a
/// quoted value cannot be stored in a sheet, so it rejects the statement.
fn split_values(list: &str) -> Result<Vec<String>> {
    fn finish(token: &str) -> Result<String> {
        let value = token.trim().trim_matches('\'');
        if value.contains(',') {
            return Err(EngineError::ValueContainsComma);
        }
        Ok(value.to_string())
    }

    let mut values = Vec::new();
    let mut token = String::new();
    let mut quoted = false;
    for ch in list.chars() {
        match ch {
            '\'' => {
                quoted = !quoted;
                token.push(ch);
            }
            ',' if !quoted => {
                values.push(finish(&token)?);
                token.clear();
            }
            _ => token.push(ch),
        }
    }
    values.push(finish(&token)?);
    Ok(values)
}

/// What a successful statement produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// SELECT result: the requested fields and one entry per row
    Rows {
        fields: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    /// INSERT: the new primary key
    Inserted(u64),
    /// DELETE
    Deleted,
    /// DELETE ... WHERE: rows removed across all tables
    DeletedRows(usize),
}

impl Outcome {
    /// Text sent after `output:`, if the statement has any. SELECT output
    /// is a header line of field names followed by one line per non-empty
    /// row, each line ending with `\n`.
    pub fn payload(&self) -> Option<String> {
        match self {
            Outcome::Rows { fields, rows } => {
                let mut out = fields.join(",");
                out.push('\n');
                for row in rows.iter().filter(|r| !r.is_empty()) {
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
                Some(out)
            }
            Outcome::Inserted(pk) => Some(pk.to_string()),
            Outcome::Deleted => None,
            Outcome::DeletedRows(n) => Some(format!("deleted {} rows", n)),
        }
    }
}

/// Parses and runs one statement, holding the table locks it needs.
///
/// SELECT and INSERT lock all of their tables for the whole statement.
/// DELETE over several tables handles them one at a time, each under its
/// own lock, and stops at the first failing table.
pub fn execute(engine: &Engine, line: &str) -> Result<Outcome> {
    let command = Command::parse(line)?;
    debug!(?command, "executing");

    match command {
        Command::Select {
            fields,
            tables,
            condition,
        } => {
            let condition = condition.as_deref().map(ConditionTree::parse).transpose()?;
            let _locks = engine.lock_tables(&tables)?;
            let rows = engine.select(&fields, &tables, condition.as_ref())?;
            Ok(Outcome::Rows { fields, rows })
        }
        Command::Insert { table, values } => {
            let _locks = engine.lock_tables(&[&table])?;
            let pk = engine.insert(&table, values)?;
            Ok(Outcome::Inserted(pk))
        }
        Command::Delete { tables } => {
            for table in &tables {
                let _locks = engine.lock_tables(&[table])?;
                engine.delete(table)?;
            }
            Ok(Outcome::Deleted)
        }
        Command::DeleteWhere { tables, condition } => {
            let condition = ConditionTree::parse(&condition)?;
            let mut removed = 0;
            for table in &tables {
                let _locks = engine.lock_tables(&[table])?;
                removed += engine.delete_where(table, &condition)?;
            }
            Ok(Outcome::DeletedRows(removed))
        }
    }
}

/// Runs one statement on tokio's blocking pool.
///
/// Statements block on sheet I/O and table locks, so they never run on the
/// async workers.
pub async fn plan_and_exec(engine: Arc<Engine>, line: String) -> Result<Outcome> {
    match tokio::task::spawn_blocking(move || execute(&engine, &line)).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "statement worker failed");
            Err(EngineError::Internal(e.to_string()))
        }
    }
}
