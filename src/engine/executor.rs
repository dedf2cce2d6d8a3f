use tracing::debug;

use super::{
    condition::ConditionTree,
    error::{EngineError, Result},
    join::cross_join,
    storage::{Row, TableStorage},
    WhereMode,
};

/// Executes a SELECT over one or more tables: full scan, filter, join,
/// projection.
///
/// ```text
/// sheets -> rows -> per-table WHERE filter -> cross join -> [joined WHERE] -> fields
/// ```
///
/// ## Filtering
/// Each table's rows are filtered with the condition evaluated in that
/// table's context, where comparisons on the other tables pass vacuously.
/// With several tables and [`WhereMode::Joined`], the joined rows are checked
/// once more against the whole condition so cross-table clauses are enforced
/// exactly. [`WhereMode::PerTable`] stops after the per-table filter.
///
/// ## Arguments
/// * `tables` - FROM list, in statement order
/// * `fields` - qualified `table.column` names to project, in output order
/// * `condition` - parsed WHERE clause, if any
///
/// ## Returns
/// One entry per result row holding the requested values in field order.
pub fn execute_select_scan(
    tables: &[&TableStorage],
    fields: &[String],
    condition: Option<&ConditionTree>,
    mode: WhereMode,
) -> Result<Vec<Vec<String>>> {
    validate_fields(tables, fields)?;
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();

    let rows = match tables {
        [table] => filtered_rows(table, &names, condition)?,
        _ => {
            let mut row_sets = Vec::with_capacity(tables.len());
            for table in tables {
                row_sets.push(filtered_rows(table, &names, condition)?);
            }
            let joined = cross_join(row_sets);
            match (condition, mode) {
                (Some(c), WhereMode::Joined) => joined
                    .into_iter()
                    .filter(|row| c.evaluate_joined(row, &names))
                    .collect(),
                _ => joined,
            }
        }
    };
    debug!(tables = ?names, rows = rows.len(), "select scan finished");

    Ok(rows.iter().map(|row| project(row, fields)).collect())
}

fn filtered_rows(
    table: &TableStorage,
    names: &[&str],
    condition: Option<&ConditionTree>,
) -> Result<Vec<Row>> {
    let rows = table.rows()?;
    Ok(match condition {
        None => rows,
        Some(c) => rows
            .into_iter()
            .filter(|row| c.evaluate(row, names, &table.name))
            .collect(),
    })
}

/// Checks that every field is `table.column`, names a table of the
/// statement and a column of that table.
fn validate_fields(tables: &[&TableStorage], fields: &[String]) -> Result<()> {
    for field in fields {
        let Some((table, column)) = field.split_once('.') else {
            return Err(EngineError::invalid_field(field, "expected table.column"));
        };
        let Some(storage) = tables.iter().find(|t| t.name == table) else {
            return Err(EngineError::invalid_field(field, "table is not in the FROM list"));
        };
        if !storage.columns.iter().any(|c| c == column) {
            return Err(EngineError::invalid_field(field, "no such column in the table"));
        }
    }
    Ok(())
}

fn project(row: &Row, fields: &[String]) -> Vec<String> {
    fields.iter().filter_map(|f| row.get(f).cloned()).collect()
}
