//! WHERE clause parsing and evaluation.
//!
//! A clause is a chain of `table.column = 'literal'` comparisons joined by
//! `AND` / `OR`, without parentheses. `AND` binds tighter than `OR`.

use std::sync::LazyLock;

use regex::Regex;

use super::error::{EngineError, Result};
use super::storage::Row;

static OR_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+OR\s+").expect("static regex"));
static AND_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("static regex"));

/// Parsed WHERE clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionTree {
    /// `table.column = 'value'`
    Equality {
        table: String,
        column: String,
        value: String,
    },
    /// A comparison that could not be split into `table.column = value`.
    /// It never matches.
    Malformed(String),
    And(Box<ConditionTree>, Box<ConditionTree>),
    Or(Box<ConditionTree>, Box<ConditionTree>),
}

impl ConditionTree {
    /// Builds the tree for `condition`.
    ///
    /// The text is split on `OR` first and each part on `AND`, so
    /// `a.x = '1' OR a.y = '2' AND a.z = '3'` reads as
    /// `a.x = '1' OR (a.y = '2' AND a.z = '3')`. Chains nest to the right.
    /// Comparisons that don't parse become [`ConditionTree::Malformed`]
    /// leaves rather than errors; only a blank clause is rejected.
    pub fn parse(condition: &str) -> Result<Self> {
        let condition = condition.trim();
        if condition.is_empty() {
            return Err(EngineError::ParseError("empty WHERE clause".to_string()));
        }
        let parts: Vec<&str> = OR_SPLIT.split(condition).collect();
        Ok(Self::chain(&parts, ConditionTree::Or, Self::parse_and))
    }

    fn parse_and(segment: &str) -> Self {
        let parts: Vec<&str> = AND_SPLIT.split(segment).collect();
        Self::chain(&parts, ConditionTree::And, Self::parse_comparison)
    }

    fn chain(
        parts: &[&str],
        node: fn(Box<Self>, Box<Self>) -> Self,
        leaf: fn(&str) -> Self,
    ) -> Self {
        match parts {
            [] => leaf(""),
            [only] => leaf(only),
            [first, rest @ ..] => node(Box::new(leaf(first)), Box::new(Self::chain(rest, node, leaf))),
        }
    }

    fn parse_comparison(clause: &str) -> Self {
        let clause = clause.trim();
        let malformed = || ConditionTree::Malformed(clause.to_string());

        let Some((field, value)) = clause.split_once('=') else {
            return malformed();
        };
        let Some((table, column)) = field.trim().split_once('.') else {
            return malformed();
        };
        if table.is_empty() || column.is_empty() {
            return malformed();
        }
        ConditionTree::Equality {
            table: table.to_string(),
            column: column.to_string(),
            value: value.trim().trim_matches('\'').to_string(),
        }
    }

    /// Evaluates the tree against a row of `current_table`.
    ///
    /// A comparison is false when it is malformed or names a table outside
    /// `valid_tables`. A comparison on `current_table` checks the row's value.
    /// A comparison on any other valid table is treated as satisfied, since
    /// the row carries no values for it: filtering a single table this way
    /// never drops a row the full predicate could still accept.
    pub fn evaluate<S: AsRef<str>>(&self, row: &Row, valid_tables: &[S], current_table: &str) -> bool {
        match self {
            ConditionTree::Equality { table, column, value } => {
                if !contains(valid_tables, table) {
                    return false;
                }
                table != current_table || column_equals(row, table, column, value)
            }
            ConditionTree::Malformed(_) => false,
            ConditionTree::And(l, r) => {
                l.evaluate(row, valid_tables, current_table)
                    && r.evaluate(row, valid_tables, current_table)
            }
            ConditionTree::Or(l, r) => {
                l.evaluate(row, valid_tables, current_table)
                    || r.evaluate(row, valid_tables, current_table)
            }
        }
    }

    /// Evaluates the tree against a joined row carrying the columns of every
    /// table in `valid_tables`: every comparison is checked for real.
    pub fn evaluate_joined<S: AsRef<str>>(&self, row: &Row, valid_tables: &[S]) -> bool {
        match self {
            ConditionTree::Equality { table, column, value } => {
                contains(valid_tables, table) && column_equals(row, table, column, value)
            }
            ConditionTree::Malformed(_) => false,
            ConditionTree::And(l, r) => {
                l.evaluate_joined(row, valid_tables) && r.evaluate_joined(row, valid_tables)
            }
            ConditionTree::Or(l, r) => {
                l.evaluate_joined(row, valid_tables) || r.evaluate_joined(row, valid_tables)
            }
        }
    }
}

fn contains<S: AsRef<str>>(tables: &[S], table: &str) -> bool {
    tables.iter().any(|t| t.as_ref() == table)
}

fn column_equals(row: &Row, table: &str, column: &str, value: &str) -> bool {
    row.get(&format!("{table}.{column}"))
        .is_some_and(|v| v == value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn eq(table: &str, column: &str, value: &str) -> ConditionTree {
        ConditionTree::Equality {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    #[test]
    fn and_requires_both_sides() {
        let tree = ConditionTree::parse("a.x = '1' AND a.y = 'z'").unwrap();
        assert!(!tree.evaluate(&row(&[("a.x", "1"), ("a.y", "w")]), &["a"], "a"));
        assert!(tree.evaluate(&row(&[("a.x", "1"), ("a.y", "z")]), &["a"], "a"));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let tree = ConditionTree::parse("t.a = '1' OR t.b = '2' AND t.c = '3'").unwrap();
        assert_eq!(
            tree,
            ConditionTree::Or(
                Box::new(eq("t", "a", "1")),
                Box::new(ConditionTree::And(
                    Box::new(eq("t", "b", "2")),
                    Box::new(eq("t", "c", "3")),
                )),
            )
        );
        let r = row(&[("t.a", "0"), ("t.b", "2"), ("t.c", "3")]);
        assert!(tree.evaluate(&r, &["t"], "t"));
    }

    #[test]
    fn chains_nest_to_the_right() {
        let tree = ConditionTree::parse("t.a = 1 or t.a = 2 Or t.a = 3").unwrap();
        assert_eq!(
            tree,
            ConditionTree::Or(
                Box::new(eq("t", "a", "1")),
                Box::new(ConditionTree::Or(
                    Box::new(eq("t", "a", "2")),
                    Box::new(eq("t", "a", "3")),
                )),
            )
        );
        assert!(tree.evaluate(&row(&[("t.a", "3")]), &["t"], "t"));
        assert!(!tree.evaluate(&row(&[("t.a", "4")]), &["t"], "t"));
    }

    #[test]
    fn literal_quotes_and_spaces_are_trimmed() {
        let tree = ConditionTree::parse("beer.name   =   'Old Ale'  ").unwrap();
        assert_eq!(tree, eq("beer", "name", "Old Ale"));
    }

    #[test]
    fn operator_words_inside_names_do_not_split() {
        let tree = ConditionTree::parse("t.color = 'ORANGE' AND t.brand = 'ANDES'").unwrap();
        assert_eq!(
            tree,
            ConditionTree::And(
                Box::new(eq("t", "color", "ORANGE")),
                Box::new(eq("t", "brand", "ANDES")),
            )
        );
    }

    #[test]
    fn malformed_comparisons_fail_closed() {
        let r = row(&[("t.id", "1")]);
        for clause in ["id = 1", "t.id 1", "t. = 1", ".id = 1"] {
            let tree = ConditionTree::parse(clause).unwrap();
            assert!(matches!(tree, ConditionTree::Malformed(_)), "{clause}");
            assert!(!tree.evaluate(&r, &["t"], "t"), "{clause}");
            assert!(!tree.evaluate_joined(&r, &["t"]), "{clause}");
        }
    }

    #[test]
    fn blank_clause_is_rejected() {
        assert!(matches!(
            ConditionTree::parse("   "),
            Err(EngineError::ParseError(_))
        ));
    }

    #[test]
    fn unknown_table_fails_closed() {
        let tree = ConditionTree::parse("x.id = '1'").unwrap();
        assert!(!tree.evaluate(&row(&[("x.id", "1")]), &["t"], "t"));
    }

    #[test]
    fn missing_column_does_not_match() {
        let tree = ConditionTree::parse("t.ghost = ''").unwrap();
        assert!(!tree.evaluate(&row(&[("t.id", "1")]), &["t"], "t"));
    }

    #[test]
    fn other_tables_pass_vacuously() {
        let tree = ConditionTree::parse("a.x = '1' AND b.y = '2'").unwrap();
        let a_row = row(&[("a.x", "1")]);
        assert!(tree.evaluate(&a_row, &["a", "b"], "a"));
        // b.y is only vacuous while b is one of the statement's tables
        assert!(!tree.evaluate(&a_row, &["a"], "a"));
    }

    #[test]
    fn joined_evaluation_checks_every_table() {
        let tree = ConditionTree::parse("a.x = '1' AND b.y = '2'").unwrap();
        let tables = ["a".to_string(), "b".to_string()];
        assert!(tree.evaluate_joined(&row(&[("a.x", "1"), ("b.y", "2")]), &tables));
        assert!(!tree.evaluate_joined(&row(&[("a.x", "1"), ("b.y", "3")]), &tables));
    }
}
