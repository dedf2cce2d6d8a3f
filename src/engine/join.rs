use super::storage::Row;

/// Cartesian product of several tables' row sets.
///
/// Rows are merged left to right; keys are qualified column names, so rows
/// from different tables never overwrite each other. No input yields no rows.
pub fn cross_join(row_sets: Vec<Vec<Row>>) -> Vec<Row> {
    let mut sets = row_sets.into_iter();
    let Some(first) = sets.next() else {
        return Vec::new();
    };
    sets.fold(first, |acc, next| combine(&acc, &next))
}

/// Pairs every row of `left` with every row of `right`, row-major over
/// `left`: all of `right` for `left[0]`, then all of `right` for `left[1]`...
pub fn combine(left: &[Row], right: &[Row]) -> Vec<Row> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut merged = Row::with_capacity(l.len() + r.len());
            merged.extend(l.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged.extend(r.iter().map(|(k, v)| (k.clone(), v.clone())));
            out.push(merged);
        }
    }
    out
}
