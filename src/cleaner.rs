use log::debug;
use std::collections::HashSet;

use crate::error::{Result, SweeperError};
use crate::table::{Column, Table, Value};

/// Hashable identity of a cell, used to compare whole rows.
#[derive(Hash, PartialEq, Eq)]
enum CellKey<'a> {
    Missing,
    Number(u64),
    Text(&'a str),
}

impl<'a> From<Value<'a>> for CellKey<'a> {
    fn from(value: Value<'a>) -> Self {
        match value {
            Value::Missing => CellKey::Missing,
            // -0.0 and 0.0 compare equal, so they must hash equal
            Value::Number(n) if n == 0.0 => CellKey::Number(0.0f64.to_bits()),
            Value::Number(n) => CellKey::Number(n.to_bits()),
            Value::Text(s) => CellKey::Text(s),
        }
    }
}

/// Drop every row that repeats an earlier row exactly, keeping the first
/// occurrence and the order of the survivors. Returns how many rows went.
///
/// # Examples
/// ```
/// use data_sweeper::cleaner::remove_duplicates;
/// use data_sweeper::table::{Column, Table};
///
/// let mut table = Table::from_columns(vec![
///     ("a".to_string(), Column::Numeric(vec![Some(1.0), Some(1.0), None, None])),
/// ]).unwrap();
/// assert_eq!(remove_duplicates(&mut table), 2);
/// assert_eq!(table.row_count(), 2);
/// ```
pub fn remove_duplicates(table: &mut Table) -> usize {
    let keep: Vec<bool> = {
        let mut seen: HashSet<Vec<CellKey<'_>>> = HashSet::with_capacity(table.row_count());
        (0..table.row_count())
            .map(|r| {
                let key: Vec<CellKey<'_>> = table.row(r).into_iter().map(CellKey::from).collect();
                seen.insert(key)
            })
            .collect()
    };

    let removed = keep.iter().filter(|k| !**k).count();
    if removed > 0 {
        table.retain_rows(&keep);
    }
    debug!("removed {} duplicate rows", removed);
    removed
}

/// Replace missing values in every numeric column with the mean of that
/// column's present values. Columns with nothing present are left alone, as
/// are text columns. Returns how many cells were filled.
pub fn fill_missing_numeric(table: &mut Table) -> usize {
    let mut filled = 0;
    for column in table.columns_mut() {
        let Column::Numeric(values) = column else {
            continue;
        };
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() || present.len() == values.len() {
            continue;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(mean);
            filled += 1;
        }
    }
    debug!("filled {} missing numeric cells", filled);
    filled
}

/// Keep only the named columns, in the order given. Rows are untouched.
///
/// A name listed twice is kept once. Unknown names leave the table unchanged
/// and return [`SweeperError::UnknownColumn`].
pub fn select_columns<S: AsRef<str>>(table: &mut Table, names: &[S]) -> Result<()> {
    let mut wanted: Vec<&str> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        if table.position(name).is_none() {
            return Err(SweeperError::UnknownColumn(name.to_string()));
        }
        if !wanted.contains(&name) {
            wanted.push(name);
        }
    }

    let mut current: Vec<Option<(String, Column)>> =
        table.take_columns().into_iter().map(Some).collect();
    let mut selected = Vec::with_capacity(wanted.len());
    for name in wanted {
        if let Some(slot) = current
            .iter_mut()
            .find(|slot| matches!(slot, Some((n, _)) if n == name))
        {
            if let Some(column) = slot.take() {
                selected.push(column);
            }
        }
    }
    table.replace_columns(selected);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            (
                "n".to_string(),
                Column::Numeric(vec![Some(1.0), None, Some(1.0), Some(3.0), None]),
            ),
            (
                "t".to_string(),
                Column::Text(vec![
                    Some("x".to_string()),
                    None,
                    Some("x".to_string()),
                    Some("y".to_string()),
                    None,
                ]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let mut table = sample();
        assert_eq!(remove_duplicates(&mut table), 2);
        assert_eq!(table.row_count(), 3);
        assert_eq!(
            table.column("n"),
            Some(&Column::Numeric(vec![Some(1.0), None, Some(3.0)]))
        );
    }

    #[test]
    fn duplicate_removal_is_idempotent() {
        let mut once = sample();
        remove_duplicates(&mut once);
        let mut twice = once.clone();
        assert_eq!(remove_duplicates(&mut twice), 0);
        assert_eq!(once, twice);
    }

    #[test]
    fn rows_differing_in_one_cell_survive() {
        let mut table = Table::from_columns(vec![
            ("a".to_string(), Column::Numeric(vec![Some(1.0), Some(1.0)])),
            ("b".to_string(), Column::Text(vec![Some("x".to_string()), None])),
        ])
        .unwrap();
        assert_eq!(remove_duplicates(&mut table), 0);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn negative_zero_matches_zero() {
        let mut table = Table::from_columns(vec![(
            "a".to_string(),
            Column::Numeric(vec![Some(0.0), Some(-0.0)]),
        )])
        .unwrap();
        assert_eq!(remove_duplicates(&mut table), 1);
    }

    #[test]
    fn fill_uses_column_mean() {
        let mut table = Table::from_columns(vec![(
            "a".to_string(),
            Column::Numeric(vec![Some(1.0), None, Some(3.0)]),
        )])
        .unwrap();
        assert_eq!(fill_missing_numeric(&mut table), 1);
        assert_eq!(
            table.column("a"),
            Some(&Column::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)]))
        );
        assert_eq!(fill_missing_numeric(&mut table), 0);
    }

    #[test]
    fn fill_skips_text_and_empty_columns() {
        let mut table = Table::from_columns(vec![
            ("empty".to_string(), Column::Numeric(vec![None, None])),
            ("t".to_string(), Column::Text(vec![None, Some("x".to_string())])),
        ])
        .unwrap();
        assert_eq!(fill_missing_numeric(&mut table), 0);
        assert_eq!(table.column("empty").unwrap().missing_count(), 2);
        assert_eq!(table.column("t").unwrap().missing_count(), 1);
    }

    #[test]
    fn fill_after_dedupe_uses_remaining_rows() {
        let mut table = Table::from_columns(vec![(
            "a".to_string(),
            Column::Numeric(vec![Some(1.0), Some(1.0), Some(1.0), Some(4.0), None]),
        )])
        .unwrap();
        remove_duplicates(&mut table);
        fill_missing_numeric(&mut table);
        assert_eq!(
            table.column("a"),
            Some(&Column::Numeric(vec![Some(1.0), Some(4.0), Some(2.5)]))
        );
    }

    #[test]
    fn select_reorders_and_keeps_rows() {
        let mut table = sample();
        select_columns(&mut table, &["t", "n", "t"]).unwrap();
        assert_eq!(table.column_names(), ["t", "n"]);
        assert_eq!(table.row_count(), 5);
        assert_eq!(table.column("n"), sample().column("n"));
    }

    #[test]
    fn select_nothing_keeps_row_count() {
        let mut table = sample();
        select_columns::<&str>(&mut table, &[]).unwrap();
        assert_eq!(table.column_count(), 0);
        assert_eq!(table.row_count(), 5);
    }

    #[test]
    fn select_unknown_column_leaves_table_alone() {
        let mut table = sample();
        let err = select_columns(&mut table, &["n", "missing"]).unwrap_err();
        assert!(matches!(err, SweeperError::UnknownColumn(name) if name == "missing"));
        assert_eq!(table, sample());
    }
}
