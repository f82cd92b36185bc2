//! Column-oriented time-series table.
//!
//! A `TimeSeriesFrame` is an ordered mapping from column name to a
//! homogeneously-typed vector of nullable cells. All columns share one row
//! count; every mutating helper checks that invariant.
//!
//! Transforms elsewhere in the crate take `&TimeSeriesFrame` and build a new
//! frame (usually via `clone()` + column inserts), so a caller's frame never
//! changes underneath it.

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use tracing::warn;

use crate::error::AnalysisError;

pub mod join;
pub mod period;

pub use join::*;
pub use period::*;

/// Name of the period column.
pub const DATE: &str = "date";

/// A typed column of nullable cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Date(Vec<Option<NaiveDate>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

/// A single cell, used for group keys and row-wise access.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cell {
    Date(NaiveDate),
    Int(i64),
    /// Floats are keyed by their bit pattern so cells can be hashed and ordered.
    Float(OrderedF64),
    Text(String),
}

/// Total-ordered wrapper for finite floats used as keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedF64(pub f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for OrderedF64 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Date(v) => v.len(),
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type label for diagnostics and exports.
    pub fn kind(&self) -> &'static str {
        match self {
            Column::Date(_) => "date",
            Column::Int(_) => "integer",
            Column::Float(_) => "float",
            Column::Text(_) => "text",
        }
    }

    /// Numeric view: floats as-is, integers widened. `None` for date/text columns.
    pub fn to_f64(&self) -> Option<Vec<Option<f64>>> {
        match self {
            Column::Float(v) => Some(v.clone()),
            Column::Int(v) => Some(v.iter().map(|x| x.map(|i| i as f64)).collect()),
            Column::Date(_) | Column::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Float(_) | Column::Int(_))
    }

    pub fn cell(&self, row: usize) -> Option<Cell> {
        match self {
            Column::Date(v) => v.get(row).copied().flatten().map(Cell::Date),
            Column::Int(v) => v.get(row).copied().flatten().map(Cell::Int),
            Column::Float(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|f| Cell::Float(OrderedF64(f))),
            Column::Text(v) => v.get(row).cloned().flatten().map(Cell::Text),
        }
    }

    /// Gather rows by index. `None` indices produce null cells (used by joins).
    pub fn take(&self, indices: &[Option<usize>]) -> Column {
        fn pick<T: Clone>(v: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|i| i.and_then(|i| v.get(i).cloned().flatten()))
                .collect()
        }
        match self {
            Column::Date(v) => Column::Date(pick(v, indices)),
            Column::Int(v) => Column::Int(pick(v, indices)),
            Column::Float(v) => Column::Float(pick(v, indices)),
            Column::Text(v) => Column::Text(pick(v, indices)),
        }
    }

    /// Build a column of the same type from group key cells.
    pub fn from_cells(template: &Column, cells: &[Option<Cell>]) -> Column {
        match template {
            Column::Date(_) => Column::Date(
                cells
                    .iter()
                    .map(|c| match c {
                        Some(Cell::Date(d)) => Some(*d),
                        _ => None,
                    })
                    .collect(),
            ),
            Column::Int(_) => Column::Int(
                cells
                    .iter()
                    .map(|c| match c {
                        Some(Cell::Int(i)) => Some(*i),
                        _ => None,
                    })
                    .collect(),
            ),
            Column::Float(_) => Column::Float(
                cells
                    .iter()
                    .map(|c| match c {
                        Some(Cell::Float(f)) => Some(f.0),
                        _ => None,
                    })
                    .collect(),
            ),
            Column::Text(_) => Column::Text(
                cells
                    .iter()
                    .map(|c| match c {
                        Some(Cell::Text(s)) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }

    fn null_of_len(template: &Column, len: usize) -> Column {
        match template {
            Column::Date(_) => Column::Date(vec![None; len]),
            Column::Int(_) => Column::Int(vec![None; len]),
            Column::Float(_) => Column::Float(vec![None; len]),
            Column::Text(_) => Column::Text(vec![None; len]),
        }
    }

    /// Append `other`'s cells; an `Int` column meeting `Float` cells is widened
    /// to `Float` first. Returns `false` for any other type mismatch.
    fn extend_from(&mut self, other: &Column) -> bool {
        if let (Column::Int(a), Column::Float(_)) = (&*self, other) {
            let widened = Column::Float(a.iter().map(|x| x.map(|i| i as f64)).collect());
            *self = widened;
        }
        match (self, other) {
            (Column::Date(a), Column::Date(b)) => a.extend(b.iter().cloned()),
            (Column::Int(a), Column::Int(b)) => a.extend(b.iter().cloned()),
            (Column::Float(a), Column::Float(b)) => a.extend(b.iter().cloned()),
            (Column::Text(a), Column::Text(b)) => a.extend(b.iter().cloned()),
            (Column::Float(a), Column::Int(b)) => a.extend(b.iter().map(|x| x.map(|i| i as f64))),
            _ => return false,
        }
        true
    }
}

/// Ordered, column-oriented table of observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesFrame {
    columns: IndexMap<String, Column>,
    n_rows: usize,
}

impl TimeSeriesFrame {
    /// Empty frame with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from named columns, validating the row-count invariant.
    pub fn from_columns<I, S>(columns: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = (S, Column)>,
        S: Into<String>,
    {
        let mut frame = Self::new();
        for (name, column) in columns {
            frame.insert(name, column)?;
        }
        Ok(frame)
    }

    pub fn len(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Numeric view of a column (see [`Column::to_f64`]).
    pub fn numeric(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.columns.get(name).and_then(Column::to_f64)
    }

    pub fn dates(&self) -> Option<&[Option<NaiveDate>]> {
        match self.columns.get(DATE) {
            Some(Column::Date(v)) => Some(v),
            _ => None,
        }
    }

    /// Insert or replace a column.
    ///
    /// The first column inserted into a column-less frame fixes the row count.
    /// Replacing keeps the column's position; new columns are appended.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<(), AnalysisError> {
        let name = name.into();
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(AnalysisError::LengthMismatch {
                column: name,
                expected: self.n_rows,
                actual: column.len(),
            });
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Insert a column whose length is known to match (built from this frame's rows).
    pub(crate) fn put(&mut self, name: impl Into<String>, column: Column) {
        debug_assert!(self.columns.is_empty() || column.len() == self.n_rows);
        if self.columns.is_empty() {
            self.n_rows = column.len();
        }
        self.columns.insert(name.into(), column);
    }

    /// Remove a column, preserving the order of the rest.
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        self.columns.shift_remove(name)
    }

    /// Rename a column in place; no-op when `from` is absent.
    pub fn rename(&mut self, from: &str, to: impl Into<String>) {
        if let Some(idx) = self.columns.get_index_of(from) {
            let to = to.into();
            if let Some((_, column)) = self.columns.shift_remove_index(idx) {
                self.columns.shift_insert(idx, to, column);
            }
        }
    }

    /// Reorder all rows by the given permutation / selection of row indices.
    pub fn take_rows(&self, indices: &[usize]) -> TimeSeriesFrame {
        let picks: Vec<Option<usize>> = indices.iter().map(|&i| Some(i)).collect();
        let columns = self
            .columns
            .iter()
            .map(|(name, col)| (name.clone(), col.take(&picks)))
            .collect();
        TimeSeriesFrame {
            columns,
            n_rows: indices.len(),
        }
    }

    /// Keep only rows where `keep[i]` is true.
    pub fn filter_rows(&self, keep: &[bool]) -> TimeSeriesFrame {
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        self.take_rows(&indices)
    }

    /// Keep only the named columns (in frame order).
    pub fn select(&self, names: &[&str]) -> TimeSeriesFrame {
        let columns: IndexMap<String, Column> = self
            .columns
            .iter()
            .filter(|(name, _)| names.contains(&name.as_str()))
            .map(|(n, c)| (n.clone(), c.clone()))
            .collect();
        let n_rows = if columns.is_empty() { 0 } else { self.n_rows };
        TimeSeriesFrame { columns, n_rows }
    }

    /// Stable ascending sort on `date`, nulls last. Frames without `date` are returned as-is.
    pub fn sort_by_date(&self) -> TimeSeriesFrame {
        let Some(dates) = self.dates() else {
            return self.clone();
        };
        let mut order: Vec<usize> = (0..self.n_rows).collect();
        order.sort_by(|&a, &b| match (dates[a], dates[b]) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        if order.iter().enumerate().all(|(i, &j)| i == j) {
            return self.clone();
        }
        self.take_rows(&order)
    }

    /// Vertically concatenate frames, unioning their column sets.
    ///
    /// Columns missing from a part are null-filled. `Int` and `Float` parts
    /// of one column combine into `Float` in either order; any other type
    /// mismatch null-fills that part's cells with a warning.
    pub fn concat(parts: &[TimeSeriesFrame]) -> TimeSeriesFrame {
        let mut out = TimeSeriesFrame::new();
        let total: usize = parts.iter().map(TimeSeriesFrame::len).sum();
        let mut columns: IndexMap<String, Column> = IndexMap::new();
        let mut filled = 0usize;

        for part in parts {
            for (name, col) in &part.columns {
                if !columns.contains_key(name) {
                    columns.insert(name.clone(), Column::null_of_len(col, filled));
                }
            }
            for (name, col) in columns.iter_mut() {
                let ok = match part.columns.get(name) {
                    Some(src) => {
                        let ok = col.extend_from(src);
                        if !ok {
                            warn!(
                                column = %name,
                                have = col.kind(),
                                got = src.kind(),
                                "column type mismatch in concat; cells nulled"
                            );
                        }
                        ok
                    }
                    None => false,
                };
                if !ok {
                    let nulls = Column::null_of_len(col, part.len());
                    col.extend_from(&nulls);
                }
            }
            filled += part.len();
        }

        debug_assert_eq!(filled, total);
        for (name, col) in columns {
            out.put(name, col);
        }
        if out.columns.is_empty() {
            out.n_rows = 0;
        }
        out
    }

    /// Append a column with the same value on every row.
    pub fn with_constant(&self, name: &str, value: Cell) -> TimeSeriesFrame {
        let mut out = self.clone();
        let n = self.n_rows;
        let column = match value {
            Cell::Date(d) => Column::Date(vec![Some(d); n]),
            Cell::Int(i) => Column::Int(vec![Some(i); n]),
            Cell::Float(f) => Column::Float(vec![Some(f.0); n]),
            Cell::Text(s) => Column::Text(vec![Some(s); n]),
        };
        out.put(name, column);
        out
    }

    /// Integer view of a column, accepting floats that hold integral values.
    pub(crate) fn integers(&self, name: &str) -> Option<Result<Vec<Option<i64>>, AnalysisError>> {
        let col = self.columns.get(name)?;
        let type_err = || AnalysisError::ColumnType {
            column: name.to_string(),
            expected: "integer",
        };
        Some(match col {
            Column::Int(v) => Ok(v.clone()),
            Column::Float(v) => v
                .iter()
                .map(|x| match x {
                    Some(f) if f.fract() == 0.0 && f.is_finite() => Ok(Some(*f as i64)),
                    Some(_) => Err(type_err()),
                    None => Ok(None),
                })
                .collect(),
            Column::Date(_) | Column::Text(_) => Err(type_err()),
        })
    }
}

/// Year of a date as `i64`, used by period-part helpers.
pub(crate) fn year_of(d: NaiveDate) -> i64 {
    d.year() as i64
}
