//! Tabular result of one extraction

use serde::Serialize;

use super::value::Scalar;

/// One row, positionally aligned with [`ResultSet::columns`]
pub type Row = Vec<Scalar>;

/// Query result set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<Row>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl ResultSet {
    /// Create a new result set
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Create a result set from borrowed column names
    pub fn from_rows(columns: &[&str], rows: Vec<Row>) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column (exact match first, then case-insensitive)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Value of a named column in a row
    pub fn value(&self, row: usize, column: &str) -> Option<&Scalar> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of a named column
    pub fn column_values(&self, column: &str) -> Option<Vec<&Scalar>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Add a column, returning its index
    ///
    /// Existing columns with the same name are reused; new columns are
    /// filled with NULL in every row.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Scalar::Null);
        }
        self.columns.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let result = ResultSet::empty();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_column_lookup_is_case_insensitive_fallback() {
        let result = ResultSet::from_rows(
            &["idturno", "turno"],
            vec![vec![Scalar::Int(1), Scalar::from("Mañana")]],
        );
        assert_eq!(result.column_index("idTurno"), Some(0));
        assert_eq!(result.value(0, "Turno"), Some(&Scalar::from("Mañana")));
        assert_eq!(result.value(1, "Turno"), None);
        assert!(result.column_index("missing").is_none());
    }

    #[test]
    fn test_ensure_column_pads_rows() {
        let mut result = ResultSet::from_rows(&["a"], vec![vec![Scalar::Int(1)]]);
        let idx = result.ensure_column("b");
        assert_eq!(idx, 1);
        assert_eq!(result.rows[0], vec![Scalar::Int(1), Scalar::Null]);
        assert_eq!(result.ensure_column("a"), 0);
    }
}
