use chrono::NaiveDate;

/// Logical type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Text,
    Date,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    Text(&'a str),
    Date(NaiveDate),
    Number(Option<f64>),
}

impl Cell<'_> {
    /// Text rendering used by the flat-file writers; missing numbers are empty.
    pub fn render(&self) -> String {
        match self {
            Cell::Text(s) => s.to_string(),
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Number(Some(v)) => v.to_string(),
            Cell::Number(None) => String::new(),
        }
    }
}

/// A labeled, typed table that can be persisted or inspected by name.
pub trait Tabular: Send + Sync {
    fn schema(&self) -> Vec<(String, CellKind)>;
    fn num_rows(&self) -> usize;
    /// `col` indexes into `schema()`.
    fn cell(&self, row: usize, col: usize) -> Cell<'_>;

    fn column_names(&self) -> Vec<String> {
        self.schema().into_iter().map(|(name, _)| name).collect()
    }

    fn column_position(&self, name: &str) -> Option<usize> {
        self.schema().iter().position(|(n, _)| n == name)
    }

    /// Numeric cells of `name`; `None` when the column does not exist.
    fn numbers(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let col = self.column_position(name)?;
        Some(
            (0..self.num_rows())
                .map(|row| match self.cell(row, col) {
                    Cell::Number(v) => v,
                    Cell::Text(s) => super::utils::parse_f64(s),
                    Cell::Date(_) => None,
                })
                .collect(),
        )
    }
}
