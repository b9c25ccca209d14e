use log::debug;

pub use crate::config::*;

/// A builder for assembling a response table row by row.
///
/// Readers for the various upload formats go through this builder so that the
/// width of every row is checked once.
///
/// ```
/// pub use survey_scores::builder::TableBuilder;
/// # use survey_scores::ScoreErrors;
///
/// let mut builder = TableBuilder::new(&["ID".to_string(), "Q1".to_string()]);
///
/// builder.add_row_simple(&["alice", "4"])?;
/// builder.add_row_simple(&["bob", ""])?;
///
/// let table = builder.build();
/// assert_eq!(table.num_rows(), 2);
///
/// # Ok::<(), ScoreErrors>(())
/// ```
pub struct TableBuilder {
    pub(crate) _columns: Vec<String>,
    pub(crate) _rows: Vec<Vec<Cell>>,
}

impl TableBuilder {
    /// Starts a table with the given header.
    ///
    /// Column names must be unique for questions to be looked up by name:
    /// a blank name becomes `Unnamed: <index>` and the repeats of a name get
    /// a `.1`, `.2`, ... suffix.
    pub fn new(columns: &[String]) -> TableBuilder {
        let mut names: Vec<String> = Vec::with_capacity(columns.len());
        for (idx, raw) in columns.iter().enumerate() {
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                raw.clone()
            };
            let mut name = base.clone();
            let mut k = 0;
            while names.contains(&name) {
                k += 1;
                name = format!("{}.{}", base, k);
            }
            if &name != raw {
                debug!("TableBuilder: column {} {:?} renamed to {:?}", idx, raw, name);
            }
            names.push(name);
        }
        TableBuilder {
            _columns: names,
            _rows: Vec::new(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self._columns.len()
    }

    /// Adds a row of raw textual cells, interpreted with [`Cell::parse`].
    ///
    /// It is the simplest use case for CSV-like sources.
    pub fn add_row_simple(&mut self, cells: &[&str]) -> Result<(), ScoreErrors> {
        self.add_row(cells.iter().map(|s| Cell::parse(s)).collect())
    }

    /// Adds a row of typed cells. The row must have exactly one cell per column.
    pub fn add_row(&mut self, cells: Vec<Cell>) -> Result<(), ScoreErrors> {
        if cells.len() != self._columns.len() {
            return Err(ScoreErrors::RowWidth {
                row: self._rows.len() + 1,
                expected: self._columns.len(),
                found: cells.len(),
            });
        }
        self._rows.push(cells);
        Ok(())
    }

    /// Adds a row that may be shorter than the header, as happens with
    /// spreadsheets and CSV exports where the trailing cells were never filled.
    /// Longer rows are still rejected.
    pub fn add_row_padded(&mut self, mut cells: Vec<Cell>) -> Result<(), ScoreErrors> {
        if cells.len() < self._columns.len() {
            cells.resize(self._columns.len(), Cell::Empty);
        }
        self.add_row(cells)
    }

    pub fn build(self) -> ResponseTable {
        ResponseTable {
            columns: self._columns,
            rows: self._rows,
        }
    }
}
