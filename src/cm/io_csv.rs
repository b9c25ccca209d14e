// Primitives for reading CSV files.

use std::fs::File;

use survey_scores::builder::TableBuilder;

use crate::cm::*;

/// Reads a CSV file whose first row holds the column names.
pub fn read_csv_table(path: &str) -> CmResult<ResponseTable> {
    let mut records = get_records(path)?;

    let header: Vec<String> = match records.next() {
        Some(line_r) => line_r
            .context(CsvLineParseSnafu { lineno: 1usize })?
            .iter()
            .map(|s| s.trim().to_string())
            .collect(),
        None => whatever!("The CSV file {} is empty", path),
    };
    debug!("read_csv_table: header: {:?}", header);

    let mut builder = TableBuilder::new(&header);
    for (idx, line_r) in records.enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("read_csv_table: lineno: {:?} row: {:?}", lineno, &line);
        // Missing trailing cells are empty.
        ensure!(
            line.len() <= builder.num_columns(),
            CsvRowTooLongSnafu {
                lineno,
                expected: builder.num_columns(),
                found: line.len()
            }
        );
        let cells: Vec<Cell> = line.iter().map(Cell::parse).collect();
        builder.add_row_padded(cells).context(ScoringSnafu {})?;
    }
    let table = builder.build();
    info!(
        "Read {} rows from {}",
        table.num_rows(),
        simplify_file_name(path)
    );
    Ok(table)
}

fn get_records(path: &str) -> CmResult<csv::StringRecordsIntoIter<File>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(OpeningCsvSnafu { path })?;
    Ok(rdr.into_records())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_header_and_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.csv");
        std::fs::write(
            &path,
            "Start,End,Email,Name,Team,ID,Q1,Comments\n\
             s,e,a@x.org,A,,1,4,\"nice, really\"\n\
             s,e,b@x.org,B,,2,,\n",
        )
        .unwrap();
        let table = read_csv_table(path.to_str().unwrap()).unwrap();
        assert_eq!(table.columns().len(), 8);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.rows()[0][6], Cell::Number(4.0));
        assert_eq!(table.rows()[0][7], Cell::Text("nice, really".to_string()));
        assert_eq!(table.rows()[1][6], Cell::Empty);
        let (_, num_questions) = survey_scores::extract_questions(&table);
        assert_eq!(num_questions, vec!["Q1".to_string()]);
    }

    #[test]
    fn long_row_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.csv");
        std::fs::write(&path, "ID,Q1\n1,2\n1,2,3\n").unwrap();
        let err = read_csv_table(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            CmError::CsvRowTooLong {
                lineno: 3,
                expected: 2,
                found: 3
            }
        ));
        assert!(err.to_string().starts_with("Line 3 of the CSV file"));
    }

    #[test]
    fn short_rows_are_padded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.csv");
        std::fs::write(
            &path,
            "Start,End,Email,Name,Team,ID,Q1,Comments\n\
             s,e,a@x.org,A,,1,4,fine\n\
             s,e,b@x.org,B,,2,5\n",
        )
        .unwrap();
        let table = read_csv_table(path.to_str().unwrap()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.rows()[1].len(), 8);
        assert_eq!(table.rows()[1][6], Cell::Number(5.0));
        assert_eq!(table.rows()[1][7], Cell::Empty);
        let (_, num_questions) = survey_scores::extract_questions(&table);
        assert_eq!(num_questions, vec!["Q1".to_string()]);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_csv_table("/nonexistent/responses.csv"),
            Err(CmError::OpeningCsv { .. })
        ));
    }
}
