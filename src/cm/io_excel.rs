use calamine::{open_workbook, DataType, Range, Reader, Xls, Xlsx};

use survey_scores::builder::TableBuilder;

use crate::cm::*;

/// Reads the first worksheet of an Excel workbook, or the named one.
///
/// The first row holds the column names.
pub fn read_excel_table(
    path: &str,
    format: InputFormat,
    worksheet_name: Option<&str>,
) -> CmResult<ResponseTable> {
    debug!(
        "read_excel_table: path: {:?} worksheet: {:?}",
        path, worksheet_name
    );
    let wrange = match format {
        InputFormat::Xls => {
            let mut workbook: Xls<_> =
                open_workbook(path).context(OpeningXlsSnafu { path })?;
            get_range(&mut workbook, worksheet_name)
                .context(EmptyExcelSnafu {})?
                .context(OpeningXlsSnafu { path })?
        }
        _ => {
            let mut workbook: Xlsx<_> =
                open_workbook(path).context(OpeningExcelSnafu { path })?;
            get_range(&mut workbook, worksheet_name)
                .context(EmptyExcelSnafu {})?
                .context(OpeningExcelSnafu { path })?
        }
    };
    let table = range_to_table(&wrange)?;
    info!(
        "Read {} rows from {}",
        table.num_rows(),
        simplify_file_name(path)
    );
    Ok(table)
}

fn get_range<R: Reader>(
    workbook: &mut R,
    worksheet_name: Option<&str>,
) -> Option<Result<Range<DataType>, R::Error>> {
    match worksheet_name {
        Some(name) => workbook.worksheet_range(name),
        None => workbook.worksheet_range_at(0),
    }
}

fn range_to_table(wrange: &Range<DataType>) -> CmResult<ResponseTable> {
    let mut iter = wrange.rows();
    let header: Vec<String> = iter
        .next()
        .context(EmptyExcelSnafu {})?
        .iter()
        .map(|c| read_cell(c).display_value().unwrap_or_default())
        .collect();
    debug!("range_to_table: header: {:?}", header);

    let mut builder = TableBuilder::new(&header);
    for (idx, row) in iter.enumerate() {
        let cells: Vec<Cell> = row.iter().map(read_cell).collect();
        debug!("range_to_table: idx: {:?} row: {:?}", idx, &cells);
        builder.add_row_padded(cells).context(ScoringSnafu {})?;
    }
    Ok(builder.build())
}

fn read_cell(cell: &DataType) -> Cell {
    match cell {
        DataType::Int(i) => Cell::Number(*i as f64),
        DataType::Float(f) => Cell::Number(*f),
        DataType::String(s) if s.trim().is_empty() => Cell::Empty,
        DataType::String(s) => Cell::Text(s.clone()),
        DataType::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
        // Serial number of the date.
        DataType::DateTime(f) => Cell::Number(*f),
        DataType::Empty => Cell::Empty,
        DataType::Error(e) => {
            warn!("read_cell: error cell {:?} read as empty", e);
            Cell::Empty
        }
        #[allow(unreachable_patterns)]
        _ => {
            warn!("read_cell: could not understand cell {:?}", cell);
            Cell::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells() {
        assert_eq!(read_cell(&DataType::Int(4)), Cell::Number(4.0));
        assert_eq!(read_cell(&DataType::Float(-2.0)), Cell::Number(-2.0));
        assert_eq!(read_cell(&DataType::String(" ".to_string())), Cell::Empty);
        assert_eq!(
            read_cell(&DataType::String("great".to_string())),
            Cell::Text("great".to_string())
        );
        assert_eq!(read_cell(&DataType::Bool(true)), Cell::Number(1.0));
        assert_eq!(read_cell(&DataType::Empty), Cell::Empty);
    }

    #[test]
    fn range_with_header() {
        let mut range: Range<DataType> = Range::new((0, 0), (2, 2));
        range.set_value((0, 0), DataType::String("ID".to_string()));
        range.set_value((0, 1), DataType::String("Q1".to_string()));
        range.set_value((0, 2), DataType::String("Q2".to_string()));
        range.set_value((1, 0), DataType::Int(7));
        range.set_value((1, 1), DataType::Float(5.0));
        range.set_value((2, 0), DataType::Int(8));
        range.set_value((2, 2), DataType::String("text".to_string()));
        let table = range_to_table(&range).unwrap();
        assert_eq!(table.columns(), &["ID", "Q1", "Q2"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.rows()[0][2], Cell::Empty);
        let users = survey_scores::extract_users(&table).unwrap();
        assert_eq!(users[1].as_str(), "8");
    }

    #[test]
    fn missing_workbook() {
        assert!(matches!(
            read_excel_table("/nonexistent/responses.xlsx", InputFormat::Xlsx, None),
            Err(CmError::OpeningExcel { .. })
        ));
    }
}
