use calamine::{Data, ExcelDateTime, Reader, Xlsx, open_workbook_from_rs};
use chrono::NaiveTime;
use csv::ReaderBuilder;
use log::debug;
use std::io::Cursor;

use crate::error::{Result, SweeperError};
use crate::format::SourceFormat;
use crate::table::{Column, RawCell, Table, normalize_headers};

/// Parse an uploaded file's bytes into a table.
///
/// `name` is only used to label errors.
///
/// # Examples
/// ```
/// use data_sweeper::format::SourceFormat;
/// use data_sweeper::loader::parse_table;
///
/// let table = parse_table("people.csv", b"name,age\nann,31\nbo,\n", SourceFormat::Csv).unwrap();
/// assert_eq!(table.row_count(), 2);
/// assert!(table.column("age").unwrap().is_numeric());
/// ```
pub fn parse_table(name: &str, bytes: &[u8], format: SourceFormat) -> Result<Table> {
    let table = match format {
        SourceFormat::Csv => from_csv(name, bytes)?,
        SourceFormat::Excel => from_excel(name, bytes)?,
    };
    debug!(
        "parsed {}: {} rows x {} columns",
        name,
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

/// Load a table from comma-separated bytes. The first record is the header.
///
/// Short records are padded with missing values; records longer than the
/// header are rejected.
pub fn from_csv(name: &str, bytes: &[u8]) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| SweeperError::parse(name, e))?
        .clone();
    if headers.is_empty() {
        return Err(SweeperError::parse(name, "no columns to parse from file"));
    }

    let width = headers.len();
    let mut cells: Vec<Vec<RawCell>> = vec![Vec::new(); width];
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SweeperError::parse(name, e))?;
        if record.len() > width {
            return Err(SweeperError::parse(
                name,
                format!(
                    "expected {} fields in line {}, saw {}",
                    width,
                    index + 2,
                    record.len()
                ),
            ));
        }
        for (c, column) in cells.iter_mut().enumerate() {
            column.push(record.get(c).map_or(RawCell::Missing, RawCell::classify));
        }
    }

    build_table(normalize_headers(headers.iter()), cells)
}

/// Load the first worksheet of an XLSX workbook. The first row of the used
/// range is the header.
pub fn from_excel(name: &str, bytes: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).map_err(|e| SweeperError::parse(name, e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SweeperError::parse(name, "no sheets found in workbook"))?
        .map_err(|e| SweeperError::parse(name, e))?;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(Table::default());
    };

    let headers: Vec<String> = header_row.iter().map(header_text).collect();
    let width = headers.len();
    let mut cells: Vec<Vec<RawCell>> = vec![Vec::new(); width];
    for row in rows {
        for (c, column) in cells.iter_mut().enumerate() {
            column.push(row.get(c).map_or(RawCell::Missing, excel_cell));
        }
    }

    build_table(normalize_headers(headers), cells)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::Float(f) => crate::table::format_number(*f),
        Data::DateTime(dt) => datetime_text(dt),
        other => other.to_string(),
    }
}

/// Dates print as `%Y-%m-%d`, date-times with a time part as
/// `%Y-%m-%d %H:%M:%S`. Durations keep their serial value.
fn datetime_text(dt: &ExcelDateTime) -> String {
    match dt.as_datetime() {
        Some(value) if !dt.is_duration() => {
            if value.time() == NaiveTime::MIN {
                value.format("%Y-%m-%d").to_string()
            } else {
                value.format("%Y-%m-%d %H:%M:%S").to_string()
            }
        }
        _ => crate::table::format_number(dt.as_f64()),
    }
}

fn excel_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Missing,
        Data::Int(i) => RawCell::Number {
            value: *i as f64,
            text: i.to_string(),
        },
        Data::Float(f) if f.is_finite() => RawCell::Number {
            value: *f,
            text: crate::table::format_number(*f),
        },
        Data::String(s) => RawCell::classify(s),
        Data::DateTime(dt) => RawCell::Text(datetime_text(dt)),
        Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
        other => RawCell::Text(other.to_string()),
    }
}

fn build_table(headers: Vec<String>, cells: Vec<Vec<RawCell>>) -> Result<Table> {
    let rows = cells.first().map_or(0, Vec::len);
    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(header, column)| (header, Column::infer(column)))
        .collect();
    Table::with_rows(rows, columns)
}
