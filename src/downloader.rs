use csv::WriterBuilder;
use log::info;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::error::{Result, SweeperError};
use crate::format::{TargetFormat, output_file_name};
use crate::table::{Table, Value};

/// A converted file, ready for download.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputArtifact {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: &'static str,
}

/// Convert a table to CSV
///
/// Writes a header row with the column names followed by one record per
/// row. There is no index column. Missing cells become empty fields, and
/// fields containing commas, quotes or newlines are quoted.
///
/// # Examples
/// ```
/// use data_sweeper::downloader::to_csv;
/// use data_sweeper::table::{Column, Table};
///
/// let table = Table::from_columns(vec![
///     ("a".to_string(), Column::Numeric(vec![Some(1.0), None, Some(2.5)])),
///     ("b".to_string(), Column::Text(vec![Some("x".to_string()), Some("y, z".to_string()), None])),
/// ]).unwrap();
/// assert_eq!(to_csv(&table).unwrap(), b"a,b\n1,x\n,\"y, z\"\n2.5,\n");
/// ```
pub fn to_csv(table: &Table) -> Result<Vec<u8>> {
    let encode_err = |e: csv::Error| SweeperError::encode("csv", e);
    let mut writer = WriterBuilder::new().delimiter(b',').from_writer(Vec::new());

    if table.column_count() > 0 {
        writer.write_record(table.column_names()).map_err(encode_err)?;
        for r in 0..table.row_count() {
            let record: Vec<String> = table.row(r).iter().map(|v| v.to_string()).collect();
            writer.write_record(&record).map_err(encode_err)?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| SweeperError::encode("csv", e.error()))
}

/// Convert a table to XLSX
///
/// Produces a workbook with a single worksheet named `Sheet1`: a header row
/// of column names, then the data. Numbers are written as numeric cells,
/// text as string cells, and missing cells are left blank.
///
/// # Errors
/// Non-finite numbers and anything the workbook writer rejects (sheet size
/// limits, overlong strings) fail with [`SweeperError::Encode`].
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>> {
    let encode_err = |e: rust_xlsxwriter::XlsxError| SweeperError::encode("excel", e);

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Sheet1").map_err(encode_err)?;

    for (c, name) in table.column_names().iter().enumerate() {
        let col = column_index(c)?;
        worksheet.write_string(0, col, name).map_err(encode_err)?;
    }

    for r in 0..table.row_count() {
        let row = u32::try_from(r + 1)
            .map_err(|_| SweeperError::encode("excel", "too many rows for a worksheet"))?;
        for (c, value) in table.row(r).into_iter().enumerate() {
            let col = column_index(c)?;
            match value {
                Value::Missing => {}
                Value::Number(n) if !n.is_finite() => {
                    return Err(SweeperError::encode(
                        "excel",
                        format!("unsupported cell value {} in row {}", n, r + 1),
                    ));
                }
                Value::Number(n) => {
                    worksheet.write_number(row, col, n).map_err(encode_err)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(row, col, s).map_err(encode_err)?;
                }
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(encode_err)
}

fn column_index(c: usize) -> Result<u16> {
    u16::try_from(c).map_err(|_| SweeperError::encode("excel", "too many columns for a worksheet"))
}

/// Serialize `table` to `target` and name the result after `original_name`.
pub fn export(table: &Table, target: TargetFormat, original_name: &str) -> Result<OutputArtifact> {
    let bytes = match target {
        TargetFormat::Csv => to_csv(table)?,
        TargetFormat::Excel => to_xlsx(table)?,
    };
    let file_name = output_file_name(original_name, target);
    info!("converted {} to {} ({} bytes)", original_name, file_name, bytes.len());
    Ok(OutputArtifact {
        bytes,
        file_name,
        mime_type: target.mime_type(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn sample() -> Table {
        Table::from_columns(vec![
            ("id".to_string(), Column::Numeric(vec![Some(1.0), Some(2.0)])),
            (
                "note".to_string(),
                Column::Text(vec![Some("hello, \"world\"".to_string()), None]),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn csv_quotes_and_blanks() {
        let csv = String::from_utf8(to_csv(&sample()).unwrap()).unwrap();
        assert_eq!(csv, "id,note\n1,\"hello, \"\"world\"\"\"\n2,\n");
    }

    #[test]
    fn csv_of_table_without_columns_is_empty() {
        let table = Table::with_rows(3, Vec::new()).unwrap();
        assert!(to_csv(&table).unwrap().is_empty());
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let bytes = to_xlsx(&sample()).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn xlsx_rejects_non_finite_numbers() {
        let table = Table::from_columns(vec![(
            "x".to_string(),
            Column::Numeric(vec![Some(f64::INFINITY)]),
        )])
        .unwrap();
        assert!(matches!(to_xlsx(&table), Err(SweeperError::Encode { .. })));
    }

    #[test]
    fn export_names_and_types_the_artifact() {
        let artifact = export(&sample(), TargetFormat::Excel, "report.csv").unwrap();
        assert_eq!(artifact.file_name, "report.xlsx");
        assert_eq!(
            artifact.mime_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );

        let artifact = export(&sample(), TargetFormat::Csv, "report.xlsx").unwrap();
        assert_eq!(artifact.file_name, "report.csv");
        assert_eq!(artifact.mime_type, "text/csv");
    }
}
