use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SweeperError};

pub const CSV_MIME: &str = "text/csv";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Formats accepted on upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Excel,
}

/// Formats a table can be converted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Csv,
    Excel,
}

impl TargetFormat {
    /// Canonical extension, leading dot included
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Csv => ".csv",
            TargetFormat::Excel => ".xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            TargetFormat::Csv => CSV_MIME,
            TargetFormat::Excel => XLSX_MIME,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TargetFormat::Csv => "csv",
            TargetFormat::Excel => "excel",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetFormat {
    type Err = SweeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(TargetFormat::Csv),
            "excel" | "xlsx" => Ok(TargetFormat::Excel),
            other => Err(SweeperError::UnsupportedFormat {
                extension: other.to_string(),
            }),
        }
    }
}

/// Lowercased extension of `file_name` with its leading dot, or an empty
/// string when there is none. Dot-files such as `.csv` have no extension.
pub fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Classify an uploaded file by its name.
///
/// # Examples
/// ```
/// use data_sweeper::format::{detect_format, SourceFormat};
///
/// assert_eq!(detect_format("sales.CSV").unwrap(), SourceFormat::Csv);
/// assert_eq!(detect_format("sales.xlsx").unwrap(), SourceFormat::Excel);
/// assert!(detect_format("notes.txt").is_err());
/// ```
pub fn detect_format(file_name: &str) -> Result<SourceFormat> {
    let extension = extension_of(file_name);
    match extension.as_str() {
        ".csv" => Ok(SourceFormat::Csv),
        ".xlsx" => Ok(SourceFormat::Excel),
        _ => Err(SweeperError::UnsupportedFormat { extension }),
    }
}

/// Name of the converted file: the last extension of `original` replaced by
/// the target's canonical one.
pub fn output_file_name(original: &str, target: TargetFormat) -> String {
    let extension_len = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(0, |ext| ext.len() + 1);
    let stem = &original[..original.len() - extension_len];
    format!("{}{}", stem, target.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_with_dot() {
        assert_eq!(extension_of("Data.XLSX"), ".xlsx");
        assert_eq!(extension_of("archive.tar.csv"), ".csv");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".csv"), "");
    }

    #[test]
    fn unsupported_extensions_are_rejected() {
        match detect_format("data.txt") {
            Err(SweeperError::UnsupportedFormat { extension }) => assert_eq!(extension, ".txt"),
            other => panic!("expected unsupported format, got {:?}", other),
        }
        assert!(detect_format("legacy.xls").is_err());
        assert!(detect_format("noext").is_err());
    }

    #[test]
    fn output_names_swap_extension() {
        assert_eq!(output_file_name("report.csv", TargetFormat::Excel), "report.xlsx");
        assert_eq!(output_file_name("report.xlsx", TargetFormat::Csv), "report.csv");
        assert_eq!(output_file_name("Report.CSV", TargetFormat::Excel), "Report.xlsx");
        assert_eq!(output_file_name("a.csv.csv", TargetFormat::Csv), "a.csv.csv");
        assert_eq!(output_file_name("noext", TargetFormat::Csv), "noext.csv");
    }

    #[test]
    fn target_metadata() {
        assert_eq!(TargetFormat::Csv.mime_type(), "text/csv");
        assert_eq!(
            TargetFormat::Excel.mime_type(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!("Excel".parse::<TargetFormat>().unwrap(), TargetFormat::Excel);
        assert_eq!("xlsx".parse::<TargetFormat>().unwrap(), TargetFormat::Excel);
        assert!("parquet".parse::<TargetFormat>().is_err());
    }
}
