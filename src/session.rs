//! Per-upload pipeline state.
//!
//! Every uploaded file gets a stable [`UploadId`] and its own [`FileEntry`].
//! An entry moves through
//! `Uploaded → Parsed → (Cleaned)? → (Visualized)? → Converted → Delivered`,
//! one explicit user action per transition, or ends in `Rejected` when the
//! file cannot be read. Entries never share state, so one file's failure
//! leaves the others untouched.

use log::{info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::cleaner;
use crate::downloader::{self, OutputArtifact};
use crate::error::{Result, SweeperError};
use crate::format::{self, TargetFormat};
use crate::graph::{self, ChartData};
use crate::loader;
use crate::table::{Table, TablePreview};

pub const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Stable identifier of one upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UploadId(Uuid);

impl UploadId {
    pub fn new() -> Self {
        UploadId(Uuid::new_v4())
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UploadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(UploadId)
    }
}

/// A file as received from the user.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
    pub extension: String,
    pub content: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        let name = name.into();
        UploadedFile {
            extension: format::extension_of(&name),
            size_bytes: content.len() as u64,
            name,
            content,
        }
    }

    /// Size in kilobytes with two decimals, e.g. `1.50 KB`.
    pub fn size_label(&self) -> String {
        format_size_kb(self.size_bytes)
    }
}

pub fn format_size_kb(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Uploaded,
    Parsed,
    Cleaned,
    Visualized,
    Converted,
    Delivered,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Warning,
    Error,
}

/// A status line shown to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Notice {
            level: Level::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice {
            level: Level::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            level: Level::Error,
            message: message.into(),
        }
    }

    /// Advisory errors become warnings, everything else an error.
    pub fn from_error(err: &SweeperError) -> Self {
        if err.is_warning() {
            Notice::warning(err.to_string())
        } else {
            Notice::error(err.to_string())
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Level::Success => write!(f, "{}", self.message),
            Level::Warning => write!(f, "warning: {}", self.message),
            Level::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// User choices for one file.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FileOptions {
    pub cleaning_enabled: bool,
    pub chart_columns: Vec<String>,
    pub target: TargetFormat,
}

/// One upload's pipeline state.
#[derive(Debug)]
pub struct FileEntry {
    id: UploadId,
    file: UploadedFile,
    stage: Stage,
    table: Option<Table>,
    rejection: Option<String>,
    options: FileOptions,
    artifact: Option<OutputArtifact>,
}

impl FileEntry {
    /// Receive a file, then detect its format and parse it straight away.
    fn receive(file: UploadedFile) -> Self {
        let mut entry = FileEntry {
            id: UploadId::new(),
            file,
            stage: Stage::Uploaded,
            table: None,
            rejection: None,
            options: FileOptions::default(),
            artifact: None,
        };
        let parsed = format::detect_format(&entry.file.name).and_then(|source| {
            loader::parse_table(&entry.file.name, &entry.file.content, source)
        });
        match parsed {
            Ok(table) => {
                info!(
                    "parsed {} ({}): {} rows, {} columns",
                    entry.file.name,
                    entry.file.size_label(),
                    table.row_count(),
                    table.column_count()
                );
                entry.options.chart_columns = graph::default_chart_columns(&table);
                entry.table = Some(table);
                entry.stage = Stage::Parsed;
            }
            Err(err) => {
                warn!("rejected {}: {}", entry.file.name, err);
                entry.rejection = Some(err.to_string());
                entry.stage = Stage::Rejected;
            }
        }
        entry
    }

    pub fn id(&self) -> UploadId {
        self.id
    }

    pub fn file(&self) -> &UploadedFile {
        &self.file
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    pub fn artifact(&self) -> Option<&OutputArtifact> {
        self.artifact.as_ref()
    }

    fn rejected(&self) -> SweeperError {
        SweeperError::FileRejected {
            name: self.file.name.clone(),
            reason: self.rejection.clone().unwrap_or_default(),
        }
    }

    fn table_ref(&self) -> Result<&Table> {
        self.table.as_ref().ok_or_else(|| self.rejected())
    }

    /// Mutable table access for a cleaning step.
    fn cleanable(&mut self) -> Result<&mut Table> {
        match self.table.as_mut() {
            None => Err(SweeperError::FileRejected {
                name: self.file.name.clone(),
                reason: self.rejection.clone().unwrap_or_default(),
            }),
            Some(_) if !self.options.cleaning_enabled => {
                Err(SweeperError::CleaningDisabled(self.file.name.clone()))
            }
            Some(table) => Ok(table),
        }
    }

    fn mark_cleaned(&mut self) {
        self.stage = Stage::Cleaned;
        self.artifact = None;
        let table = self.table.as_ref();
        // Chart picks that no longer name a numeric column are dropped
        self.options.chart_columns.retain(|name| {
            table
                .and_then(|t| t.column(name))
                .is_some_and(|column| column.is_numeric())
        });
    }

    pub fn summary(&self, preview_rows: usize) -> FileSummary {
        FileSummary {
            id: self.id,
            name: self.file.name.clone(),
            size_bytes: self.file.size_bytes,
            size: self.file.size_label(),
            stage: self.stage,
            error: self.rejection.clone(),
            columns: self
                .table
                .as_ref()
                .map(|t| t.column_names().to_vec())
                .unwrap_or_default(),
            numeric_columns: self
                .table
                .as_ref()
                .map(graph::numeric_columns)
                .unwrap_or_default(),
            preview: self.table.as_ref().map(|t| t.preview(preview_rows)),
            options: self.options.clone(),
            artifact: self.artifact.as_ref().map(|a| ArtifactInfo {
                file_name: a.file_name.clone(),
                mime_type: a.mime_type,
                size: a.bytes.len(),
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ArtifactInfo {
    pub file_name: String,
    pub mime_type: &'static str,
    pub size: usize,
}

/// Everything the UI shows about one file.
#[derive(Clone, Debug, Serialize)]
pub struct FileSummary {
    pub id: UploadId,
    pub name: String,
    pub size_bytes: u64,
    pub size: String,
    pub stage: Stage,
    pub error: Option<String>,
    pub columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub preview: Option<TablePreview>,
    pub options: FileOptions,
    pub artifact: Option<ArtifactInfo>,
}

/// All uploads of one user session, in upload order.
#[derive(Debug, Default)]
pub struct Session {
    entries: HashMap<UploadId, FileEntry>,
    order: Vec<UploadId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers and parses an uploaded file
    ///
    /// The file's format is detected from its name and its bytes are parsed
    /// straight away. Never fails: a file that cannot be read is kept as
    /// `Rejected` with the reason.
    ///
    /// # Arguments
    /// * `file` - Name and raw bytes as received
    ///
    /// # Returns
    /// * `(UploadId, Notice)` - The new entry's id and an error notice when the
    ///   file was rejected, a success notice otherwise
    pub fn upload(&mut self, file: UploadedFile) -> (UploadId, Notice) {
        let entry = FileEntry::receive(file);
        let id = entry.id;
        let notice = match &entry.rejection {
            Some(reason) => Notice::error(reason.clone()),
            None => Notice::success(format!("Loaded {}", entry.file.name)),
        };
        self.order.push(id);
        self.entries.insert(id, entry);
        (id, notice)
    }

    /// Upload several files in order; the closing notice marks the batch done.
    pub fn upload_all(&mut self, files: Vec<UploadedFile>) -> (Vec<UploadId>, Vec<Notice>) {
        let mut ids = Vec::with_capacity(files.len());
        let mut notices = Vec::with_capacity(files.len() + 1);
        for file in files {
            let (id, notice) = self.upload(file);
            ids.push(id);
            notices.push(notice);
        }
        notices.push(Notice::success("🎉 All files processed!"));
        (ids, notices)
    }

    /// Looks up an entry, failing with `UnknownUpload` for ids this session
    /// never issued or has removed.
    pub fn get(&self, id: UploadId) -> Result<&FileEntry> {
        self.entries.get(&id).ok_or(SweeperError::UnknownUpload(id))
    }

    fn get_mut(&mut self, id: UploadId) -> Result<&mut FileEntry> {
        self.entries
            .get_mut(&id)
            .ok_or(SweeperError::UnknownUpload(id))
    }

    /// Entries in upload order.
    pub fn entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drops an entry together with its table and artifact.
    pub fn remove(&mut self, id: UploadId) -> Result<FileEntry> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or(SweeperError::UnknownUpload(id))?;
        self.order.retain(|other| *other != id);
        Ok(entry)
    }

    /// Tick or untick the "clean data" box.
    pub fn set_cleaning(&mut self, id: UploadId, enabled: bool) -> Result<()> {
        let entry = self.get_mut(id)?;
        entry.table_ref()?;
        entry.options.cleaning_enabled = enabled;
        Ok(())
    }

    /// Removes duplicate rows, keeping the first of each
    ///
    /// # Arguments
    /// * `id` - The upload to clean; cleaning must be enabled for it
    ///
    /// # Returns
    /// * `Result<Notice>` - "✅ Duplicates Removed!", or `CleaningDisabled` /
    ///   `FileRejected` / `UnknownUpload`
    pub fn remove_duplicates(&mut self, id: UploadId) -> Result<Notice> {
        let entry = self.get_mut(id)?;
        let removed = cleaner::remove_duplicates(entry.cleanable()?);
        entry.mark_cleaned();
        info!("{}: removed {} duplicate rows", entry.file.name, removed);
        Ok(Notice::success("✅ Duplicates Removed!"))
    }

    /// Replaces missing numeric values with their column's mean
    ///
    /// # Arguments
    /// * `id` - The upload to clean; cleaning must be enabled for it
    ///
    /// # Returns
    /// * `Result<Notice>` - "✅ Missing Values Filled!" on success
    pub fn fill_missing(&mut self, id: UploadId) -> Result<Notice> {
        let entry = self.get_mut(id)?;
        let filled = cleaner::fill_missing_numeric(entry.cleanable()?);
        entry.mark_cleaned();
        info!("{}: filled {} missing values", entry.file.name, filled);
        Ok(Notice::success("✅ Missing Values Filled!"))
    }

    /// Keeps only `columns`, in the given order
    ///
    /// # Arguments
    /// * `id` - The upload to clean; cleaning must be enabled for it
    /// * `columns` - Column names to keep; an unknown name changes nothing
    ///
    /// # Returns
    /// * `Result<Notice>` - How many columns remain, or `UnknownColumn`
    pub fn select_columns<S: AsRef<str>>(&mut self, id: UploadId, columns: &[S]) -> Result<Notice> {
        let entry = self.get_mut(id)?;
        cleaner::select_columns(entry.cleanable()?, columns)?;
        entry.mark_cleaned();
        Ok(Notice::success(format!(
            "Keeping {} columns",
            entry.table.as_ref().map_or(0, Table::column_count)
        )))
    }

    /// Projects the chosen columns for charting
    ///
    /// The choice is remembered even when it only produces a warning.
    ///
    /// # Arguments
    /// * `id` - The upload to chart
    /// * `columns` - Numeric column names to plot
    ///
    /// # Returns
    /// * `Result<ChartData>` - The series to draw, or one of the advisory
    ///   errors `NoNumericColumns` / `NoColumnsSelected`
    /// * Moves the entry to `Visualized` when it was `Parsed` or `Cleaned`
    pub fn chart<S: AsRef<str>>(&mut self, id: UploadId, columns: &[S]) -> Result<ChartData> {
        let entry = self.get_mut(id)?;
        let table = entry.table_ref()?;
        let data = graph::chart_data(table, columns);
        entry.options.chart_columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        match data {
            Ok(data) => {
                if matches!(entry.stage, Stage::Parsed | Stage::Cleaned) {
                    entry.stage = Stage::Visualized;
                }
                Ok(data)
            }
            Err(err) => {
                if err.is_warning() {
                    warn!("{}: {}", entry.file.name, err);
                }
                Err(err)
            }
        }
    }

    /// Encodes the current table
    ///
    /// Converting again re-encodes and replaces the stored artifact.
    ///
    /// # Arguments
    /// * `id` - The upload to convert
    /// * `target` - CSV or Excel
    ///
    /// # Returns
    /// * `Result<&OutputArtifact>` - The stored artifact with its file name
    ///   and MIME type
    pub fn convert(&mut self, id: UploadId, target: TargetFormat) -> Result<&OutputArtifact> {
        let entry = self.get_mut(id)?;
        let artifact = downloader::export(entry.table_ref()?, target, &entry.file.name)?;
        entry.options.target = target;
        entry.stage = Stage::Converted;
        let artifact = entry.artifact.insert(artifact);
        Ok(&*artifact)
    }

    /// Hands over the last converted artifact and marks the entry
    /// `Delivered`. Fails with `NotConverted` before the first conversion.
    pub fn download(&mut self, id: UploadId) -> Result<&OutputArtifact> {
        let entry = self.get_mut(id)?;
        entry.table_ref()?;
        if entry.artifact.is_none() {
            return Err(SweeperError::NotConverted(entry.file.name.clone()));
        }
        entry.stage = Stage::Delivered;
        entry
            .artifact
            .as_ref()
            .ok_or_else(|| SweeperError::NotConverted(entry.file.name.clone()))
    }

    pub fn summaries(&self, preview_rows: usize) -> Vec<FileSummary> {
        self.entries().map(|e| e.summary(preview_rows)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn csv_upload(name: &str, body: &str) -> UploadedFile {
        UploadedFile::new(name, body.as_bytes().to_vec())
    }

    fn session_with(body: &str) -> (Session, UploadId) {
        let mut session = Session::new();
        let (id, _) = session.upload(csv_upload("data.csv", body));
        (session, id)
    }

    #[test]
    fn upload_parses_supported_files() {
        let (session, id) = session_with("a,b\n1,x\n2,y\n");
        let entry = session.get(id).unwrap();
        assert_eq!(entry.stage(), Stage::Parsed);
        assert_eq!(entry.table().unwrap().row_count(), 2);
        assert_eq!(entry.options().chart_columns, ["a"]);
    }

    #[test]
    fn unsupported_file_is_rejected_without_table() {
        let mut session = Session::new();
        let (id, notice) = session.upload(csv_upload("data.txt", "a\n1\n"));
        assert_eq!(notice, Notice::error("Unsupported file type: .txt"));
        let entry = session.get(id).unwrap();
        assert_eq!(entry.stage(), Stage::Rejected);
        assert!(entry.table().is_none());
        assert!(matches!(
            session.convert(id, TargetFormat::Csv),
            Err(SweeperError::FileRejected { .. })
        ));
    }

    #[test]
    fn one_bad_file_does_not_stop_the_others() {
        let mut session = Session::new();
        let (ids, notices) = session.upload_all(vec![
            csv_upload("a.csv", "x\n1\n"),
            csv_upload("b.txt", "x\n1\n"),
            csv_upload("c.csv", "x,y\n1,2,3\n"),
            csv_upload("d.csv", "x\n2\n"),
        ]);
        let stages: Vec<Stage> = ids.iter().map(|id| session.get(*id).unwrap().stage()).collect();
        assert_eq!(
            stages,
            [Stage::Parsed, Stage::Rejected, Stage::Rejected, Stage::Parsed]
        );
        assert_eq!(notices.last().unwrap().message, "🎉 All files processed!");
        let names: Vec<&str> = session.entries().map(|e| e.file().name.as_str()).collect();
        assert_eq!(names, ["a.csv", "b.txt", "c.csv", "d.csv"]);
    }

    #[test]
    fn same_name_uploads_do_not_collide() {
        let mut session = Session::new();
        let (first, _) = session.upload(csv_upload("data.csv", "a\n1\n"));
        let (second, _) = session.upload(csv_upload("data.csv", "a\n1\n2\n"));
        assert_ne!(first, second);
        assert_eq!(session.len(), 2);
        assert_eq!(session.get(first).unwrap().table().unwrap().row_count(), 1);
        assert_eq!(session.get(second).unwrap().table().unwrap().row_count(), 2);
    }

    #[test]
    fn cleaning_requires_the_checkbox() {
        let (mut session, id) = session_with("a\n1\n1\n");
        assert!(matches!(
            session.remove_duplicates(id),
            Err(SweeperError::CleaningDisabled(_))
        ));
        session.set_cleaning(id, true).unwrap();
        let notice = session.remove_duplicates(id).unwrap();
        assert_eq!(notice.message, "✅ Duplicates Removed!");
        let entry = session.get(id).unwrap();
        assert_eq!(entry.stage(), Stage::Cleaned);
        assert_eq!(entry.table().unwrap().row_count(), 1);
    }

    #[test]
    fn fill_missing_then_convert_and_download() {
        let (mut session, id) = session_with("a,b\n1,x\n,y\n3,z\n");
        session.set_cleaning(id, true).unwrap();
        session.fill_missing(id).unwrap();
        assert_eq!(
            session.get(id).unwrap().table().unwrap().column("a"),
            Some(&Column::Numeric(vec![Some(1.0), Some(2.0), Some(3.0)]))
        );

        assert!(matches!(session.download(id), Err(SweeperError::NotConverted(_))));
        let artifact = session.convert(id, TargetFormat::Csv).unwrap();
        assert_eq!(artifact.bytes, b"a,b\n1,x\n2,y\n3,z\n");
        assert_eq!(session.get(id).unwrap().stage(), Stage::Converted);

        let artifact = session.download(id).unwrap().clone();
        assert_eq!(artifact.file_name, "data.csv");
        assert_eq!(session.get(id).unwrap().stage(), Stage::Delivered);
        assert_eq!(session.download(id).unwrap(), &artifact);
    }

    #[test]
    fn cleaning_after_conversion_discards_artifact() {
        let (mut session, id) = session_with("a,b\n1,2\n1,2\n");
        session.set_cleaning(id, true).unwrap();
        session.convert(id, TargetFormat::Excel).unwrap();
        session.select_columns(id, &["b"]).unwrap();
        let entry = session.get(id).unwrap();
        assert_eq!(entry.stage(), Stage::Cleaned);
        assert!(entry.artifact().is_none());
        assert_eq!(entry.options().chart_columns, ["b"]);
    }

    #[test]
    fn chart_moves_to_visualized_and_warns_on_text() {
        let (mut session, id) = session_with("a,b\n1,x\n");
        let data = session.chart(id, &["a"]).unwrap();
        assert_eq!(data.series.len(), 1);
        assert_eq!(session.get(id).unwrap().stage(), Stage::Visualized);

        let (mut session, id) = session_with("name\nann\n");
        let err = session.chart(id, &["name"]).unwrap_err();
        assert_eq!(
            Notice::from_error(&err),
            Notice::warning("No numeric columns available for visualization.")
        );
        assert_eq!(session.get(id).unwrap().stage(), Stage::Parsed);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut session = Session::new();
        let id = UploadId::new();
        assert!(matches!(session.get(id), Err(SweeperError::UnknownUpload(_))));
        assert!(matches!(session.fill_missing(id), Err(SweeperError::UnknownUpload(_))));
        assert!(session.remove(id).is_err());
    }

    #[test]
    fn summary_reports_size_and_preview() {
        let body = "n\n1\n2\n3\n4\n5\n6\n7\n";
        let (session, id) = session_with(body);
        let summary = session.get(id).unwrap().summary(DEFAULT_PREVIEW_ROWS);
        assert_eq!(summary.size, format!("{:.2} KB", body.len() as f64 / 1024.0));
        let preview = summary.preview.unwrap();
        assert_eq!(preview.rows.len(), 5);
        assert_eq!(preview.total_rows, 7);
        assert_eq!(format_size_kb(1536), "1.50 KB");
    }

    #[test]
    fn upload_ids_round_trip_through_strings() {
        let id = UploadId::new();
        assert_eq!(id.to_string().parse::<UploadId>().unwrap(), id);
        assert!("not-a-uuid".parse::<UploadId>().is_err());
    }
}
