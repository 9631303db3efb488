/*!
# Data Sweeper

A browser-based utility for tidying tabular files, built in Rust.

## Overview

Users upload CSV or Excel (`.xlsx`) files, preview them, apply a few
cleaning operations, chart numeric columns, and download the result
converted to the other format. Everything lives in memory for the length
of the session; nothing is persisted.

## Architecture

Each upload runs through the same pipeline:

```text
  bytes ──▶ format ──▶ loader ──▶ Table ──▶ cleaner ──▶ graph ──▶ downloader ──▶ artifact
          (detect)    (parse)            (optional)  (optional)   (encode)
```

### Backend Layer
- **Technologies**: Rust, axum
- **Core Components**:
  - Format Detector - classifies uploads by extension
  - Parser - reads CSV and the first worksheet of XLSX files into typed columns
  - Cleaner - duplicate removal, mean-fill of numeric gaps, column selection
  - Visualizer - numeric column discovery and bar charts
  - Exporter - CSV and XLSX encoding with download metadata
  - Session - explicit per-upload state machine keyed by upload id

### Frontend Layer
- **Technologies**: HTML, CSS, JavaScript (served by the `website` binary)

## Modules

- **format**: extensions, target formats, MIME types, output file names
- **table**: typed `Table`/`Column` model and type inference
- **loader**: CSV/XLSX parsing
- **cleaner**: cleaning transforms
- **graph**: chart data and PNG rendering
- **downloader**: export to CSV/XLSX
- **session**: per-upload pipeline state and status notices
- **config**: server settings
- **app**: routing (feature `web`)

## REST API Endpoints

- `/api/upload` - Upload one or more files
- `/api/files/{id}` - File summary and preview
- `/api/files/{id}/dedupe`, `/api/files/{id}/fill`, `/api/files/{id}/columns` - Cleaning
- `/api/files/{id}/chart` - Bar chart as PNG
- `/api/files/{id}/convert`, `/api/files/{id}/download` - Conversion and download
*/

pub mod cleaner;
pub mod config;
pub mod downloader;
pub mod error;
pub mod format;
pub mod graph;
pub mod loader;
pub mod session;
pub mod table;

#[cfg(feature = "web")]
pub mod app;

pub use error::{Result, SweeperError};
pub use session::{FileEntry, Notice, Session, Stage, UploadId, UploadedFile};
pub use table::{Column, Table, Value};
