#![cfg(not(tarpaulin_include))]

use clap::Parser;
use data_sweeper::format::TargetFormat;
use data_sweeper::session::{DEFAULT_PREVIEW_ROWS, Level};
use data_sweeper::{Notice, Session, UploadId, UploadedFile};
use env_logger::Env;
use log::{debug, error};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sweep")]
#[command(about = "Clean CSV and Excel files and convert them between formats")]
struct Cli {
    /// Input files (.csv or .xlsx)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format: csv or excel
    #[arg(short, long, default_value = "csv")]
    to: TargetFormat,

    /// Remove duplicate rows
    #[arg(long)]
    dedupe: bool,

    /// Fill missing numeric values with the column mean
    #[arg(long)]
    fill_missing: bool,

    /// Keep only these columns, comma separated
    #[arg(long, value_delimiter = ',')]
    columns: Option<Vec<String>>,

    /// Directory for the converted files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Print the first rows of each file after cleaning
    #[arg(long)]
    preview: bool,
}

impl Cli {
    fn cleaning(&self) -> bool {
        self.dedupe || self.fill_missing || self.columns.is_some()
    }
}

fn report(name: &str, notice: &Notice) {
    match notice.level {
        Level::Error => eprintln!("{}: {}", name, notice),
        _ => println!("{}: {}", name, notice),
    }
}

/// Output paths of one run. Inputs and earlier outputs are never overwritten.
struct Outputs {
    dir: PathBuf,
    claimed: HashSet<PathBuf>,
}

impl Outputs {
    fn new(dir: &Path, inputs: &[PathBuf]) -> Self {
        Outputs {
            dir: fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()),
            claimed: inputs
                .iter()
                .filter_map(|path| fs::canonicalize(path).ok())
                .collect(),
        }
    }

    /// Reserve `file_name` in the output directory, or `None` when that path
    /// is an input or was already written in this run.
    fn claim(&mut self, file_name: &str) -> Option<PathBuf> {
        let path = self.dir.join(file_name);
        self.claimed.insert(path.clone()).then_some(path)
    }
}

/// Clean and convert one upload, returning false when it could not be written.
fn sweep(
    cli: &Cli,
    session: &mut Session,
    outputs: &mut Outputs,
    id: UploadId,
    name: &str,
) -> bool {
    let mut steps: Vec<Result<Notice, data_sweeper::SweeperError>> = Vec::new();
    if cli.cleaning() {
        if let Err(e) = session.set_cleaning(id, true) {
            report(name, &Notice::from_error(&e));
            return false;
        }
    }
    if cli.dedupe {
        steps.push(session.remove_duplicates(id));
    }
    if cli.fill_missing {
        steps.push(session.fill_missing(id));
    }
    if let Some(columns) = &cli.columns {
        steps.push(session.select_columns(id, columns.as_slice()));
    }

    let mut ok = true;
    for step in steps {
        let notice = step.unwrap_or_else(|e| Notice::from_error(&e));
        ok &= notice.level != Level::Error;
        report(name, &notice);
    }
    if !ok {
        return false;
    }

    if cli.preview {
        if let Ok(Some(table)) = session.get(id).map(|entry| entry.table()) {
            println!("{}", table.head(DEFAULT_PREVIEW_ROWS));
            println!("({} rows)", table.row_count());
        }
    }

    let artifact = match session.convert(id, cli.to) {
        Ok(artifact) => artifact.clone(),
        Err(e) => {
            report(name, &Notice::from_error(&e));
            return false;
        }
    };
    let Some(path) = outputs.claim(&artifact.file_name) else {
        error!("{}: output {} is already taken", name, artifact.file_name);
        eprintln!(
            "{}: refusing to overwrite {} in {}; it is an input or an earlier output",
            name,
            artifact.file_name,
            cli.out_dir.display()
        );
        return false;
    };
    match fs::write(&path, &artifact.bytes) {
        Ok(()) => {
            debug!("wrote {} bytes to {}", artifact.bytes.len(), path.display());
            if let Err(e) = session.download(id) {
                error!("{}: {}", name, e);
            }
            println!("{}: 📥 saved {}", name, path.display());
            true
        }
        Err(e) => {
            error!("failed to write {}: {}", path.display(), e);
            eprintln!("{}: failed to write {}: {}", name, path.display(), e);
            false
        }
    }
}

fn read_upload(path: &Path) -> std::io::Result<UploadedFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(name, fs::read(path)?))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(e) = fs::create_dir_all(&cli.out_dir) {
        eprintln!("Error: cannot create {}: {}", cli.out_dir.display(), e);
        return ExitCode::FAILURE;
    }

    let mut outputs = Outputs::new(&cli.out_dir, &cli.files);
    let mut session = Session::new();
    let mut failed = 0usize;

    for path in &cli.files {
        let file = match read_upload(path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                failed += 1;
                continue;
            }
        };
        let name = file.name.clone();
        let (id, notice) = session.upload(file);
        report(&name, &notice);
        if notice.level == Level::Error || !sweep(&cli, &mut session, &mut outputs, id, &name) {
            failed += 1;
        }
    }

    println!("🎉 All files processed!");
    if failed > 0 {
        eprintln!("{} of {} files failed", failed, cli.files.len());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
