//! Issue export loading
//!
//! Reads the issue CSV into [`Issue`] records, field-mapped by header name.
//! Unknown columns are ignored; a missing required column or a malformed row
//! fails the whole load.

use crate::error::{AppError, Result};
use crate::models::Issue;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Header names every issue file must carry
pub const REQUIRED_COLUMNS: [&str; 5] =
    ["Title", "Description", "Status", "FixerName", "FixerEmail"];

/// Load every issue from a delimited file with a header row
pub fn load_issues(path: impl AsRef<Path>, delimiter: u8) -> Result<Vec<Issue>> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::InputFileMissing(path.to_path_buf()),
        _ => AppError::Io(e),
    })?;

    let issues = read_issues(file, delimiter)?;
    info!(path = %path.display(), count = issues.len(), "Loaded issues");

    Ok(issues)
}

/// Read issues from any reader
pub fn read_issues<R: Read>(reader: R, delimiter: u8) -> Result<Vec<Issue>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    debug!(columns = ?headers, "Issue file header");

    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|h| h == **column))
    {
        return Err(AppError::Parse {
            line: 1,
            message: format!("missing required column `{}`", missing),
        });
    }

    reader
        .deserialize::<Issue>()
        .map(|row| row.map_err(AppError::from))
        .collect()
}

/// Write issues with the same header schema `read_issues` expects
pub fn write_issues<W: Write>(writer: W, issues: &[Issue], delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_writer(writer);

    for issue in issues {
        writer.serialize(issue)?;
    }
    writer.flush()?;

    Ok(())
}
