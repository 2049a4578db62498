//! Useful functions for parsing amounts and writing files.

use crate::{Decimal, Error};
use std::io::Write;
use std::path::Path;

/// Parses a [`Decimal`](crate::Decimal) written with optional thousands
/// separators, like `1,234.50`.
pub fn parse_decimal(num_str: &str) -> Result<Decimal, String> {
    let cleaned: String = num_str.chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<Decimal>()
        .map_err(|e| format!("Invalid number {}: {}", num_str, e))
}

/// Replaces the contents of `path` with `text` through a temporary file in
/// the same directory, so readers never see a partial write.
pub fn replace_file(path: &Path, text: &str) -> Result<(), Error> {
    let io_error = |e: &std::io::Error| Error::io(&path.display().to_string(), e);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(&e))?;
    file.write_all(text.as_bytes()).map_err(|e| io_error(&e))?;
    file.flush().map_err(|e| io_error(&e))?;
    file.persist(path).map_err(|e| io_error(&e.error))?;
    Ok(())
}
