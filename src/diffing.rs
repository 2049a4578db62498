//! Handing divergent ledger texts to an external diff tool for a human to
//! resolve.

use crate::{Error, ErrorType, Source};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub trait DiffViewer: Send + Sync {
    /// Shows `left` next to `right`.
    fn two_way_diff(&self, left: &str, right: &str) -> Result<(), Error>;

    /// Shows `left` (the previous contents), the file at `base`, and `right`
    /// (the proposed contents), so that the user can merge into `base`.
    fn three_way_diff(&self, base: &Path, left: &str, right: &str) -> Result<(), Error>;
}

/// Runs the `meld` program, or another program taking the same arguments.
#[derive(Debug, Clone)]
pub struct Meld {
    program: String,
}

impl Default for Meld {
    fn default() -> Self {
        Meld {
            program: "meld".to_string(),
        }
    }
}

fn diff_error(msg: String) -> Error {
    Error::new(ErrorType::Diff, msg, Source::whole(Arc::new("<diff>".to_string())))
}

fn temp_with(prefix: &str, contents: &str) -> Result<NamedTempFile, Error> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .tempfile()
        .map_err(|e| diff_error(format!("Couldn't create a temporary file: {}", e)))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| diff_error(format!("Couldn't write a temporary file: {}", e)))?;
    Ok(file)
}

impl Meld {
    pub fn new(program: impl Into<String>) -> Self {
        Meld {
            program: program.into(),
        }
    }

    fn launch(&self, paths: &[&Path]) -> Result<(), Error> {
        log::debug!("Running {} on {:?}", self.program, paths);
        let status = Command::new(&self.program)
            .args(paths)
            .status()
            .map_err(|e| diff_error(format!("Couldn't run {}: {}", self.program, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(diff_error(format!(
                "{} process failed with return code {}",
                self.program,
                status.code().map_or("unknown".to_string(), |c| c.to_string())
            )))
        }
    }
}

impl DiffViewer for Meld {
    fn two_way_diff(&self, left: &str, right: &str) -> Result<(), Error> {
        let left_file = temp_with("ledger.original.", left)?;
        let right_file = temp_with("ledger.lexed.", right)?;
        self.launch(&[left_file.path(), right_file.path()])
    }

    fn three_way_diff(&self, base: &Path, left: &str, right: &str) -> Result<(), Error> {
        let base_name = base
            .file_name()
            .map_or("ledger".to_string(), |n| n.to_string_lossy().into_owned());
        let previous = temp_with(&format!("{}.previous.", base_name), left)?;
        let new = temp_with(&format!("{}.new.", base_name), right)?;
        self.launch(&[previous.path(), base, new.path()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_program_is_reported() {
        let err = Meld::new("false").two_way_diff("a", "b").unwrap_err();
        assert_eq!(err.r#type, ErrorType::Diff);
        assert!(err.msg.contains("return code 1"), "{}", err.msg);
    }

    #[test]
    fn missing_program_is_reported() {
        let err = Meld::new("ledgerhelpers-no-such-diff-tool")
            .three_way_diff(Path::new("/tmp/x.ledger"), "a", "b")
            .unwrap_err();
        assert!(err.msg.starts_with("Couldn't run"), "{}", err.msg);
    }

    #[test]
    fn successful_program() {
        assert!(Meld::new("true").two_way_diff("a", "b").is_ok());
    }
}
