//! Locating the ledger file and the price database the way ledger does:
//! environment variables first, then `~/.ledgerrc`.

use crate::{Error, ErrorType, Source};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The journal and optional price database of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerFiles {
    pub journal: PathBuf,
    pub price_db: Option<PathBuf>,
}

impl LedgerFiles {
    pub fn discover() -> Result<Self, Error> {
        Ok(LedgerFiles {
            journal: find_ledger_file()?,
            price_db: find_ledger_price_file()?,
        })
    }
}

struct Setting {
    variable: &'static str,
    option: &'static str,
}

const FILE: Setting = Setting {
    variable: "LEDGER_FILE",
    option: "--file",
};

const PRICE_DB: Setting = Setting {
    variable: "LEDGER_PRICE_DB",
    option: "--price-db",
};

fn ledgerrc_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ledgerrc"))
}

/// Expands a leading `~` and makes the path absolute.
fn expand(path: &str, home: Option<&Path>) -> PathBuf {
    let expanded = match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        env::current_dir()
            .map(|dir| dir.join(&expanded))
            .unwrap_or(expanded)
    }
}

/// The value of the first `option VALUE` line in a ledgerrc text.
fn option_value<'a>(ledgerrc: &'a str, option: &str) -> Option<&'a str> {
    ledgerrc.lines().find_map(|line| {
        let rest = line.strip_prefix(option)?;
        if !rest.starts_with(char::is_whitespace) {
            return None;
        }
        Some(rest.trim()).filter(|value| !value.is_empty())
    })
}

fn config_error(msg: String) -> Error {
    Error::new(
        ErrorType::Config,
        msg,
        Source::whole(Arc::new("~/.ledgerrc".to_string())),
    )
}

fn lookup(
    setting: &Setting,
    variable: Option<String>,
    ledgerrc: Option<String>,
    home: Option<&Path>,
) -> Result<PathBuf, Error> {
    if let Some(value) = variable {
        return Ok(expand(&value, home));
    }
    let ledgerrc = ledgerrc.ok_or_else(|| {
        config_error(format!(
            "{} environment variable not set, and no .ledgerrc file found.",
            setting.variable
        ))
    })?;
    option_value(&ledgerrc, setting.option)
        .map(|value| expand(value, home))
        .ok_or_else(|| {
            config_error(format!(
                "{} environment variable not set, and your .ledgerrc file does not contain a {} parameter.",
                setting.variable, setting.option
            ))
        })
}

fn lookup_in_environment(setting: &Setting) -> Result<PathBuf, Error> {
    let ledgerrc = match ledgerrc_path() {
        Some(path) if path.exists() => Some(
            fs::read_to_string(&path).map_err(|e| Error::io(&path.display().to_string(), &e))?,
        ),
        _ => None,
    };
    lookup(
        setting,
        env::var(setting.variable).ok(),
        ledgerrc,
        dirs::home_dir().as_deref(),
    )
}

/// The journal named by `LEDGER_FILE` or by `--file` in `~/.ledgerrc`.
pub fn find_ledger_file() -> Result<PathBuf, Error> {
    lookup_in_environment(&FILE)
}

/// The price database named by `LEDGER_PRICE_DB` or by `--price-db` in
/// `~/.ledgerrc`. Not having one is fine.
pub fn find_ledger_price_file() -> Result<Option<PathBuf>, Error> {
    match lookup_in_environment(&PRICE_DB) {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.r#type == ErrorType::Config => {
            log::debug!(target: "journal.master", "No price database: {}", e.msg);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_wins_over_ledgerrc() {
        let home = Path::new("/home/user");
        let found = lookup(
            &FILE,
            Some("~/books/main.ledger".to_string()),
            Some("--file /elsewhere.ledger\n".to_string()),
            Some(home),
        )
        .unwrap();
        assert_eq!(found, PathBuf::from("/home/user/books/main.ledger"));
    }

    #[test]
    fn ledgerrc_options() {
        let rc = "--sort date\n--file   /data/main.ledger  \n--price-db ~/prices.db\n";
        let home = Some(Path::new("/home/user"));
        assert_eq!(
            lookup(&FILE, None, Some(rc.to_string()), home).unwrap(),
            PathBuf::from("/data/main.ledger")
        );
        assert_eq!(
            lookup(&PRICE_DB, None, Some(rc.to_string()), home).unwrap(),
            PathBuf::from("/home/user/prices.db")
        );
        assert_eq!(option_value("--filed x\n", "--file"), None);
    }

    #[test]
    fn nothing_configured() {
        let err = lookup(&FILE, None, None, None).unwrap_err();
        assert_eq!(err.r#type, ErrorType::Config);
        assert!(err.msg.contains("no .ledgerrc file found"));
        let err = lookup(&PRICE_DB, None, Some("--file x\n".to_string()), None).unwrap_err();
        assert!(err.msg.contains("--price-db"));
    }

    #[test]
    fn ledgerrc_is_looked_up_in_the_home_directory() {
        let home = dirs::home_dir();
        assert_eq!(ledgerrc_path(), home.as_ref().map(|h| h.join(".ledgerrc")));
        if let Some(home) = home {
            assert_eq!(expand("~/main.ledger", Some(&home)), home.join("main.ledger"));
        }
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        assert!(expand("books.ledger", None).is_absolute());
    }
}
