pub use chrono::NaiveDate as Date;
pub use rust_decimal::Decimal;
use getset::{CopyGetters, Getters};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::convert::From;
use std::fmt;
use std::sync::Arc;

/// Representing a location, line number and column number, in a source text.
/// Both are 1-based.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: usize,
    pub col: usize,
}

impl Default for Location {
    fn default() -> Self {
        Location { line: 1, col: 1 }
    }
}

impl Location {
    /// Translates a location relative to a text fragment into the enclosing
    /// text, where the fragment begins at `self`.
    pub fn offset(&self, relative: Location) -> Self {
        if relative.line == 1 {
            Location {
                line: self.line,
                col: self.col + relative.col - 1,
            }
        } else {
            Location {
                line: self.line + relative.line - 1,
                col: relative.col,
            }
        }
    }
}

impl From<(usize, usize)> for Location {
    fn from(tuple: (usize, usize)) -> Self {
        Location {
            line: tuple.0,
            col: tuple.1,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A string wrapped in [`Arc`](std::sync::Arc)
/// representing the source file path.
pub type SrcFile = Arc<String>;

/// Represents a range in a source text, used for locating errors.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub file: SrcFile,
    pub start: Location,
    pub end: Location,
}

impl Source {
    pub fn new(file: SrcFile, start: Location, end: Location) -> Self {
        Source { file, start, end }
    }

    /// A source with no meaningful range, for errors that do not originate
    /// in ledger text (I/O, worker failures).
    pub fn whole(file: SrcFile) -> Self {
        Source {
            file,
            start: Location::default(),
            end: Location::default(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.file, self.start.line, self.start.col, self.end.line, self.end.col
        )
    }
}

/// Kinds of errors that `ledgerhelpers` reports.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// The top-level or contextual lexing pass failed: unparsable text, or
    /// the lexed tokens do not reproduce the input.
    Lexing,
    /// A single transaction could not be split into its fields.
    TransactionLexing,
    /// IO error, e.g., the ledger file cannot be read or stat'ed.
    Io,
    /// The journal worker died or replied with something unexpected.
    Worker,
    /// The accounting engine refused the journal or a query.
    Engine,
    /// The ledger file location cannot be determined.
    Config,
    /// The external diff tool failed.
    Diff,
}

/// Contains the full information of an error.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Error {
    pub msg: String,
    pub src: Source,
    pub r#type: ErrorType,
}

impl Error {
    pub fn new(r#type: ErrorType, msg: impl Into<String>, src: Source) -> Self {
        Error {
            msg: msg.into(),
            src,
            r#type,
        }
    }

    pub fn io(path: &str, err: &std::io::Error) -> Self {
        Error {
            msg: format!("Couldn't access {}: {}", path, err),
            src: Source::whole(Arc::new(path.to_string())),
            r#type: ErrorType::Io,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {}\n  {}:{}:{}",
            self.r#type, self.msg, self.src.file, self.src.start.line, self.src.start.col
        )
    }
}

impl std::error::Error for Error {}

/// The clearing state of a [`Transaction`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClearingState {
    /// transactions without a flag.
    Uncleared,
    /// transactions flagged by `*`.
    Cleared,
    /// transactions flagged by `!`.
    Pending,
}

impl ClearingState {
    pub fn from_flag(flag: char) -> Option<Self> {
        match flag {
            '*' => Some(ClearingState::Cleared),
            '!' => Some(ClearingState::Pending),
            _ => None,
        }
    }
}

impl fmt::Display for ClearingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearingState::Uncleared => Ok(()),
            ClearingState::Cleared => write!(f, "*"),
            ClearingState::Pending => write!(f, "!"),
        }
    }
}

/// A posting line like `Assets:Cash  -6.00 CHF` inside a [`Transaction`].
/// The amount is kept as written; an empty amount is an elided one.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Posting {
    pub account: String,
    pub amount: String,
}

impl Posting {
    pub fn is_elided(&self) -> bool {
        self.amount.is_empty()
    }
}

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.amount.is_empty() {
            write!(f, "{}", self.account)
        } else {
            let width = f.width().unwrap_or(46);
            let account_width = std::cmp::max(
                self.account.chars().count() + 2,
                width.saturating_sub(self.amount.chars().count()),
            );
            write!(
                f,
                "{:width$}{}",
                self.account,
                self.amount,
                width = account_width
            )
        }
    }
}

/// The fields of a transaction record, extracted from its text.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Transaction {
    /// Returns the primary date.
    #[getset(get_copy = "pub")]
    pub(crate) date: Date,

    /// Returns the date written after `=`, if any.
    #[getset(get_copy = "pub")]
    pub(crate) secondary_date: Option<Date>,

    /// Returns the clearing state.
    #[getset(get_copy = "pub")]
    pub(crate) state: ClearingState,

    /// Returns the payee.
    #[getset(get = "pub")]
    pub(crate) payee: String,

    /// Returns the postings in the order they were written.
    #[getset(get = "pub")]
    pub(crate) postings: Vec<Posting>,
}

impl Transaction {
    /// The date the transaction cleared: the secondary date if present, else
    /// the primary date. Uncleared transactions have none.
    pub fn clearing_date(&self) -> Option<Date> {
        match self.state {
            ClearingState::Uncleared => None,
            _ => Some(self.secondary_date.unwrap_or(self.date)),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date)?;
        if let Some(date) = self.secondary_date {
            write!(f, "={}", date)?;
        }
        if self.state != ClearingState::Uncleared {
            write!(f, " {}", self.state)?;
        }
        write!(f, " {}", self.payee)?;
        let width = f.width().unwrap_or(50);
        for posting in self.postings.iter() {
            write!(f, "\n    {:width$}", posting, width = width.saturating_sub(4))?;
        }
        Ok(())
    }
}
