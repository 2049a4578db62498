use crate::{Date, Transaction};
use getset::{CopyGetters, Getters};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the top-level lexer recognized a run of text as, before transaction
/// fields are extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKind {
    Whitespace,
    Comment,
    Transaction,
    Price,
    Conversion,
    EmbeddedPython,
    EmbeddedTag,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Blank lines and other filler between records.
    Whitespace,
    /// One or more consecutive lines starting with `;` or `#`.
    Comment,
    /// A date line and its indented posting lines.
    Transaction(Box<Transaction>),
    /// A `P` directive line.
    Price,
    /// A `C` directive line.
    Conversion,
    /// A `python` block.
    EmbeddedPython,
    /// A `tag` block.
    EmbeddedTag,
    /// A transaction together with the comments written right above it.
    TransactionWithContext(Box<Transaction>),
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Whitespace => "Whitespace",
            TokenKind::Comment => "Comment",
            TokenKind::Transaction(_) => "Transaction",
            TokenKind::Price => "Price",
            TokenKind::Conversion => "Conversion",
            TokenKind::EmbeddedPython => "EmbeddedPython",
            TokenKind::EmbeddedTag => "EmbeddedTag",
            TokenKind::TransactionWithContext(_) => "TransactionWithContext",
        }
    }
}

/// A piece of a ledger text. Concatenating the contents of all tokens lexed
/// from a text, in order, gives back the text.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Getters, CopyGetters)]
pub struct Token {
    /// Returns the character offset right after this token.
    #[getset(get_copy = "pub")]
    pub(crate) pos: usize,

    /// Returns the raw text of this token.
    #[getset(get = "pub")]
    pub(crate) contents: String,

    /// Returns what this token is.
    #[getset(get = "pub")]
    pub(crate) kind: TokenKind,
}

impl Token {
    pub fn new(kind: TokenKind, pos: usize, contents: String) -> Self {
        Token {
            pos,
            contents,
            kind,
        }
    }

    /// The parsed fields, for both plain and context-carrying transactions.
    pub fn transaction(&self) -> Option<&Transaction> {
        match &self.kind {
            TokenKind::Transaction(txn) | TokenKind::TransactionWithContext(txn) => Some(txn),
            _ => None,
        }
    }

    pub(crate) fn transaction_mut(&mut self) -> Option<&mut Transaction> {
        match &mut self.kind {
            TokenKind::Transaction(txn) | TokenKind::TransactionWithContext(txn) => Some(txn),
            _ => None,
        }
    }

    pub fn date(&self) -> Option<Date> {
        self.transaction().map(|txn| txn.date())
    }

    pub fn payee(&self) -> Option<&str> {
        self.transaction().map(|txn| txn.payee().as_str())
    }

    pub fn is_comment(&self) -> bool {
        self.kind == TokenKind::Comment
    }

    pub fn is_transaction(&self) -> bool {
        self.transaction().is_some()
    }

    pub fn into_contents(self) -> String {
        self.contents
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} at pos {} len {}\n{}>",
            self.kind.name(),
            self.pos,
            self.contents.chars().count(),
            self.contents
        )
    }
}
