//! Extraction of dates, clearing state, payee and postings from the text of
//! a single transaction.
//!
//! The text is split into field lexemes that, like the top-level tokens,
//! reproduce the transaction text when concatenated:
//!
//! ```text
//! 2015-03-12=2015-03-15 * beer\n
//! ^Date     ^^SecondaryDate   ^Payee (rest of the line)
//!           Separator ^Whitespace, State, Whitespace
//!     Accounts:Cash          -6.00 CHF\n
//! ^Whitespace     ^Account   ^Amount (rest of the line)
//! ```

use super::checker::check_round_trip;
use super::lexer::{is_comment, is_enter, is_whitespace, EndOfInput, Lexeme, Lexer};
use crate::{
    ClearingState, Date, Error, ErrorType, Location, Posting, Source, SrcFile, Transaction,
};
use std::sync::Arc;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Date,
    /// The `=` between the primary and the secondary date.
    Separator,
    SecondaryDate,
    Whitespace,
    State,
    Payee,
    /// An indented comment line inside the transaction.
    Comment,
    Account,
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Date,
    SecondaryDate,
    Flag,
    Payee,
    Indentation,
    Comment,
    Account,
    Amount,
}

enum Failure {
    EndOfInput,
    Invalid(&'static str),
}

impl From<EndOfInput> for Failure {
    fn from(_: EndOfInput) -> Self {
        Failure::EndOfInput
    }
}

type Step = Result<Option<State>, Failure>;

/// Parses the date formats accepted in transaction headers.
pub fn parse_date(text: &str) -> Option<Date> {
    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse_from_str(text, format).ok())
}

/// Cuts a `;` note off a payee. The note must follow a tab or two spaces.
fn without_note(payee: &str) -> &str {
    ["  ;", "\t;"]
        .iter()
        .filter_map(|marker| payee.find(marker))
        .min()
        .map_or(payee, |end| &payee[..end])
}

/// Lexes the text of one transaction into its fields.
pub struct TransactionLexer<'a> {
    text: &'a str,
    lexer: Lexer<FieldKind>,
    file: SrcFile,
    /// Whitespace trimmed off the end of an account, handed to the amount.
    carry: Vec<char>,
}

impl<'a> TransactionLexer<'a> {
    /// `origin` is where `text` starts in its file, used for error locations.
    pub fn new(text: &'a str, origin: Location, file: SrcFile) -> Self {
        TransactionLexer {
            text,
            lexer: Lexer::with_origin(text, origin),
            file,
            carry: vec![],
        }
    }

    pub fn run(mut self) -> Result<Transaction, Error> {
        let mut state = Some(State::Date);
        while let Some(current) = state {
            state = self
                .step(current)
                .map_err(|failure| self.failure(current, failure))?;
        }
        check_round_trip(
            self.text,
            self.lexer.lexemes().iter().map(|l| l.contents.as_str()),
        )
        .map_err(|_| {
            self.error(
                self.lexer.pos(),
                "lexed transaction fields do not reproduce the transaction".to_string(),
            )
        })?;
        self.fields()
    }

    fn step(&mut self, state: State) -> Step {
        match state {
            State::Date => self.date(),
            State::SecondaryDate => self.secondary_date(),
            State::Flag => self.flag(),
            State::Payee => self.payee(),
            State::Indentation => self.indentation(),
            State::Comment => self.comment(),
            State::Account => self.account(),
            State::Amount => self.amount(),
        }
    }

    fn error(&self, pos: usize, msg: String) -> Error {
        let (start, _) = self.lexer.pending_range();
        let end = self.lexer.location_at(pos);
        Error::new(
            ErrorType::TransactionLexing,
            msg,
            Source::new(self.file.clone(), start.min(end), end),
        )
    }

    fn failure(&self, state: State, failure: Failure) -> Error {
        let msg = match failure {
            Failure::EndOfInput => format!("truncated transaction while lexing {:?}", state),
            Failure::Invalid(reason) => reason.to_string(),
        };
        self.error(self.lexer.pos(), msg)
    }

    /// Collects characters up to and including the end of the current line.
    fn rest_of_line(&mut self, chars: &mut Vec<char>) -> Result<(), EndOfInput> {
        while self.lexer.has_more() && chars.last() != Some(&'\n') {
            chars.push(self.lexer.advance()?);
        }
        Ok(())
    }

    fn run_of(&mut self, accept: impl Fn(char) -> bool) -> Result<Vec<char>, EndOfInput> {
        let mut chars = vec![];
        while self.lexer.has_more() && accept(self.lexer.peek()?) {
            chars.push(self.lexer.advance()?);
        }
        Ok(chars)
    }

    fn date_run(&mut self) -> Result<Vec<char>, EndOfInput> {
        self.run_of(|c| c.is_ascii_digit() || c == '-' || c == '/')
    }

    fn date(&mut self) -> Step {
        let chars = self.date_run()?;
        if chars.is_empty() {
            return Err(Failure::Invalid("transaction does not start with a date"));
        }
        self.lexer.emit(FieldKind::Date, chars);
        if self.lexer.has_more() && self.lexer.peek()? == '=' {
            let separator = vec![self.lexer.advance()?];
            self.lexer.emit(FieldKind::Separator, separator);
            Ok(Some(State::SecondaryDate))
        } else {
            Ok(Some(State::Flag))
        }
    }

    fn secondary_date(&mut self) -> Step {
        let chars = self.date_run()?;
        if chars.is_empty() {
            return Err(Failure::Invalid("no date after ="));
        }
        self.lexer.emit(FieldKind::SecondaryDate, chars);
        Ok(Some(State::Flag))
    }

    fn flag(&mut self) -> Step {
        let spaces = self.run_of(is_whitespace)?;
        self.lexer.emit(FieldKind::Whitespace, spaces);
        if self.lexer.has_more() && ClearingState::from_flag(self.lexer.peek()?).is_some() {
            let flag = vec![self.lexer.advance()?];
            self.lexer.emit(FieldKind::State, flag);
        }
        Ok(Some(State::Payee))
    }

    fn payee(&mut self) -> Step {
        let mut chars = vec![];
        self.rest_of_line(&mut chars)?;
        self.lexer.emit(FieldKind::Payee, chars);
        Ok(Some(State::Indentation))
    }

    fn indentation(&mut self) -> Step {
        let mut chars = self.run_of(is_whitespace)?;
        if !self.lexer.has_more() {
            self.lexer.emit(FieldKind::Whitespace, chars);
            return Ok(None);
        }
        let c = self.lexer.peek()?;
        if is_enter(c) {
            self.rest_of_line(&mut chars)?;
            self.lexer.emit(FieldKind::Whitespace, chars);
            return Ok(Some(State::Indentation));
        }
        if chars.is_empty() {
            return Err(Failure::Invalid("unindented line inside transaction"));
        }
        self.lexer.emit(FieldKind::Whitespace, chars);
        if is_comment(c) {
            Ok(Some(State::Comment))
        } else {
            Ok(Some(State::Account))
        }
    }

    fn comment(&mut self) -> Step {
        let mut chars = vec![];
        self.rest_of_line(&mut chars)?;
        self.lexer.emit(FieldKind::Comment, chars);
        Ok(Some(State::Indentation))
    }

    /// An account ends at two whitespace characters in a row, a tab, or the
    /// end of the line. Single spaces belong to the account name.
    fn at_account_boundary(&self) -> Result<bool, EndOfInput> {
        let c = self.lexer.peek()?;
        Ok(c == '\t'
            || is_enter(c)
            || (c == ' ' && (self.lexer.confirm_next("  ") || self.lexer.confirm_next(" \t"))))
    }

    fn account(&mut self) -> Step {
        let mut chars = vec![];
        while self.lexer.has_more() && !self.at_account_boundary()? {
            chars.push(self.lexer.advance()?);
        }
        while chars.last().map_or(false, |c| is_whitespace(*c)) {
            if let Some(c) = chars.pop() {
                self.carry.insert(0, c);
            }
        }
        self.lexer.emit(FieldKind::Account, chars);
        Ok(Some(State::Amount))
    }

    fn amount(&mut self) -> Step {
        let mut chars = std::mem::take(&mut self.carry);
        if chars.is_empty() && !self.lexer.has_more() {
            // No room left for an amount, not even an empty one.
            return Ok(None);
        }
        self.rest_of_line(&mut chars)?;
        self.lexer.emit(FieldKind::Amount, chars);
        Ok(Some(State::Indentation))
    }

    fn parse_date_field(&self, lexeme: &Lexeme<FieldKind>) -> Result<Date, Error> {
        parse_date(&lexeme.contents).ok_or_else(|| {
            self.error(
                lexeme.pos,
                format!(
                    "cannot parse date from {:?}, expected YYYY-MM-DD or YYYY/MM/DD",
                    lexeme.contents
                ),
            )
        })
    }

    fn fields(&self) -> Result<Transaction, Error> {
        let mut date = None;
        let mut secondary_date = None;
        let mut state = ClearingState::Uncleared;
        let mut payee = None;
        let mut postings = vec![];
        let mut account: Option<&Lexeme<FieldKind>> = None;
        for lexeme in self.lexer.lexemes() {
            match lexeme.kind {
                FieldKind::Date => date = Some(self.parse_date_field(lexeme)?),
                FieldKind::SecondaryDate => {
                    secondary_date = Some(self.parse_date_field(lexeme)?)
                }
                FieldKind::State => {
                    state = lexeme
                        .contents
                        .chars()
                        .next()
                        .and_then(ClearingState::from_flag)
                        .unwrap_or(ClearingState::Uncleared)
                }
                FieldKind::Payee => {
                    let text = without_note(&lexeme.contents).trim();
                    if !text.is_empty() {
                        payee = Some(text.to_string());
                    }
                }
                FieldKind::Account => account = Some(lexeme),
                FieldKind::Amount => match account.take() {
                    Some(account) => postings.push(Posting {
                        account: account.contents.clone(),
                        amount: lexeme.contents.trim().to_string(),
                    }),
                    None => {
                        return Err(self.error(lexeme.pos, "amount without account".to_string()))
                    }
                },
                FieldKind::Separator | FieldKind::Whitespace | FieldKind::Comment => {}
            }
        }
        if let Some(account) = account {
            return Err(self.error(
                account.pos,
                format!("truncated transaction posting for {}", account.contents),
            ));
        }
        let header_end = self.text.lines().next().map_or(0, |line| line.chars().count());
        let date = date.ok_or_else(|| self.error(header_end, "no date".to_string()))?;
        let payee = payee.ok_or_else(|| self.error(header_end, "no payee".to_string()))?;
        if postings.is_empty() {
            return Err(self.error(self.lexer.pos(), "incomplete transaction".to_string()));
        }
        Ok(Transaction {
            date,
            secondary_date,
            state,
            payee,
            postings,
        })
    }
}

/// Parses a standalone transaction text.
pub fn parse_transaction(text: &str) -> Result<Transaction, Error> {
    TransactionLexer::new(
        text,
        Location::default(),
        Arc::new("<transaction>".to_string()),
    )
    .run()
}
