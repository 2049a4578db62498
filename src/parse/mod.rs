mod checker;
mod context;
mod lexer;
mod text;
mod token;
mod transaction;

pub use checker::{check_round_trip, RoundTripChecker};
pub use context::contextualize;
pub use lexer::{EndOfInput, Lexeme, Lexer};
pub use text::{State, TextLexer};
pub use token::{TextKind, Token, TokenKind};
pub use transaction::{parse_date, parse_transaction, FieldKind, TransactionLexer};

use crate::diffing::DiffViewer;
use crate::trace::Tracer;
use crate::{Error, ErrorType, Location, Source, SrcFile, Transaction};
use std::sync::Arc;

/// Below this many transactions, fields are lexed on the calling thread.
const PARALLEL_THRESHOLD: usize = 256;

/// The number of threads used to lex transaction fields, from
/// `LEDGERHELPERS_PARSER_THREADS` or the number of CPUs.
pub fn parser_threads() -> usize {
    std::env::var("LEDGERHELPERS_PARSER_THREADS")
        .ok()
        .and_then(|num| num.parse::<usize>().ok())
        .filter(|num| *num > 0)
        .unwrap_or_else(num_cpus::get)
}

fn location_after(mut location: Location, text: &str) -> Location {
    for c in text.chars() {
        if c == '\n' {
            location.line += 1;
            location.col = 1;
        } else {
            location.col += 1;
        }
    }
    location
}

/// The lexing pipeline for a whole ledger text: top-level lexing, field
/// extraction for every transaction, the contextual pass, and round-trip
/// verification after each pass.
#[derive(Clone)]
pub struct LedgerLexer {
    file: SrcFile,
    threads: usize,
    checker: RoundTripChecker,
    tracer: Tracer,
}

impl LedgerLexer {
    /// `file` names the text in error messages.
    pub fn new(file: impl Into<String>) -> Self {
        let file = Arc::new(file.into());
        LedgerLexer {
            checker: RoundTripChecker::new(file.clone()),
            file,
            threads: parser_threads(),
            tracer: Tracer::new("parse"),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_diff_viewer(mut self, viewer: Arc<dyn DiffViewer>) -> Self {
        self.checker = self.checker.with_diff_viewer(viewer);
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn file(&self) -> &SrcFile {
        &self.file
    }

    /// Lexes `text` into whitespace, comment, transaction and directive
    /// tokens. A failure anywhere yields no tokens at all.
    pub fn lex(&self, text: &str) -> Result<Vec<Token>, Error> {
        self.tracer.time("lexing", || {
            let lexemes = TextLexer::new(text, self.file.clone()).run()?;
            let tokens = self.tokens_from(lexemes)?;
            self.checker.check("top-level lexing", text, &tokens)?;
            Ok(tokens)
        })
    }

    /// Like [`lex`](Self::lex), followed by the contextual pass.
    pub fn lex_with_context(&self, text: &str) -> Result<Vec<Token>, Error> {
        let tokens = contextualize(self.lex(text)?);
        self.checker.check("contextual lexing", text, &tokens)?;
        Ok(tokens)
    }

    fn parse_one(&self, text: &str, origin: Location) -> Result<Transaction, Error> {
        TransactionLexer::new(text, origin, self.file.clone()).run()
    }

    fn parse_transactions(&self, spans: &[(&str, Location)]) -> Result<Vec<Transaction>, Error> {
        if spans.len() < PARALLEL_THRESHOLD || self.threads < 2 {
            return spans
                .iter()
                .map(|(text, origin)| self.parse_one(text, *origin))
                .collect();
        }
        let chunk_size = (spans.len() + self.threads - 1) / self.threads;
        let results = std::thread::scope(|scope| {
            let handlers = spans
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|(text, origin)| self.parse_one(text, *origin))
                            .collect::<Result<Vec<_>, _>>()
                    })
                })
                .collect::<Vec<_>>();
            handlers
                .into_iter()
                .map(|handler| {
                    handler.join().unwrap_or_else(|_| {
                        Err(Error::new(
                            ErrorType::TransactionLexing,
                            "transaction lexing thread panicked",
                            Source::whole(self.file.clone()),
                        ))
                    })
                })
                .collect::<Vec<_>>()
        });
        let mut transactions = Vec::with_capacity(spans.len());
        for result in results {
            transactions.extend(result?);
        }
        Ok(transactions)
    }

    fn tokens_from(&self, lexemes: Vec<Lexeme<TextKind>>) -> Result<Vec<Token>, Error> {
        let mut origin = Location::default();
        let mut spans = vec![];
        for lexeme in lexemes.iter() {
            if lexeme.kind == TextKind::Transaction {
                spans.push((lexeme.contents.as_str(), origin));
            }
            origin = location_after(origin, &lexeme.contents);
        }
        let mut transactions = self.parse_transactions(&spans)?.into_iter();
        let mut tokens = Vec::with_capacity(lexemes.len());
        for Lexeme {
            kind,
            pos,
            contents,
        } in lexemes
        {
            let kind = match kind {
                TextKind::Whitespace => TokenKind::Whitespace,
                TextKind::Comment => TokenKind::Comment,
                TextKind::Price => TokenKind::Price,
                TextKind::Conversion => TokenKind::Conversion,
                TextKind::EmbeddedPython => TokenKind::EmbeddedPython,
                TextKind::EmbeddedTag => TokenKind::EmbeddedTag,
                TextKind::Transaction => match transactions.next() {
                    Some(txn) => TokenKind::Transaction(Box::new(txn)),
                    None => {
                        return Err(Error::new(
                            ErrorType::Lexing,
                            "transaction fields went missing",
                            Source::whole(self.file.clone()),
                        ))
                    }
                },
            };
            tokens.push(Token::new(kind, pos, contents));
        }
        Ok(tokens)
    }
}

/// Lexes a ledger text with both passes and default settings.
pub fn lex_ledger_file_contents(text: &str) -> Result<Vec<Token>, Error> {
    LedgerLexer::new("<string>").lex_with_context(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClearingState, Date};

    const MIXED: &str = "; opening balances\n2015-01-01 * Opening\n    Assets:Cash  100 CHF\n    Equity:Opening\n\nP 2015-01-02 EUR 1.05 CHF\n\n2015-03-12=2015-03-15 * beer\n    Accounts:Cash          -6.00 CHF\n    Expenses:Drinking       6.00 CHF\n; trailing note\n";

    #[test]
    fn lex_mixed_file() {
        let tokens = LedgerLexer::new("mixed").lex(MIXED).unwrap();
        let names: Vec<_> = tokens.iter().map(|t| t.kind().name()).collect();
        assert_eq!(
            names,
            vec![
                "Comment",
                "Transaction",
                "Whitespace",
                "Price",
                "Whitespace",
                "Transaction",
                "Comment"
            ]
        );
        let beer = tokens[5].transaction().unwrap();
        assert_eq!(beer.state(), ClearingState::Cleared);
        assert_eq!(beer.clearing_date(), Date::from_ymd_opt(2015, 3, 15));
    }

    #[test]
    fn contextual_pass_fuses_leading_comment() {
        let tokens = LedgerLexer::new("mixed").lex_with_context(MIXED).unwrap();
        let names: Vec<_> = tokens.iter().map(|t| t.kind().name()).collect();
        assert_eq!(
            names,
            vec![
                "TransactionWithContext",
                "Whitespace",
                "Price",
                "Whitespace",
                "Transaction",
                "Comment"
            ]
        );
        assert_eq!(tokens[0].payee(), Some("Opening"));
    }

    #[test]
    fn field_errors_are_reported_at_file_lines() {
        let text = "\n\n2015-01-01 ok\n  A  1\n  B\n\n2015-02-30 bad\n  A  1\n  B\n";
        let err = LedgerLexer::new("bad").lex(text).unwrap_err();
        assert_eq!(err.r#type, ErrorType::TransactionLexing);
        assert_eq!(err.src.end.line, 7);
    }

    #[test]
    fn parallel_and_serial_agree() {
        let mut text = String::new();
        for day in 0..600 {
            let date = Date::from_ymd_opt(2015, 1, 1).unwrap() + chrono::Duration::days(day);
            text.push_str(&format!(
                "; entry {}\n{} * payee {}\n    Assets:Cash  -{} CHF\n    Expenses:Food\n\n",
                day, date, day, day
            ));
        }
        let serial = LedgerLexer::new("big").with_threads(1).lex_with_context(&text).unwrap();
        let parallel = LedgerLexer::new("big").with_threads(4).lex_with_context(&text).unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial.len(), 1200);
        assert_eq!(parallel[1198].payee(), Some("payee 599"));

        text.push_str("2015-13-01 broken\n  A  1\n  B\n");
        let err = LedgerLexer::new("big").with_threads(4).lex(&text).unwrap_err();
        assert_eq!(err.src.end.line, 3001);
    }
}
