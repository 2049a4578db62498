use super::lexer::{is_comment, is_enter, is_whitespace, EndOfInput, Lexeme, Lexer};
use super::token::TextKind;
use crate::{Error, ErrorType, Source, SrcFile};

/// The states of the top-level ledger lexer. Each state consumes some text
/// and names the state to continue with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    TopLevel,
    Comment,
    Transaction,
    /// `P` and `C` directives, one line each.
    SingleLine(TextKind),
    /// `python` and `tag` blocks, running over indented and blank lines.
    MultiLine(TextKind),
}

enum Interrupt {
    EndOfInput,
    Unexpected(char),
}

impl From<EndOfInput> for Interrupt {
    fn from(_: EndOfInput) -> Self {
        Interrupt::EndOfInput
    }
}

type Step = Result<Option<State>, Interrupt>;

/// Splits a ledger text into whitespace, comments, transactions and
/// directives, without looking inside transactions.
pub struct TextLexer {
    lexer: Lexer<TextKind>,
    file: SrcFile,
}

impl TextLexer {
    pub fn new(text: &str, file: SrcFile) -> Self {
        TextLexer {
            lexer: Lexer::new(text),
            file,
        }
    }

    pub fn run(mut self) -> Result<Vec<Lexeme<TextKind>>, Error> {
        let mut state = Some(State::TopLevel);
        while let Some(current) = state {
            state = self
                .step(current)
                .map_err(|interrupt| self.failure(current, interrupt))?;
        }
        Ok(self.lexer.into_lexemes())
    }

    fn step(&mut self, state: State) -> Step {
        match state {
            State::TopLevel => self.toplevel(),
            State::Comment => self.comment(),
            State::Transaction => self.transaction(),
            State::SingleLine(kind) => self.single_line(kind),
            State::MultiLine(kind) => self.multi_line(kind),
        }
    }

    fn failure(&self, state: State, interrupt: Interrupt) -> Error {
        let (start, end) = self.lexer.pending_range();
        let reason = match interrupt {
            Interrupt::EndOfInput => format!("unexpected end of input in state {:?}", state),
            Interrupt::Unexpected(c) => format!(
                "do not know how to parse {:?} at line {}, column {}",
                c, end.line, end.col
            ),
        };
        Error::new(
            ErrorType::Lexing,
            format!(
                "error parsing ledger data between {} and {}: {}",
                start, end, reason
            ),
            Source::new(self.file.clone(), start, end),
        )
    }

    fn toplevel(&mut self) -> Step {
        let mut chars = vec![];
        while self.lexer.has_more() {
            let c = self.lexer.peek()?;
            let next = if is_comment(c) {
                Some(State::Comment)
            } else if c.is_ascii_digit() {
                Some(State::Transaction)
            } else if self.lexer.confirm_next("python") {
                Some(State::MultiLine(TextKind::EmbeddedPython))
            } else if self.lexer.confirm_next("tag") {
                Some(State::MultiLine(TextKind::EmbeddedTag))
            } else if c == 'P' {
                Some(State::SingleLine(TextKind::Price))
            } else if c == 'C' {
                Some(State::SingleLine(TextKind::Conversion))
            } else {
                None
            };
            if next.is_some() {
                self.lexer.emit(TextKind::Whitespace, chars);
                return Ok(next);
            }
            if !is_whitespace(c) && !is_enter(c) {
                return Err(Interrupt::Unexpected(c));
            }
            chars.push(self.lexer.advance()?);
        }
        self.lexer.emit(TextKind::Whitespace, chars);
        Ok(None)
    }

    fn comment(&mut self) -> Step {
        let mut chars = vec![self.lexer.advance()?];
        while self.lexer.has_more() {
            if chars.last() == Some(&'\n') && !is_comment(self.lexer.peek()?) {
                break;
            }
            chars.push(self.lexer.advance()?);
        }
        self.lexer.emit(TextKind::Comment, chars);
        Ok(Some(State::TopLevel))
    }

    fn transaction(&mut self) -> Step {
        let mut chars = vec![self.lexer.advance()?];
        while self.lexer.has_more() {
            if chars.last() == Some(&'\n') && !is_whitespace(self.lexer.peek()?) {
                break;
            }
            chars.push(self.lexer.advance()?);
        }
        self.lexer.emit(TextKind::Transaction, chars);
        Ok(Some(State::TopLevel))
    }

    fn single_line(&mut self, kind: TextKind) -> Step {
        let mut chars = vec![self.lexer.advance()?];
        while self.lexer.has_more() && chars.last() != Some(&'\n') {
            chars.push(self.lexer.advance()?);
        }
        self.lexer.emit(kind, chars);
        Ok(Some(State::TopLevel))
    }

    fn multi_line(&mut self, kind: TextKind) -> Step {
        let mut chars = vec![self.lexer.advance()?];
        while self.lexer.has_more() {
            if chars.last() == Some(&'\n') {
                let c = self.lexer.peek()?;
                if is_whitespace(c) || is_enter(c) {
                    chars.push(self.lexer.advance()?);
                    continue;
                }
                self.lexer.emit(kind, chars);
                return Ok(Some(if is_comment(c) {
                    State::Comment
                } else if c.is_ascii_digit() {
                    State::Transaction
                } else {
                    State::TopLevel
                }));
            }
            chars.push(self.lexer.advance()?);
        }
        self.lexer.emit(kind, chars);
        Ok(Some(State::TopLevel))
    }
}
