use crate::Location;

pub(crate) const CHAR_ENTER: [char; 2] = ['\n', '\r'];
pub(crate) const CHAR_COMMENT: [char; 2] = [';', '#'];
pub(crate) const CHAR_WHITESPACE: [char; 2] = [' ', '\t'];

#[inline]
pub(crate) fn is_comment(c: char) -> bool {
    CHAR_COMMENT.contains(&c)
}

#[inline]
pub(crate) fn is_whitespace(c: char) -> bool {
    CHAR_WHITESPACE.contains(&c)
}

#[inline]
pub(crate) fn is_enter(c: char) -> bool {
    CHAR_ENTER.contains(&c)
}

/// Raised by the cursor when it runs past the end of its input. It never
/// leaves the `parse` module: every state function that can hit it converts
/// it into a located [`Error`](crate::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfInput;

/// A run of characters collected by a lexer state, tagged with its kind.
/// `pos` is the cursor offset after the run was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme<K> {
    pub kind: K,
    pub pos: usize,
    pub contents: String,
}

/// Cursor over the characters of a text, accumulating [`Lexeme`]s.
pub struct Lexer<K> {
    items: Vec<char>,
    pos: usize,
    last_emitted_pos: usize,
    origin: Location,
    lexemes: Vec<Lexeme<K>>,
}

impl<K> Lexer<K> {
    pub fn new(text: &str) -> Self {
        Self::with_origin(text, Location::default())
    }

    /// A lexer over a fragment that starts at `origin` of an enclosing text,
    /// so that reported locations refer to the enclosing text.
    pub fn with_origin(text: &str, origin: Location) -> Self {
        Lexer {
            items: text.chars().collect(),
            pos: 0,
            last_emitted_pos: 0,
            origin,
            lexemes: Vec::new(),
        }
    }

    /// Returns the item at the current position.
    pub fn peek(&self) -> Result<char, EndOfInput> {
        self.items.get(self.pos).copied().ok_or(EndOfInput)
    }

    /// Returns the item at the current position, and advances the position.
    pub fn advance(&mut self) -> Result<char, EndOfInput> {
        let c = self.peek()?;
        self.pos += 1;
        Ok(c)
    }

    /// Returns true if the items from the current position onward start with
    /// `seq`. Running past the end is a mismatch, not an error.
    pub fn confirm_next(&self, seq: &str) -> bool {
        let mut n = self.pos;
        for c in seq.chars() {
            match self.items.get(n) {
                Some(item) if *item == c => n += 1,
                _ => return false,
            }
        }
        true
    }

    /// Accumulates a lexeme of `kind` made of `items` at the current
    /// position. Nothing is accumulated for an empty run.
    pub fn emit(&mut self, kind: K, items: Vec<char>) {
        self.last_emitted_pos = self.pos;
        if items.is_empty() {
            return;
        }
        self.lexemes.push(Lexeme {
            kind,
            pos: self.pos,
            contents: items.into_iter().collect(),
        });
    }

    #[inline]
    pub fn has_more(&self) -> bool {
        self.pos < self.items.len()
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn lexemes(&self) -> &[Lexeme<K>] {
        &self.lexemes
    }

    pub fn into_lexemes(self) -> Vec<Lexeme<K>> {
        self.lexemes
    }

    /// The line and column of the character at offset `pos`.
    pub fn location_at(&self, pos: usize) -> Location {
        let pos = pos.min(self.items.len());
        let consumed = &self.items[..pos];
        let line = consumed.iter().filter(|c| **c == '\n').count() + 1;
        let col = match consumed.iter().rposition(|c| *c == '\n') {
            Some(newline) => pos - newline,
            None => pos + 1,
        };
        self.origin.offset((line, col).into())
    }

    /// The range from the end of the last emitted lexeme to the cursor.
    pub fn pending_range(&self) -> (Location, Location) {
        (
            self.location_at(self.last_emitted_pos),
            self.location_at(self.pos),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_and_advance() {
        let mut lexer: Lexer<()> = Lexer::new("ab");
        assert_eq!(lexer.peek(), Ok('a'));
        assert_eq!(lexer.advance(), Ok('a'));
        assert_eq!(lexer.advance(), Ok('b'));
        assert!(!lexer.has_more());
        assert_eq!(lexer.peek(), Err(EndOfInput));
        assert_eq!(lexer.advance(), Err(EndOfInput));
        assert_eq!(lexer.pos(), 2);
    }

    #[test]
    fn confirm_next_does_not_consume() {
        let mut lexer: Lexer<()> = Lexer::new("python\n");
        assert!(lexer.confirm_next("py"));
        assert!(lexer.confirm_next("python\n"));
        assert!(!lexer.confirm_next("python\n\n"));
        assert!(!lexer.confirm_next("tag"));
        assert_eq!(lexer.pos(), 0);
        lexer.advance().unwrap();
        assert!(lexer.confirm_next("ython"));
    }

    #[test]
    fn emit_skips_empty_runs() {
        let mut lexer = Lexer::new("xy");
        lexer.emit(1, vec![]);
        lexer.advance().unwrap();
        lexer.emit(2, vec!['x']);
        assert_eq!(
            lexer.lexemes(),
            &[Lexeme {
                kind: 2,
                pos: 1,
                contents: "x".to_string()
            }]
        );
    }

    #[test]
    fn locations_count_lines() {
        let lexer: Lexer<()> = Lexer::new("ab\ncd\n\ne");
        assert_eq!(lexer.location_at(0), Location { line: 1, col: 1 });
        assert_eq!(lexer.location_at(2), Location { line: 1, col: 3 });
        assert_eq!(lexer.location_at(3), Location { line: 2, col: 1 });
        assert_eq!(lexer.location_at(4), Location { line: 2, col: 2 });
        assert_eq!(lexer.location_at(7), Location { line: 4, col: 1 });

        let nested: Lexer<()> = Lexer::with_origin("ab\ncd", (10, 5).into());
        assert_eq!(nested.location_at(1), Location { line: 10, col: 6 });
        assert_eq!(nested.location_at(4), Location { line: 11, col: 2 });
    }
}
