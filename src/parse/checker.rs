use super::token::Token;
use crate::diffing::DiffViewer;
use crate::{Error, ErrorType, Location, Source, SrcFile};
use std::sync::Arc;

/// Concatenates `pieces` and compares the result with `original`. On a
/// mismatch the concatenation is returned.
pub fn check_round_trip<'a>(
    original: &str,
    pieces: impl IntoIterator<Item = &'a str>,
) -> Result<(), String> {
    let mut reconstructed = String::with_capacity(original.len());
    for piece in pieces {
        reconstructed.push_str(piece);
    }
    if reconstructed == original {
        Ok(())
    } else {
        Err(reconstructed)
    }
}

/// The location of the first character where `a` and `b` differ.
fn first_difference(a: &str, b: &str) -> Location {
    let mut location = Location::default();
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            break;
        }
        if x == '\n' {
            location.line += 1;
            location.col = 1;
        } else {
            location.col += 1;
        }
    }
    location
}

/// Verifies that lexed tokens reproduce the text they were lexed from.
/// Runs after every lexing pass, in every build.
#[derive(Clone)]
pub struct RoundTripChecker {
    file: SrcFile,
    diff_viewer: Option<Arc<dyn DiffViewer>>,
}

impl RoundTripChecker {
    pub fn new(file: SrcFile) -> Self {
        RoundTripChecker {
            file,
            diff_viewer: None,
        }
    }

    /// Mismatches are shown in `viewer` before being reported.
    pub fn with_diff_viewer(mut self, viewer: Arc<dyn DiffViewer>) -> Self {
        self.diff_viewer = Some(viewer);
        self
    }

    pub fn check(&self, stage: &str, original: &str, tokens: &[Token]) -> Result<(), Error> {
        let reconstructed =
            match check_round_trip(original, tokens.iter().map(|t| t.contents().as_str())) {
                Ok(()) => return Ok(()),
                Err(reconstructed) => reconstructed,
            };
        let at = first_difference(original, &reconstructed);
        log::error!(
            target: "parse",
            "{} output of {} diverges from the input at {}",
            stage,
            self.file,
            at
        );
        if let Some(viewer) = &self.diff_viewer {
            if let Err(e) = viewer.two_way_diff(original, &reconstructed) {
                log::warn!(target: "parse", "could not show the divergence: {}", e);
            }
        }
        Err(Error::new(
            ErrorType::Lexing,
            format!(
                "{}: lexed output does not reproduce original input",
                stage
            ),
            Source::new(self.file.clone(), at, at),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::TokenKind;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl DiffViewer for Recorder {
        fn two_way_diff(&self, left: &str, right: &str) -> Result<(), Error> {
            self.0
                .lock()
                .unwrap()
                .push((left.to_string(), right.to_string()));
            Ok(())
        }

        fn three_way_diff(
            &self,
            _base: &std::path::Path,
            _left: &str,
            _right: &str,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    fn token(contents: &str) -> Token {
        Token::new(TokenKind::Whitespace, 0, contents.to_string())
    }

    #[test]
    fn concatenation() {
        assert_eq!(check_round_trip("abc", ["a", "", "bc"]), Ok(()));
        assert_eq!(check_round_trip("abc", ["a", "c"]), Err("ac".to_string()));
    }

    #[test]
    fn mismatch_is_located_and_shown() {
        let recorder = Arc::new(Recorder::default());
        let checker = RoundTripChecker::new(Arc::new("f".to_string()))
            .with_diff_viewer(recorder.clone());
        let tokens = vec![token("one\n"), token("twx\n")];
        let err = checker.check("top-level", "one\ntwo\n", &tokens).unwrap_err();
        assert_eq!(err.r#type, ErrorType::Lexing);
        assert_eq!(err.src.start, Location { line: 2, col: 3 });
        assert!(err.msg.contains("does not reproduce"));
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[("one\ntwo\n".to_string(), "one\ntwx\n".to_string())]
        );
        assert!(checker.check("top-level", "one\ntwx\n", &tokens).is_ok());
    }
}
