use super::token::{Token, TokenKind};

/// Second lexing pass: every transaction written right below one or more
/// comments absorbs them into a [`TokenKind::TransactionWithContext`] token,
/// along with the comments written right below it. Other comments are passed
/// through.
pub fn contextualize(tokens: Vec<Token>) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut comments: Vec<Token> = vec![];
    let mut absorbing = false;
    for token in tokens {
        if token.is_comment() {
            match result.last_mut() {
                Some(fused) if absorbing => {
                    fused.contents.push_str(&token.contents);
                    fused.pos = token.pos;
                }
                _ => comments.push(token),
            }
            continue;
        }
        absorbing = false;
        match token.kind {
            TokenKind::Transaction(txn) if !comments.is_empty() => {
                let mut contents: String =
                    comments.drain(..).map(Token::into_contents).collect();
                contents.push_str(&token.contents);
                result.push(Token::new(
                    TokenKind::TransactionWithContext(txn),
                    token.pos,
                    contents,
                ));
                absorbing = true;
            }
            kind => {
                result.append(&mut comments);
                result.push(Token {
                    kind,
                    pos: token.pos,
                    contents: token.contents,
                });
            }
        }
    }
    result.append(&mut comments);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_transaction;

    fn comment(text: &str) -> Token {
        Token::new(TokenKind::Comment, 0, text.to_string())
    }

    fn whitespace(text: &str) -> Token {
        Token::new(TokenKind::Whitespace, 0, text.to_string())
    }

    fn transaction(text: &str) -> Token {
        let txn = parse_transaction(text).unwrap();
        Token::new(TokenKind::Transaction(Box::new(txn)), 9, text.to_string())
    }

    #[test]
    fn comment_right_above_is_fused() {
        let tokens = contextualize(vec![
            comment("; a gift!\n"),
            transaction("2011-12-25 * a gift!\n  A  1\n  B\n"),
            whitespace("\n"),
        ]);
        assert_eq!(tokens.len(), 2);
        assert!(matches!(
            tokens[0].kind(),
            TokenKind::TransactionWithContext(_)
        ));
        assert_eq!(tokens[0].payee(), Some("a gift!"));
        assert_eq!(tokens[0].pos(), 9);
        assert_eq!(
            tokens[0].contents(),
            "; a gift!\n2011-12-25 * a gift!\n  A  1\n  B\n"
        );
    }

    #[test]
    fn comments_right_below_are_fused_too() {
        let text = "; before\n2015-01-01 x\n  A  1\n  B\n; after\n; and more\n\n; loose\n";
        let tokens = crate::parse::lex_ledger_file_contents(text).unwrap();
        let names: Vec<_> = tokens.iter().map(|t| t.kind().name()).collect();
        assert_eq!(names, vec!["TransactionWithContext", "Whitespace", "Comment"]);
        assert_eq!(
            tokens[0].contents(),
            "; before\n2015-01-01 x\n  A  1\n  B\n; after\n; and more\n"
        );
        assert_eq!(tokens[0].pos(), 52);
        assert_eq!(tokens[0].payee(), Some("x"));
    }

    #[test]
    fn separated_comments_pass_through() {
        let input = vec![
            comment("; header\n"),
            whitespace("\n"),
            transaction("2011-12-25 x\n  A  1\n  B\n"),
            comment("; trailing\n"),
        ];
        let tokens = contextualize(input.clone());
        assert_eq!(tokens, input);
    }
}
