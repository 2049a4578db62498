use crate::utils::parse_decimal;
use crate::Decimal;
use logos::Logos;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg};

#[derive(Debug, PartialEq, Logos, Clone, Copy)]
enum AmountToken {
    #[regex(r"[0-9][0-9,]*(\.[0-9]*)?")]
    #[regex(r"\.[0-9]+")]
    Number,

    #[token("-")]
    Minus,

    #[token("+")]
    Plus,

    #[regex(r#""[^"]*""#)]
    QuotedCommodity,

    #[regex(r#"[^\s0-9\-\+\.,@{}()\[\];"=*/]+"#)]
    Commodity,

    #[token("@")]
    AtUnit,

    #[token("@@")]
    AtTotal,

    #[token("{")]
    LBrace,

    #[token("{{")]
    LLBrace,

    #[token("[")]
    LBracket,

    #[token("(")]
    LParen,

    #[token(";")]
    Comment,

    #[token("=")]
    Assertion,

    #[error]
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Error,
}

/// A [`Decimal`] number plus the commodity, which may be empty.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    pub number: Decimal,
    pub commodity: String,
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.commodity.is_empty() {
            write!(f, "{}", self.number)
        } else {
            write!(f, "{} {}", self.number, self.commodity)
        }
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Self::Output {
        Amount {
            number: -self.number,
            commodity: self.commodity,
        }
    }
}

impl Add for Amount {
    type Output = Result<Amount, String>;

    fn add(self, rhs: Amount) -> Self::Output {
        if self.commodity != rhs.commodity {
            return Err(format!(
                "cannot add {} and {}: different commodities",
                self, rhs
            ));
        }
        Ok(Amount {
            number: self.number + rhs.number,
            commodity: self.commodity,
        })
    }
}

fn parse_simple(text: &str) -> Result<Amount, String> {
    let mut lexer = AmountToken::lexer(text);
    let mut negative = false;
    let mut number = None;
    let mut commodity: Option<&str> = None;
    while let Some(token) = lexer.next() {
        match token {
            AmountToken::Minus => negative = !negative,
            AmountToken::Plus => {}
            AmountToken::Number if number.is_none() => number = Some(parse_decimal(lexer.slice())?),
            AmountToken::Commodity | AmountToken::QuotedCommodity if commodity.is_none() => {
                commodity = Some(lexer.slice())
            }
            // Lot prices, per-unit and total costs, notes and balance
            // assertions do not change the quantity.
            AmountToken::AtUnit
            | AmountToken::AtTotal
            | AmountToken::LBrace
            | AmountToken::LLBrace
            | AmountToken::LBracket
            | AmountToken::Comment
            | AmountToken::Assertion => break,
            _ => return Err(format!("Unexpected {:?} in amount {:?}.", lexer.slice(), text)),
        }
    }
    let number = number.ok_or_else(|| format!("No quantity in amount {:?}.", text))?;
    Ok(Amount {
        number: if negative { -number } else { number },
        commodity: commodity.unwrap_or("").to_string(),
    })
}

/// Parses the amount of a posting, like `-6.00 CHF`, `$ -55`,
/// `1 "silver coin" @ $55` or a sum `( $1 + $2 )`.
pub fn parse_amount(text: &str) -> Result<Amount, String> {
    let trimmed = text.trim();
    if let Some(inner) = trimmed.strip_prefix('(') {
        let end = inner
            .rfind(')')
            .ok_or_else(|| format!("Unbalanced parentheses in amount {:?}.", text))?;
        let mut terms = inner[..end].split(" + ").map(parse_simple);
        let first = terms
            .next()
            .ok_or_else(|| format!("Empty amount {:?}.", text))??;
        return terms.try_fold(first, |sum, term| sum + term?);
    }
    if matches!(AmountToken::lexer(trimmed).next(), Some(AmountToken::LParen)) {
        return Err(format!("Unsupported expression {:?}.", text));
    }
    parse_simple(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn amount(number: &str, commodity: &str) -> Amount {
        Amount {
            number: Decimal::from_str(number).unwrap(),
            commodity: commodity.to_string(),
        }
    }

    #[test]
    fn suffix_and_prefix_commodities() {
        assert_eq!(parse_amount("-6.00 CHF"), Ok(amount("-6.00", "CHF")));
        assert_eq!(parse_amount("$ -55"), Ok(amount("-55", "$")));
        assert_eq!(parse_amount("-$55"), Ok(amount("-55", "$")));
        assert_eq!(parse_amount("EUR1,000.5"), Ok(amount("1000.5", "EUR")));
        assert_eq!(parse_amount("42"), Ok(amount("42", "")));
    }

    #[test]
    fn annotations_are_ignored() {
        assert_eq!(
            parse_amount("1 \"silver coin\"    @ $55"),
            Ok(amount("1", "\"silver coin\""))
        );
        assert_eq!(
            parse_amount("10 AAPL {$30} [2015-01-01] @@ $400"),
            Ok(amount("10", "AAPL"))
        );
        assert_eq!(parse_amount("5 CHF ; note"), Ok(amount("5", "CHF")));
        assert_eq!(parse_amount("5 CHF = 100 CHF"), Ok(amount("5", "CHF")));
    }

    #[test]
    fn sums() {
        assert_eq!(parse_amount("( $1 + $2.50 )"), Ok(amount("3.50", "$")));
        assert!(parse_amount("( $1 + 2 EUR )").is_err());
        assert!(parse_amount("(1 * 2)").is_err());
    }

    #[test]
    fn garbage() {
        assert!(parse_amount("CHF").is_err());
        assert!(parse_amount("1 2 CHF").is_err());
    }
}
