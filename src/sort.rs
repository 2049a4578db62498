//! Chronological sorting of lexed ledger files.

use crate::parse::Token;
use crate::Date;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Slot {
    Front,
    On(Date),
    Back,
}

/// Sorts tokens by date, keeping tokens of the same date in file order.
///
/// Tokens ahead of the first transaction stay in front. Any other undated
/// token (comments, prices, blank lines) moves with the next transaction
/// after it; the ones after the last transaction go last.
pub fn sort_transactions(tokens: Vec<Token>) -> Vec<Token> {
    let mut slots = vec![Slot::Back; tokens.len()];
    let mut next = Slot::Back;
    for (i, token) in tokens.iter().enumerate().rev() {
        if let Some(date) = token.date() {
            next = Slot::On(date);
        }
        slots[i] = next;
    }
    if let Some(first) = tokens.iter().position(|token| token.date().is_some()) {
        slots[..first].iter_mut().for_each(|slot| *slot = Slot::Front);
    }
    let mut keyed: Vec<_> = slots.into_iter().zip(tokens).collect();
    keyed.sort_by_key(|(slot, _)| *slot);
    keyed.into_iter().map(|(_, token)| token).collect()
}
