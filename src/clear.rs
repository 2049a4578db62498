//! Marking uncleared transactions as cleared.

use crate::parse::Token;
use crate::{ClearingState, Date, Transaction};

/// The header line `DATE[=DATE] [!] PAYEE` rewritten as
/// `DATE=CLEARED * PAYEE`. The primary date keeps its written form.
fn cleared_header(header: &str, cleared: Date) -> Option<String> {
    let primary_end = header.find(|c: char| c == '=' || c.is_whitespace())?;
    let (primary, rest) = header.split_at(primary_end);
    let rest = match rest.strip_prefix('=') {
        Some(secondary) => &secondary[secondary.find(char::is_whitespace)?..],
        None => rest,
    };
    let rest = rest.trim_start_matches([' ', '\t']);
    let rest = rest
        .strip_prefix('!')
        .map(|payee| payee.trim_start_matches([' ', '\t']))
        .unwrap_or(rest);
    Some(format!("{}={} * {}", primary, cleared.format("%Y-%m-%d"), rest))
}

/// Rewrites the header of an uncleared transaction token. Leading comments
/// and posting lines are kept as written.
fn clear_token(token: &mut Token, cleared: Date) -> bool {
    let header_start = match token
        .contents
        .split_inclusive('\n')
        .scan(0, |offset, line| {
            let start = *offset;
            *offset += line.len();
            Some((start, line))
        })
        .find(|(_, line)| line.starts_with(|c: char| c.is_ascii_digit()))
    {
        Some((start, _)) => start,
        None => return false,
    };
    let header_end = token.contents[header_start..]
        .find('\n')
        .map_or(token.contents.len(), |end| header_start + end);
    let header = match cleared_header(&token.contents[header_start..header_end], cleared) {
        Some(header) => header,
        None => return false,
    };
    let txn = match token.transaction_mut() {
        Some(txn) if txn.state() != ClearingState::Cleared => txn,
        _ => return false,
    };
    txn.state = ClearingState::Cleared;
    txn.secondary_date = Some(cleared);
    token
        .contents
        .replace_range(header_start..header_end, &header);
    true
}

/// Marks cleared every uncleared transaction for which `choose` returns a
/// date, on that date. Returns the tokens with their positions updated and
/// the number of transactions changed.
pub fn clear_transactions(
    mut tokens: Vec<Token>,
    mut choose: impl FnMut(&Transaction) -> Option<Date>,
) -> (Vec<Token>, usize) {
    let mut changed = 0;
    let mut offset = 0;
    for token in tokens.iter_mut() {
        let cleared = match token.transaction() {
            Some(txn) if txn.state() != ClearingState::Cleared => choose(txn),
            _ => None,
        };
        if let Some(cleared) = cleared {
            if clear_token(token, cleared) {
                changed += 1;
            }
        }
        offset += token.contents.chars().count();
        token.pos = offset;
    }
    log::debug!(target: "clear", "Cleared {} transactions.", changed);
    (tokens, changed)
}
