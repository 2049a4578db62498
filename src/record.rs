//! Text of new records to append to a journal or a price file.

use crate::Date;
use std::fmt;

fn resolve_amounts<A: fmt::Display>(amounts: &[A]) -> String {
    match amounts {
        [] => String::new(),
        [amount] => amount.to_string(),
        _ => {
            let terms: Vec<_> = amounts.iter().map(ToString::to_string).collect();
            format!("( {} )", terms.join(" + "))
        }
    }
}

/// The lines of a transaction record, surrounded by empty lines.
///
/// Accounts are left-aligned and amounts right-aligned in their columns.
/// An account with several amounts gets their sum, one with none an elided
/// amount. A cleared date marks the transaction cleared.
pub fn generate_record<A: fmt::Display>(
    title: &str,
    date: Date,
    cleared_date: Option<Date>,
    account_amounts: &[(String, Vec<A>)],
) -> Vec<String> {
    let mut lines = vec![String::new()];
    match cleared_date {
        Some(cleared) => lines.push(format!("{}={} * {}", date, cleared, title)),
        None => lines.push(format!("{} {}", date, title)),
    }
    let amounts: Vec<String> = account_amounts
        .iter()
        .map(|(_, amounts)| resolve_amounts(amounts))
        .collect();
    let account_width = account_amounts
        .iter()
        .map(|(account, _)| account.chars().count())
        .max()
        .unwrap_or(0);
    let amount_width = amounts.iter().map(|a| a.chars().count()).max().unwrap_or(0);
    for ((account, _), amount) in account_amounts.iter().zip(amounts) {
        lines.push(format!(
            "    {:<aw$}    {:>mw$}",
            account,
            amount,
            aw = account_width,
            mw = amount_width
        ));
    }
    lines.push(String::new());
    lines
}

/// The price of one unit of `commodity` on `date`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRecord<A> {
    pub date: Date,
    pub commodity: String,
    pub price: A,
}

/// `P` directive lines for `prices`, surrounded by empty lines.
pub fn generate_price_records<A: fmt::Display>(prices: &[PriceRecord<A>]) -> Vec<String> {
    let mut lines = vec![String::new()];
    lines.extend(
        prices
            .iter()
            .map(|p| format!("P {} {} {}", p.date, p.commodity, p.price)),
    );
    lines.push(String::new());
    lines
}
