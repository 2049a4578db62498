//! The accounting engine that answers account, commodity and balance
//! queries about a journal.
//!
//! The journal worker drives an engine through [`AccountingEngine`], so the
//! engine can be swapped. [`PlainEngine`] is the built-in one: it reads
//! journals with this crate's lexer and sums posting amounts per account.

mod amount;

pub use amount::{parse_amount, Amount};

use crate::parse::LedgerLexer;
use crate::trace::Tracer;
use crate::{Date, Decimal};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Anything an engine reports. The journal layer turns it into an
/// [`Error`](crate::Error) of type [`ErrorType::Engine`](crate::ErrorType::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError(pub String);

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EngineError {}

/// A posting as seen by the engine, amounts resolved.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePosting {
    pub date: Date,
    pub payee: String,
    pub account: String,
    /// `None` for an elided amount the engine could not infer.
    pub amount: Option<Amount>,
}

pub trait AccountingEngine {
    /// Replaces whatever the engine knew with `text`, the price database
    /// followed by the journal.
    fn read_journal(&mut self, text: &str) -> Result<(), EngineError>;

    /// All postings whose account matches `filter`, in journal order.
    fn query(&self, filter: &str) -> Vec<EnginePosting>;

    /// The balance of every matching account, per commodity.
    fn balance(&self, filter: &str) -> BTreeMap<String, BTreeMap<String, Decimal>> {
        let mut balances: BTreeMap<String, BTreeMap<String, Decimal>> = BTreeMap::new();
        for posting in self.query(filter) {
            if let Some(amount) = posting.amount {
                *balances
                    .entry(posting.account)
                    .or_default()
                    .entry(amount.commodity)
                    .or_default() += amount.number;
            }
        }
        balances
    }
}

/// Creates engines inside the journal worker thread.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn AccountingEngine> + Send + Sync>;

pub fn plain_engine_factory() -> EngineFactory {
    Arc::new(|| Box::new(PlainEngine::default()) as Box<dyn AccountingEngine>)
}

/// An account filter matches accounts containing it, ignoring case. The
/// empty filter matches everything.
pub fn account_matches(account: &str, filter: &str) -> bool {
    filter.is_empty() || account.to_lowercase().contains(&filter.to_lowercase())
}

#[derive(Debug, Default)]
pub struct PlainEngine {
    postings: Vec<EnginePosting>,
}

/// Running balances per account and commodity.
type Running = BTreeMap<(String, String), Decimal>;

/// What the amount slot of a posting says.
enum Slot {
    /// Nothing, or only a note.
    Elided,
    Explicit(Amount),
    /// `= AMOUNT`: whatever brings the account to that balance.
    Assigned(Amount),
}

impl Slot {
    fn of(text: &str) -> Result<Slot, String> {
        let text = text.trim();
        if text.is_empty() || text.starts_with(';') {
            Ok(Slot::Elided)
        } else if let Some(target) = text.strip_prefix('=') {
            parse_amount(target).map(Slot::Assigned)
        } else {
            parse_amount(text).map(Slot::Explicit)
        }
    }
}

impl PlainEngine {
    fn postings_of(
        txn: &crate::Transaction,
        running: &mut Running,
    ) -> Result<Vec<EnginePosting>, EngineError> {
        let context =
            |msg: String| EngineError(format!("{} {}: {}", txn.date(), txn.payee(), msg));
        let mut amounts = vec![];
        let mut delta = Running::new();
        for posting in txn.postings().iter() {
            let amount = match Slot::of(&posting.amount).map_err(context)? {
                Slot::Elided => None,
                Slot::Explicit(amount) => Some(amount),
                Slot::Assigned(target) => {
                    let key = (posting.account.clone(), target.commodity.clone());
                    let current = running.get(&key).copied().unwrap_or_default()
                        + delta.get(&key).copied().unwrap_or_default();
                    Some(Amount {
                        number: target.number - current,
                        commodity: target.commodity,
                    })
                }
            };
            if let Some(amount) = &amount {
                *delta
                    .entry((posting.account.clone(), amount.commodity.clone()))
                    .or_default() += amount.number;
            }
            amounts.push(amount);
        }

        let elided: Vec<usize> = (0..amounts.len()).filter(|i| amounts[*i].is_none()).collect();
        if elided.len() > 1 {
            return Err(context(
                "only one posting with null amount allowed per transaction".to_string(),
            ));
        }
        if let Some(index) = elided.first() {
            let mut explicit = amounts.iter().flatten();
            if let Some(first) = explicit.next().cloned() {
                let inferred = explicit
                    .cloned()
                    .try_fold(first, |sum, amount| sum + amount)
                    .ok()
                    .map(|sum| -sum);
                amounts[*index] = inferred;
            }
        }

        let postings: Vec<EnginePosting> = txn
            .postings()
            .iter()
            .zip(amounts)
            .map(|(posting, amount)| EnginePosting {
                date: txn.date(),
                payee: txn.payee().to_string(),
                account: posting.account.clone(),
                amount,
            })
            .collect();
        for posting in postings.iter() {
            if let Some(amount) = &posting.amount {
                *running
                    .entry((posting.account.clone(), amount.commodity.clone()))
                    .or_default() += amount.number;
            }
        }
        Ok(postings)
    }
}

impl AccountingEngine for PlainEngine {
    fn read_journal(&mut self, text: &str) -> Result<(), EngineError> {
        let tokens = LedgerLexer::new("<journal>")
            .with_tracer(Tracer::disabled("engine"))
            .lex(text)
            .map_err(|e| EngineError(e.to_string()))?;
        let mut running = Running::new();
        let mut postings = vec![];
        for txn in tokens.iter().filter_map(|token| token.transaction()) {
            postings.extend(Self::postings_of(txn, &mut running)?);
        }
        self.postings = postings;
        Ok(())
    }

    fn query(&self, filter: &str) -> Vec<EnginePosting> {
        self.postings
            .iter()
            .filter(|posting| account_matches(&posting.account, filter))
            .cloned()
            .collect()
    }
}
