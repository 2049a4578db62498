//! # ledgerhelpers
//!
//! ledgerhelpers is a library for reading and maintaining plain-text ledger
//! files. It lexes ledger texts losslessly into tokens, extracts the fields
//! of transactions, and keeps change-aware caches of a journal's parse and
//! of the accounts and commodities it uses.

mod ledger;
pub mod clear;
pub mod config;
pub mod diffing;
pub mod engine;
pub mod journal;
pub mod parse;
pub mod record;
pub mod sort;
pub mod trace;
pub mod utils;

pub use ledger::*;
