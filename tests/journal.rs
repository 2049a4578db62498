use ledgerhelpers::engine::{
    AccountingEngine, EngineError, EngineFactory, EnginePosting, PlainEngine,
};
use ledgerhelpers::clear::clear_transactions;
use ledgerhelpers::journal::Journal;
use ledgerhelpers::record::generate_record;
use ledgerhelpers::utils::replace_file;
use ledgerhelpers::{ClearingState, Date, ErrorType};
use std::fs::{self, File};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const JOURNAL: &str = "; groceries\n2015-03-12 * Shop\n    Assets:Cash          -6.00 CHF\n    Expenses:Food\n\n2015-03-13 Bar\n    Assets:Cash          -3.00 EUR\n    Expenses:Drinking     3.00 EUR\n\n2015-03-14 shop\n    Assets:Cash          -1.00 CHF\n    Expenses:Food\n";

/// Rewrites `path` and moves its modification time `seconds` ahead, so
/// that the change is seen regardless of timestamp granularity.
fn rewrite(path: &Path, contents: &str, seconds: u64) {
    fs::write(path, contents).unwrap();
    File::options()
        .append(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(seconds))
        .unwrap();
}

fn journal_file(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.ledger");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn payees_and_transactions() {
    let (_dir, path) = journal_file(JOURNAL);
    let journal = Journal::open(&path, None).unwrap();
    assert_eq!(journal.all_payees().unwrap(), vec!["Shop", "Bar", "shop"]);
    assert_eq!(journal.transactions_with_payee("Shop", true).unwrap().len(), 1);
    let shops = journal.transactions_with_payee("SHOP", false).unwrap();
    assert_eq!(shops.len(), 2);
    assert!(shops[0].contents().starts_with("; groceries\n"));
    let tokens = journal.internal_parsing().unwrap();
    assert_eq!(tokens.iter().map(|t| t.contents().as_str()).collect::<String>(), JOURNAL);
}

#[test]
fn accounts_commodities_and_balances() {
    let (_dir, path) = journal_file(JOURNAL);
    let journal = Journal::open(&path, None).unwrap();
    let (accounts, last) = journal.accounts_and_last_commodity_for_account().unwrap();
    assert_eq!(accounts, vec!["Assets:Cash", "Expenses:Food", "Expenses:Drinking"]);
    assert_eq!(last["Assets:Cash"], "CHF");
    assert_eq!(last["Expenses:Drinking"], "EUR");
    assert_eq!(journal.commodities().unwrap(), vec!["CHF", "EUR"]);
    let balances = journal.balance("cash").unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances["Assets:Cash"]["CHF"].to_string(), "-7.00");
    assert_eq!(balances["Assets:Cash"]["EUR"].to_string(), "-3.00");
}

#[test]
fn appended_records_are_picked_up() {
    let (_dir, path) = journal_file(JOURNAL);
    let prices = path.with_file_name("prices.db");
    let journal = Journal::open(&path, Some(prices.clone())).unwrap();
    assert_eq!(journal.all_payees().unwrap().len(), 3);
    assert_eq!(journal.commodities().unwrap(), vec!["CHF", "EUR"]);

    let record = generate_record(
        "Bakery",
        Date::from_ymd_opt(2015, 3, 15).unwrap(),
        None,
        &[
            ("Expenses:Food".to_string(), vec!["4 USD"]),
            ("Assets:Cash".to_string(), vec![]),
        ],
    );
    journal.add_text_to_file(&record).unwrap();
    journal
        .add_text_to_price_file(&["P 2015-03-15 USD 0.9 CHF", ""])
        .unwrap();
    rewrite(&path, &fs::read_to_string(&path).unwrap(), 10);

    assert_eq!(
        journal.all_payees().unwrap(),
        vec!["Shop", "Bar", "shop", "Bakery"]
    );
    assert_eq!(journal.commodities().unwrap(), vec!["CHF", "EUR", "USD"]);
    assert_eq!(
        fs::read_to_string(&prices).unwrap(),
        "P 2015-03-15 USD 0.9 CHF\n"
    );
}

#[test]
fn balance_does_not_hide_new_commodities() {
    let (_dir, path) = journal_file("2015-01-01 x\n  A  1 CHF\n  B\n");
    let journal = Journal::open(&path, None).unwrap();
    assert_eq!(journal.commodities().unwrap(), vec!["CHF"]);

    rewrite(&path, "2015-01-01 x\n  A  1 CHF\n  B\n\n2015-01-02 y\n  C  1 USD\n  D\n", 10);
    assert_eq!(journal.balance("C").unwrap()["C"]["USD"].to_string(), "1");
    assert_eq!(journal.commodities().unwrap(), vec!["CHF", "USD"]);
    let (accounts, _) = journal.accounts_and_last_commodity_for_account().unwrap();
    assert_eq!(accounts, vec!["A", "B", "C", "D"]);
}

#[test]
fn cleared_file_is_reread() {
    let (_dir, path) = journal_file(JOURNAL);
    let journal = Journal::open(&path, None).unwrap();
    let tokens = journal.internal_parsing().unwrap().as_ref().clone();
    let cleared = Date::from_ymd_opt(2015, 3, 20).unwrap();
    let (tokens, changed) = clear_transactions(tokens, |txn| {
        Some(cleared).filter(|_| txn.payee() == "Bar")
    });
    assert_eq!(changed, 1);
    let text: String = tokens.iter().map(|t| t.contents().as_str()).collect();
    replace_file(&path, &text).unwrap();
    rewrite(&path, &text, 10);

    let bars = journal.transactions_with_payee("Bar", true).unwrap();
    let txn = bars[0].transaction().unwrap();
    assert_eq!(txn.state(), ClearingState::Cleared);
    assert_eq!(txn.clearing_date(), Some(cleared));
    assert!(bars[0].contents().starts_with("2015-03-13=2015-03-20 * Bar\n"));
    assert_eq!(journal.all_payees().unwrap(), vec!["Shop", "Bar", "shop"]);
}

#[test]
fn failed_reparse_fails_readers_until_fixed() {
    let (_dir, path) = journal_file(JOURNAL);
    let journal = Journal::open(&path, None).unwrap();
    let good = journal.internal_parsing().unwrap();
    assert!(journal.accounts_and_last_commodity_for_account().is_ok());

    rewrite(&path, &format!("{}@ stray\n", JOURNAL), 10);
    let err = journal.internal_parsing().unwrap_err();
    assert_eq!(err.r#type, ErrorType::Lexing);
    assert_eq!(err.src.end.line, 13);
    assert!(journal.all_payees().is_err());
    assert!(Arc::ptr_eq(&journal.last_good_parsing().unwrap(), &good));
    let err = journal.accounts_and_last_commodity_for_account().unwrap_err();
    assert_eq!(err.r#type, ErrorType::Engine);

    rewrite(&path, JOURNAL, 20);
    assert_eq!(journal.all_payees().unwrap().len(), 3);
    assert!(journal.commodities().is_ok());
}

#[test]
fn concurrent_readers_share_one_parse() {
    let (_dir, path) = journal_file(JOURNAL);
    let journal = Journal::open(&path, None).unwrap();
    let parses: Vec<_> = std::thread::scope(|scope| {
        let readers: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| journal.internal_parsing().unwrap()))
            .collect();
        readers.into_iter().map(|r| r.join().unwrap()).collect()
    });
    for parse in parses.iter() {
        assert!(Arc::ptr_eq(parse, &parses[0]));
    }
}

struct Flaky {
    inner: PlainEngine,
    fail: bool,
}

impl AccountingEngine for Flaky {
    fn read_journal(&mut self, text: &str) -> Result<(), EngineError> {
        if self.fail {
            return Err(EngineError("flaky engine".to_string()));
        }
        self.inner.read_journal(text)
    }

    fn query(&self, filter: &str) -> Vec<EnginePosting> {
        if filter == "boom" {
            panic!("engine crashed");
        }
        self.inner.query(filter)
    }
}

fn flaky_factory(created: Arc<AtomicUsize>) -> EngineFactory {
    Arc::new(move || -> Box<dyn AccountingEngine> {
        let n = created.fetch_add(1, Ordering::SeqCst);
        Box::new(Flaky {
            inner: PlainEngine::default(),
            fail: n == 0,
        })
    })
}

#[test]
fn failed_worker_is_replaced() {
    let (_dir, path) = journal_file(JOURNAL);
    let created = Arc::new(AtomicUsize::new(0));
    let journal = Journal::open_with_engine(&path, None, flaky_factory(created.clone())).unwrap();
    let (accounts, _) = journal.accounts_and_last_commodity_for_account().unwrap();
    assert_eq!(accounts.len(), 3);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[test]
fn crashed_worker_is_replaced() {
    let (_dir, path) = journal_file(JOURNAL);
    let created = Arc::new(AtomicUsize::new(1));
    let journal = Journal::open_with_engine(&path, None, flaky_factory(created.clone())).unwrap();
    assert!(journal.commodities().is_ok());
    let err = journal.balance("boom").unwrap_err();
    assert_eq!(err.r#type, ErrorType::Worker);
    assert_eq!(journal.commodities().unwrap(), vec!["CHF", "EUR"]);
    assert_eq!(created.load(Ordering::SeqCst), 4);
}
