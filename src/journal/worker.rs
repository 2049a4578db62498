//! The journal worker: a thread owning an accounting engine session,
//! serviced over a request/reply channel.
//!
//! The engine never leaves the worker thread. The worker keeps its own
//! [`ChangeDetector`] and rereads the files when they change, so callers can
//! ask for a summary only if it changed since the last summary reply.

use super::ChangeDetector;
use crate::engine::{AccountingEngine, EngineFactory};
use crate::{Decimal, Error, ErrorType, Source};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Balances per account, then per commodity.
pub type Balances = BTreeMap<String, BTreeMap<String, Decimal>>;

/// What the engine knows about accounts and commodities.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Summary {
    /// Accounts in the order they first appear.
    pub accounts: Vec<String>,
    /// The commodity of the last posting to each account.
    pub last_commodity_for_account: BTreeMap<String, String>,
    /// Commodities in the order they first appear.
    pub all_commodities: Vec<String>,
}

impl Summary {
    pub fn harvest(engine: &dyn AccountingEngine) -> Self {
        let mut summary = Summary::default();
        for posting in engine.query("") {
            if !summary.accounts.contains(&posting.account) {
                summary.accounts.push(posting.account.clone());
            }
            if let Some(amount) = posting.amount {
                if !summary.all_commodities.contains(&amount.commodity) {
                    summary.all_commodities.push(amount.commodity.clone());
                }
                summary
                    .last_commodity_for_account
                    .insert(posting.account, amount.commodity);
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unconditional,
    /// Reply [`Reply::Unchanged`] if the summary already went out and the
    /// files did not change since.
    IfChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Summary(Mode),
    Balance(String),
}

impl Request {
    fn name(&self) -> &'static str {
        match self {
            Request::Summary(_) => "get_accounts_last_commodity_for_account_and_commodities",
            Request::Balance(_) => "get_balance",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Unchanged,
    Summary(Summary),
    Balance(Balances),
    Failed(Error),
}

struct Session {
    detector: ChangeDetector,
    factory: EngineFactory,
    engine: Option<Box<dyn AccountingEngine>>,
    summary: Option<Summary>,
    /// Whether the current summary went out in a reply.
    summary_sent: bool,
    failure: Option<Error>,
}

impl Session {
    fn engine_error(&self, msg: String) -> Error {
        Error::new(
            ErrorType::Engine,
            msg,
            Source::whole(Arc::new(self.detector.path().display().to_string())),
        )
    }

    fn reparse_ledger(&mut self) -> Result<(), Error> {
        log::debug!(target: "journal.worker", "Reparsing ledger.");
        let text = self.detector.get_text()?;
        let mut engine = (self.factory)();
        engine
            .read_journal(&text)
            .map_err(|e| self.engine_error(e.to_string()))?;
        log::debug!(target: "journal.worker", "Harvesting accounts and last commodities.");
        self.summary = Some(Summary::harvest(engine.as_ref()));
        self.engine = Some(engine);
        Ok(())
    }

    /// Rereads the files if they changed. A failed reread sticks until the
    /// next change.
    fn reparse_all_if_needed(&mut self) -> Result<bool, Error> {
        let changed = self.detector.changed()?;
        if changed {
            self.engine = None;
            self.summary = None;
            self.summary_sent = false;
            self.failure = self.reparse_ledger().err();
        }
        Ok(changed)
    }

    fn service(&mut self, request: Request) -> Result<Reply, Error> {
        self.reparse_all_if_needed()?;
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| self.engine_error("the journal has not been read".to_string()))?;
        Ok(match request {
            Request::Balance(filter) => Reply::Balance(engine.balance(&filter)),
            Request::Summary(Mode::IfChanged) if self.summary_sent => Reply::Unchanged,
            Request::Summary(_) => {
                self.summary_sent = true;
                Reply::Summary(self.summary.clone().unwrap_or_default())
            }
        })
    }

    fn run(mut self, requests: Receiver<Request>, replies: Sender<Reply>) {
        if let Err(e) = self.reparse_all_if_needed() {
            self.failure = Some(e);
        }
        while let Ok(request) = requests.recv() {
            let start = Instant::now();
            let name = request.name();
            log::debug!(target: "journal.worker.loop", "* Servicing: {:<55}  started", name);
            let reply = match self.service(request) {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!(
                        target: "journal.worker.loop",
                        "Unrecoverable error in worker: {}",
                        e
                    );
                    Reply::Failed(e)
                }
            };
            log::debug!(
                target: "journal.worker.loop",
                "* Serviced:  {:<55}  {:.3} seconds - {}",
                name,
                start.elapsed().as_secs_f64(),
                if reply == Reply::Unchanged { "unchanged" } else { "new data" }
            );
            if replies.send(reply).is_err() {
                break;
            }
        }
    }
}

/// The caller's end of a worker thread. The thread exits once this is
/// dropped and it has finished the request at hand.
pub struct Worker {
    requests: Sender<Request>,
    replies: Receiver<Reply>,
}

impl Worker {
    /// Starts a worker that reads the journal right away.
    pub fn spawn(detector: ChangeDetector, factory: EngineFactory) -> Result<Self, Error> {
        let (requests, their_requests) = channel();
        let (their_replies, replies) = channel();
        let path = detector.path().display().to_string();
        thread::Builder::new()
            .name("journal worker".to_string())
            .spawn(move || {
                let session = Session {
                    detector,
                    factory,
                    engine: None,
                    summary: None,
                    summary_sent: false,
                    failure: None,
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
                    session.run(their_requests, their_replies)
                }));
                if outcome.is_err() {
                    log::error!(target: "journal.worker", "Journal worker crashed.");
                }
            })
            .map_err(|e| {
                Error::new(
                    ErrorType::Worker,
                    format!("cannot start journal worker: {}", e),
                    Source::whole(Arc::new(path)),
                )
            })?;
        Ok(Worker { requests, replies })
    }

    /// Sends one request and waits for its reply.
    pub fn request(&self, request: Request) -> Result<Reply, Error> {
        let gone = || {
            Error::new(
                ErrorType::Worker,
                "the journal worker is gone",
                Source::whole(Arc::new("<worker>".to_string())),
            )
        };
        self.requests.send(request).map_err(|_| gone())?;
        self.replies.recv().map_err(|_| gone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::plain_engine_factory;
    use std::io::Write;

    fn journal(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn summary_then_unchanged() {
        let file = journal(
            "2015-01-01 x\n  Assets:Cash  -1 CHF\n  Expenses:Food\n\n2015-01-02 y\n  Assets:Cash  -1 EUR\n  Expenses:Food  1 EUR\n",
        );
        let worker = Worker::spawn(
            ChangeDetector::new(file.path(), None),
            plain_engine_factory(),
        )
        .unwrap();
        let summary = match worker.request(Request::Summary(Mode::Unconditional)).unwrap() {
            Reply::Summary(summary) => summary,
            other => panic!("unexpected reply {:?}", other),
        };
        assert_eq!(summary.accounts, vec!["Assets:Cash", "Expenses:Food"]);
        assert_eq!(summary.all_commodities, vec!["CHF", "EUR"]);
        assert_eq!(summary.last_commodity_for_account["Assets:Cash"], "EUR");
        assert_eq!(
            worker.request(Request::Summary(Mode::IfChanged)).unwrap(),
            Reply::Unchanged
        );
        assert!(matches!(
            worker.request(Request::Summary(Mode::Unconditional)).unwrap(),
            Reply::Summary(_)
        ));
    }

    #[test]
    fn engine_failures_are_replied() {
        let file = journal("2015-01-01 x\n  A  1 CHF\n  B\n  C\n");
        let worker = Worker::spawn(
            ChangeDetector::new(file.path(), None),
            plain_engine_factory(),
        )
        .unwrap();
        match worker.request(Request::Balance(String::new())).unwrap() {
            Reply::Failed(e) => assert_eq!(e.r#type, ErrorType::Engine),
            other => panic!("unexpected reply {:?}", other),
        }
    }
}
