//! A ledger file pair (journal and optional price database) with cached
//! views that are rebuilt when the files change on disk.
//!
//! Two views are kept. The internal parsing is this crate's token stream,
//! rebuilt on a background thread. The summary of accounts and commodities
//! comes from the accounting engine, which lives in a [`Worker`] thread.
//! Both are invalidated by modification times only.

mod worker;

pub use worker::{Balances, Mode, Reply, Request, Summary, Worker};

use crate::engine::{plain_engine_factory, EngineFactory};
use crate::parse::{LedgerLexer, Token};
use crate::trace::Tracer;
use crate::{Error, ErrorType, Source};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::SystemTime;

fn mtime(path: &Path) -> Result<Option<SystemTime>, Error> {
    match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(time) => Ok(Some(time)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(&path.display().to_string(), &e)),
    }
}

fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::io(&path.display().to_string(), &e))
}

fn unexpected(reply: Reply) -> Error {
    Error::new(
        ErrorType::Worker,
        format!("unexpected reply from journal worker: {:?}", reply),
        Source::whole(Arc::new("<worker>".to_string())),
    )
}

/// Remembers the modification times of a journal and its price file.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    path: PathBuf,
    price_path: Option<PathBuf>,
    path_mtime: Option<SystemTime>,
    price_path_mtime: Option<SystemTime>,
}

impl ChangeDetector {
    pub fn new(path: impl Into<PathBuf>, price_path: Option<PathBuf>) -> Self {
        ChangeDetector {
            path: path.into(),
            price_path,
            path_mtime: None,
            price_path_mtime: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn price_path(&self) -> Option<&Path> {
        self.price_path.as_deref()
    }

    /// Whether either file changed since the previous call. The first call
    /// on an existing file returns `true`. A missing file counts as having
    /// no modification time.
    pub fn changed(&mut self) -> Result<bool, Error> {
        let path_mtime = mtime(&self.path)?;
        let price_path_mtime = match &self.price_path {
            Some(price_path) => mtime(price_path)?,
            None => None,
        };
        if path_mtime != self.path_mtime || price_path_mtime != self.price_path_mtime {
            self.path_mtime = path_mtime;
            self.price_path_mtime = price_path_mtime;
            log::debug!(target: "journal.master", "Files have changed, rereading.");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// The price file followed by the journal, joined by a newline. A
    /// missing price file is skipped.
    pub fn get_text(&self) -> Result<String, Error> {
        let mut texts = vec![];
        if let Some(price_path) = &self.price_path {
            match fs::read_to_string(price_path) {
                Ok(text) => texts.push(text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&price_path.display().to_string(), &e)),
            }
        }
        texts.push(read(&self.path)?);
        Ok(texts.join("\n"))
    }

    /// The journal alone.
    pub fn get_unitext(&self) -> Result<String, Error> {
        read(&self.path)
    }
}

/// Transactions whose payee equals `payee`.
pub fn transactions_with_payee<'a>(
    payee: &str,
    tokens: &'a [Token],
    case_sensitive: bool,
) -> Vec<&'a Token> {
    tokens
        .iter()
        .filter(|token| match token.payee() {
            Some(left) if case_sensitive => left == payee,
            Some(left) => left.to_lowercase() == payee.to_lowercase(),
            None => false,
        })
        .collect()
}

#[derive(Default)]
struct Cache {
    tokens: Option<Arc<Vec<Token>>>,
    last_good: Option<Arc<Vec<Token>>>,
    failure: Option<Error>,
    rebuilding: bool,
}

struct Internal {
    state: Mutex<(ChangeDetector, Cache)>,
    rebuilt: Condvar,
    lexer: LedgerLexer,
}

impl Internal {
    fn lock(&self) -> MutexGuard<'_, (ChangeDetector, Cache)> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rebuild(&self, detector: ChangeDetector, tracer: Tracer) {
        log::debug!(target: "journal.master", "Reparsing internal.");
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            tracer.time("internal reparse", || {
                self.lexer.lex_with_context(&detector.get_unitext()?)
            })
        }))
        .unwrap_or_else(|_| {
            Err(Error::new(
                ErrorType::Lexing,
                "internal reparser crashed",
                Source::whole(self.lexer.file().clone()),
            ))
        });
        let mut state = self.lock();
        let cache = &mut state.1;
        match result {
            Ok(tokens) => {
                let tokens = Arc::new(tokens);
                cache.tokens = Some(tokens.clone());
                cache.last_good = Some(tokens);
                cache.failure = None;
            }
            Err(e) => {
                log::error!(target: "journal.master", "Reparsing internal failed: {}", e);
                cache.failure = Some(e);
            }
        }
        cache.rebuilding = false;
        self.rebuilt.notify_all();
    }
}

struct WorkerSlot {
    worker: Worker,
    summary: Option<Summary>,
}

/// A journal and its optional price file, with cached parses.
///
/// A failed reparse makes every reader fail until the files change and a
/// reparse succeeds. [`last_good_parsing`](Journal::last_good_parsing)
/// still returns the tokens of the last success.
pub struct Journal {
    internal: Arc<Internal>,
    files: ChangeDetector,
    factory: EngineFactory,
    worker: Mutex<WorkerSlot>,
    tracer: Tracer,
}

impl Journal {
    /// Opens the journal with the built-in engine.
    pub fn open(path: impl Into<PathBuf>, price_path: Option<PathBuf>) -> Result<Self, Error> {
        Self::open_with_engine(path, price_path, plain_engine_factory())
    }

    /// Opens the journal, starts its worker and starts parsing the journal
    /// in the background.
    pub fn open_with_engine(
        path: impl Into<PathBuf>,
        price_path: Option<PathBuf>,
        factory: EngineFactory,
    ) -> Result<Self, Error> {
        let files = ChangeDetector::new(path, price_path);
        let lexer = LedgerLexer::new(files.path().display().to_string());
        let journal = Journal {
            internal: Arc::new(Internal {
                state: Mutex::new((files.clone(), Cache::default())),
                rebuilt: Condvar::new(),
                lexer,
            }),
            worker: Mutex::new(WorkerSlot {
                worker: Worker::spawn(files.clone(), factory.clone())?,
                summary: None,
            }),
            files,
            factory,
            tracer: Tracer::new("journal.master"),
        };
        drop(journal.cache_internal_parsing()?);
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        self.files.path()
    }

    pub fn price_path(&self) -> Option<&Path> {
        self.files.price_path()
    }

    /// Starts a background rebuild if the files changed. The guard is
    /// returned without waiting for it.
    fn cache_internal_parsing(&self) -> Result<MutexGuard<'_, (ChangeDetector, Cache)>, Error> {
        let mut state = self.internal.lock();
        while state.1.rebuilding {
            state = self
                .internal
                .rebuilt
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.0.changed()? {
            state.1.tokens = None;
            state.1.rebuilding = true;
            let internal = Arc::clone(&self.internal);
            let detector = state.0.clone();
            let tracer = self.tracer;
            let spawned = thread::Builder::new()
                .name("internal reparser".to_string())
                .spawn(move || internal.rebuild(detector, tracer));
            if let Err(e) = spawned {
                state.1.rebuilding = false;
                return Err(Error::new(
                    ErrorType::Worker,
                    format!("cannot start internal reparser: {}", e),
                    Source::whole(self.internal.lexer.file().clone()),
                ));
            }
        }
        Ok(state)
    }

    /// The contextual token stream of the journal, as of the last check
    /// for changes. Waits for a rebuild in progress.
    pub fn internal_parsing(&self) -> Result<Arc<Vec<Token>>, Error> {
        self.tracer.time("internal_parsing", || {
            let mut state = self.cache_internal_parsing()?;
            while state.1.rebuilding {
                state = self
                    .internal
                    .rebuilt
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            match (&state.1.tokens, &state.1.failure) {
                (Some(tokens), _) => Ok(tokens.clone()),
                (None, Some(failure)) => Err(failure.clone()),
                (None, None) => Err(Error::new(
                    ErrorType::Lexing,
                    "the journal has not been parsed",
                    Source::whole(self.internal.lexer.file().clone()),
                )),
            }
        })
    }

    /// The tokens of the last successful parse, without checking for
    /// changes or waiting. `None` before the first success.
    pub fn last_good_parsing(&self) -> Option<Arc<Vec<Token>>> {
        self.internal.lock().1.last_good.clone()
    }

    /// Distinct payees in the order they first appear.
    pub fn all_payees(&self) -> Result<Vec<String>, Error> {
        let tokens = self.internal_parsing()?;
        let mut payees: Vec<String> = vec![];
        for payee in tokens.iter().filter_map(Token::payee) {
            if !payees.iter().any(|seen| seen == payee) {
                payees.push(payee.to_string());
            }
        }
        Ok(payees)
    }

    pub fn transactions_with_payee(
        &self,
        payee: &str,
        case_sensitive: bool,
    ) -> Result<Vec<Token>, Error> {
        let tokens = self.internal_parsing()?;
        Ok(transactions_with_payee(payee, &tokens, case_sensitive)
            .into_iter()
            .cloned()
            .collect())
    }

    fn restart_worker(&self, slot: &mut WorkerSlot) -> Result<(), Error> {
        slot.summary = None;
        slot.worker = Worker::spawn(self.files.clone(), self.factory.clone())?;
        Ok(())
    }

    /// Runs `op` against the worker. On failure the worker is replaced and
    /// `op` retried once; a second failure replaces it again and is returned.
    fn with_worker<T>(
        &self,
        op: impl Fn(&mut WorkerSlot) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match op(&mut *slot) {
            Ok(value) => Ok(value),
            Err(e) => {
                log::warn!(target: "journal.master", "Restarting journal worker after: {}", e);
                self.restart_worker(&mut *slot)?;
                op(&mut *slot).or_else(|e| {
                    self.restart_worker(&mut *slot)?;
                    Err(e)
                })
            }
        }
    }

    fn cache_summary(slot: &mut WorkerSlot) -> Result<Summary, Error> {
        let mode = match slot.summary {
            Some(_) => Mode::IfChanged,
            None => Mode::Unconditional,
        };
        let reply = slot.worker.request(Request::Summary(mode));
        if let (Ok(Reply::Unchanged), Some(summary)) = (&reply, &slot.summary) {
            return Ok(summary.clone());
        }
        slot.summary = None;
        match reply? {
            Reply::Summary(summary) => {
                slot.summary = Some(summary.clone());
                Ok(summary)
            }
            Reply::Failed(e) => Err(e),
            reply => Err(unexpected(reply)),
        }
    }

    /// Accounts in first-seen order and the commodity last used with each.
    pub fn accounts_and_last_commodity_for_account(
        &self,
    ) -> Result<(Vec<String>, BTreeMap<String, String>), Error> {
        self.tracer
            .time("accounts_and_last_commodity_for_account", || {
                self.with_worker(Self::cache_summary)
            })
            .map(|summary| (summary.accounts, summary.last_commodity_for_account))
    }

    /// Commodities in first-seen order.
    pub fn commodities(&self) -> Result<Vec<String>, Error> {
        self.tracer
            .time("commodities", || self.with_worker(Self::cache_summary))
            .map(|summary| summary.all_commodities)
    }

    /// Balances of the accounts matching `filter`.
    pub fn balance(&self, filter: &str) -> Result<Balances, Error> {
        self.with_worker(|slot| match slot.worker.request(Request::Balance(filter.to_string()))? {
            Reply::Balance(balances) => Ok(balances),
            Reply::Failed(e) => Err(e),
            reply => Err(unexpected(reply)),
        })
    }

    fn add_text(path: &Path, lines: &[impl AsRef<str>]) -> Result<(), Error> {
        let text = lines
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .and_then(|mut file| file.write_all(text.as_bytes()))
            .map_err(|e| Error::io(&path.display().to_string(), &e))
    }

    /// Appends `lines`, joined by newlines, to the journal.
    pub fn add_text_to_file(&self, lines: &[impl AsRef<str>]) -> Result<(), Error> {
        Self::add_text(self.path(), lines)
    }

    /// Appends `lines`, joined by newlines, to the price file.
    pub fn add_text_to_price_file(&self, lines: &[impl AsRef<str>]) -> Result<(), Error> {
        let path = self.price_path().ok_or_else(|| {
            Error::new(
                ErrorType::Config,
                "no price file is configured",
                Source::whole(self.internal.lexer.file().clone()),
            )
        })?;
        Self::add_text(path, lines)
    }
}
