use clap::{Parser, Subcommand};
use ledgerhelpers::clear::clear_transactions;
use ledgerhelpers::config::{find_ledger_price_file, LedgerFiles};
use ledgerhelpers::diffing::{DiffViewer, Meld};
use ledgerhelpers::journal::Journal;
use ledgerhelpers::parse::LedgerLexer;
use ledgerhelpers::sort::sort_transactions;
use ledgerhelpers::utils::replace_file;
use ledgerhelpers::{Date, Error};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");

#[derive(Debug, Parser)]
#[command(
    name = "ledgerhelpers",
    about = "Helpers for plain-text ledger files.",
    version = VERSION,
    author = AUTHOR,
)]
struct Cli {
    /// The ledger file; defaults to LEDGER_FILE or ~/.ledgerrc.
    #[arg(short)]
    file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Lex the whole file and report the first error.
    Check,
    /// List payees in the order they first appear.
    Payees,
    /// List accounts with the commodity last used with each.
    Accounts,
    /// Print balances of accounts matching a filter.
    Balance {
        #[arg(default_value = "")]
        filter: String,
    },
    /// Sort transactions in the file chronologically.
    Sort {
        /// Show lexing mismatches in a diff tool.
        #[arg(long)]
        debug: bool,
        /// Record changes immediately, instead of showing a three-way diff
        /// for you to resolve.
        #[arg(short = 'y')]
        assume_yes: bool,
    },
    /// Mark uncleared transactions cleared.
    Clear {
        /// The clearing date; defaults to each transaction's own date.
        #[arg(long)]
        date: Option<Date>,
        /// Only clear transactions with this payee.
        #[arg(long)]
        payee: Option<String>,
    },
}

fn read(path: &PathBuf) -> Result<String, Error> {
    std::fs::read_to_string(path).map_err(|e| Error::io(&path.display().to_string(), &e))
}

fn check(path: &PathBuf) -> Result<(), Error> {
    let tokens = LedgerLexer::new(path.display().to_string()).lex_with_context(&read(path)?)?;
    let transactions = tokens.iter().filter(|t| t.is_transaction()).count();
    println!("{}: {} tokens, {} transactions", path.display(), tokens.len(), transactions);
    Ok(())
}

fn sort(path: &PathBuf, debug: bool, assume_yes: bool) -> Result<(), Error> {
    let meld = Arc::new(Meld::default());
    let mut lexer = LedgerLexer::new(path.display().to_string());
    if debug {
        lexer = lexer.with_diff_viewer(meld.clone());
    }
    let left = read(path)?;
    let right: String = sort_transactions(lexer.lex_with_context(&left)?)
        .into_iter()
        .map(|token| token.into_contents())
        .collect();
    if left == right {
        log::info!("{} is already sorted", path.display());
        Ok(())
    } else if assume_yes {
        replace_file(path, &right)
    } else {
        meld.three_way_diff(path, &left, &right)
    }
}

fn clear(path: &PathBuf, date: Option<Date>, payee: Option<String>) -> Result<(), Error> {
    let tokens = LedgerLexer::new(path.display().to_string()).lex_with_context(&read(path)?)?;
    let (tokens, changed) = clear_transactions(tokens, |txn| {
        if payee.as_deref().map_or(false, |payee| payee != txn.payee().as_str()) {
            return None;
        }
        Some(date.unwrap_or_else(|| txn.secondary_date().unwrap_or(txn.date())))
    });
    if changed == 0 {
        log::info!("Nothing to clear in {}", path.display());
        return Ok(());
    }
    let text: String = tokens.into_iter().map(|token| token.into_contents()).collect();
    replace_file(path, &text)?;
    println!("{}: cleared {} transactions", path.display(), changed);
    Ok(())
}

fn files(file: Option<PathBuf>) -> Result<LedgerFiles, Error> {
    let discovered = LedgerFiles::discover();
    match (file, discovered) {
        (Some(journal), Ok(found)) => Ok(LedgerFiles {
            journal,
            price_db: found.price_db,
        }),
        (Some(journal), Err(_)) => Ok(LedgerFiles {
            journal,
            price_db: find_ledger_price_file()?,
        }),
        (None, discovered) => discovered,
    }
}

fn run(args: Cli) -> Result<(), Error> {
    let LedgerFiles { journal: path, price_db } = files(args.file)?;
    match args.command {
        Commands::Check => check(&path),
        Commands::Sort { debug, assume_yes } => sort(&path, debug, assume_yes),
        Commands::Clear { date, payee } => clear(&path, date, payee),
        Commands::Payees => {
            let journal = Journal::open(path, price_db)?;
            for payee in journal.all_payees()? {
                println!("{}", payee);
            }
            Ok(())
        }
        Commands::Accounts => {
            let journal = Journal::open(path, price_db)?;
            let (accounts, last_commodity) = journal.accounts_and_last_commodity_for_account()?;
            for account in accounts {
                match last_commodity.get(&account) {
                    Some(commodity) => println!("{} {}", account, commodity),
                    None => println!("{}", account),
                }
            }
            Ok(())
        }
        Commands::Balance { filter } => {
            let journal = Journal::open(path, price_db)?;
            for (account, amounts) in journal.balance(&filter)? {
                for (commodity, number) in amounts {
                    println!("{} {} {}", account, number, commodity);
                }
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
    }
}
