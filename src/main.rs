#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use is_terminal::IsTerminal as _;
use onlyargs::CliError;
use onlyargs_derive::OnlyArgs;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::{env, process::ExitCode};
use taxlots::basis::{Matched, TaxLotMatcher};
use taxlots::errors::{CandleDbError, ConfigError, EntryError, ImportError, MatchError};
use taxlots::errors::{ResolverError, TranslateError};
use taxlots::imports::read_transactions;
use taxlots::model::{AccountLog, AssetType, CandleCache, Entry, RunConfig, Stats};
use taxlots::model::{TransactionEntry as _, SCOPE_ALL};
use taxlots::processors::{Chronological, CostUnitTranslator, GroupingEngine};
use taxlots::processors::{MultiExchangeAccounting, Processor};
use taxlots::resolver::Resolver;
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

const DEFAULT_PATH_CONFIG: &str = "taxlots.ron";
const DEFAULT_PATH_EXCHANGE_RATES_DB: &str = "./references/exchange-rates-db/";

#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - RUST_LOG sets the log filter, e.g. `debug` or `taxlots::basis=trace`"]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Read the run configuration (RON) from a file.
    ///   Default is "taxlots.ron".
    config: Option<PathBuf>,

    /// Read normalized transactions CSV from a file.
    #[long]
    input_transactions: Vec<PathBuf>,

    /// Override default OHLC Exchange Rates database directory.
    ///   Default is "./references/exchange-rates-db/".
    exchange_rates_db: Option<PathBuf>,

    /// Enable verbose output.
    /// Prints every pairing and ledger snapshot to stdout.
    verbose: bool,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("Unable to read configuration {0:?}")]
    Config(PathBuf, #[source] ConfigError),

    #[error("Unable to load ExchangeRates DataBase")]
    ExchangeRatesDb(#[from] CandleDbError),

    #[error("Invalid resolver configuration")]
    Resolver(#[from] ResolverError),

    #[error("Failed to import {0:?}")]
    Import(PathBuf, #[source] ImportError),

    #[error("Cost unit translation error")]
    Translate(#[from] TranslateError),

    #[error("Ledger error")]
    Ledger(#[from] EntryError),

    #[error("Tax lot matching error")]
    Match(#[from] MatchError),
}

fn main() -> ExitCode {
    // Initialize the tracing subscriber for instrumentation.
    // Uses the `RUST_LOG` environment var for configuration. E.g. `RUST_LOG=debug cargo run`
    //
    // See: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/struct.EnvFilter.html#directives
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(term_color))
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PATH_CONFIG));
    let config = RunConfig::from_path(&config_path)
        .map_err(|err| Error::Config(config_path.clone(), err))?;
    let expressions = config
        .expressions()
        .map_err(|err| Error::Config(config_path, err))?;

    let mut stats = Stats::default();

    // Candles are always visible to their own exchange, plus any configured scopes.
    let scopes: Vec<&str> = config.candle_scopes.iter().map(String::as_str).collect();
    let mut cache = CandleCache::new();
    let db_path = args
        .exchange_rates_db
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PATH_EXCHANGE_RATES_DB));
    debug!("Loading candles from {db_path:?}");
    cache.load_dir(&db_path, &scopes)?;
    stats.set_candles(cache.len());

    let mut resolver = Resolver::new(cache);
    resolver.add_translations(expressions)?;

    let mut sorter = Chronological::new(config.numbered_exchanges.clone());
    for path in args.input_transactions {
        let rows = read_transactions(&mut stats, &path).map_err(|e| Error::Import(path, e))?;
        sorter
            .process_many(rows)
            .unwrap_or_else(|never| match never {});
    }
    let transactions = sorter.flush();
    if transactions.is_empty() {
        warn!("No transactions to process");
    }

    let mut translator = CostUnitTranslator::new(&resolver, config.price_source);
    translator.track(config.tracked_assets.iter().cloned());
    translator.process_many(transactions)?;

    let mut grouping = GroupingEngine::new(config.group_window());
    grouping
        .process_many(translator.flush().into_iter().map(Entry::from))
        .unwrap_or_else(|never| match never {});
    let groups: Vec<Entry> = grouping.flush().into_iter().map(Entry::from).collect();
    stats.set_grouped_entries(groups.len());

    let mut accounting = MultiExchangeAccounting::new();
    accounting.process_many(groups.iter().cloned())?;
    let ledgers = accounting.flush();
    let ledger = ledgers
        .get(&config.ledger_exchange)
        .map(Vec::as_slice)
        .unwrap_or_default();
    stats.set_ledger_entries(ledger.len());

    let mut matcher = TaxLotMatcher::new();
    matcher.process_many(groups)?;
    let matched = matcher.flush();
    stats.set_matched(matched.pairs.len(), matched.unpaired.len());

    if args.verbose {
        print_ledger(&config.ledger_exchange, ledger);
        print_pairs(&matched, &config.tracked_assets);
    }
    print_balances(&ledgers);
    print_unpaired(&matched);

    stats.pretty_print();

    Ok(())
}

fn print_ledger(exchange: &str, ledger: &[AccountLog]) {
    let title = format!("Ledger {exchange}");
    println!("{title}");
    println!("{}", "=".repeat(title.len()));
    println!();

    for log in ledger {
        let balances = log
            .balances()
            .iter()
            .map(|(asset, amount)| format!("{asset}={amount}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{} {} {:>8} {balances}", log.time(), log.id(), log.side());
    }
    println!();
}

fn print_pairs(matched: &Matched, tracked: &[AssetType]) {
    println!("Buy/Sell Pairs");
    println!("======== =====");
    println!();

    for pair in &matched.pairs {
        println!(
            "{} {} sold {} {} covered by {} lots",
            pair.time(),
            pair.id(),
            pair.size(),
            pair.pair(),
            pair.buys().lots().len(),
        );

        for asset in tracked {
            let proceeds = pair.translated_total(asset);
            let basis = pair.buys().translated_total(asset);

            match (proceeds, basis) {
                (Some(proceeds), Some(basis)) => {
                    let gain = proceeds + basis;
                    println!("  {asset}: proceeds {proceeds}, basis {basis}, gain {gain}");
                }
                _ => println!("  {asset}: not translated"),
            }
        }
    }
    println!();
}

fn print_balances(ledgers: &BTreeMap<String, Vec<AccountLog>>) {
    println!("Closing Balances");
    println!("======= ========");
    println!();

    for (exchange, ledger) in ledgers {
        let Some(last) = ledger.last() else {
            continue;
        };
        let marker = if exchange == SCOPE_ALL { " (total)" } else { "" };

        println!("{exchange}{marker}");
        for (asset, amount) in last.balances() {
            println!("  {asset:>6} {amount}");
        }
    }
    println!();
}

fn print_unpaired(matched: &Matched) {
    if matched.unpaired.is_empty() {
        return;
    }

    println!("Unpaired Lots");
    println!("======== ====");
    println!();

    for lot in &matched.unpaired {
        println!(
            "{} {} {} {} {}",
            lot.time(),
            lot.id(),
            lot.side(),
            lot.size(),
            lot.pair(),
        );
    }
    println!();
}
