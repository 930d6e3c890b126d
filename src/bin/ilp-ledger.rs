use std::fs::File;

use anyhow::{Context, Result};
use ilp_ledger::{
    bin_utils::Service, engine::LedgerInfo, money::CurrencyCode, processor::LedgerProcessError,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // stdout carries the balances, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let filename = args
        .next()
        .context("Expected a file name as the first argument")?;
    let ledger_name = args.next().unwrap_or_else(|| "test".to_string());
    let currency = args.next().unwrap_or_else(|| "EUR".to_string());
    let currency = CurrencyCode::new(&currency)
        .with_context(|| format!("Invalid ledger currency `{currency}`"))?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        ledger: LedgerInfo::new(ledger_name, currency),
        error_printer: Box::new(|line: u64, err: LedgerProcessError| {
            match err {
                LedgerProcessError::CommandErr(err) => eprintln!("Error at line {line}: {err}"),
                LedgerProcessError::DirectoryErr(err) => eprintln!("Error at line {line}: {err}"),
                LedgerProcessError::TransferErr(_) => {
                    // rejected transfers are logged by the engine already
                }
            }
        }),
    };
    service.run()
}
