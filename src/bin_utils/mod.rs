//! Batch front-end for [`ilp_ledger`](crate): runs a CSV command stream through an
//! in-memory ledger and prints the final balances.

use std::{
    io::{Read, Write},
    sync::Arc,
};

use crate::{
    dispatcher::LoggingEventHandler,
    engine::LedgerInfo,
    processor::{
        LedgerProcessError, LedgerProcessor, in_memory_processor::InMemoryLedgerProcessor,
    },
};
use anyhow::Result;
use csv_parser::CsvCommandParser;
use csv_printer::{AccountBalance, print_balances};
pub mod csv_parser;
pub mod csv_printer;

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub ledger: LedgerInfo,
    pub error_printer: Box<dyn FnMut(u64, LedgerProcessError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub fn run(mut self) -> Result<()> {
        let parser = CsvCommandParser::new(self.input);

        let processor = InMemoryLedgerProcessor::new(self.ledger);
        processor
            .engine()
            .register_handler(Arc::new(LoggingEventHandler::new()));
        processor.engine().connect();

        for (line, row) in parser {
            let record = match row {
                Ok(record) => record,
                Err(err) => anyhow::bail!("Failed to parse line {line}: {err}"),
            };
            if let Err(err) = processor.process_record(record) {
                (self.error_printer)(line, err);
            }
        }

        processor.engine().disconnect();

        print_balances(
            self.output,
            processor.accounts().iter().map(|acc| AccountBalance {
                account: acc.name().to_string(),
                currency: acc.currency().to_string(),
                balance: acc.balance(),
            }),
        )
    }
}
