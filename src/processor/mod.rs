use thiserror::Error;

use crate::{
    account::DirectoryError,
    command::{CommandRecord, LedgerCommandError},
    engine::TransferError,
};

pub mod in_memory_processor;

#[derive(Debug, Error)]
pub enum LedgerProcessError {
    #[error(transparent)]
    CommandErr(#[from] LedgerCommandError),
    #[error(transparent)]
    DirectoryErr(#[from] DirectoryError),
    #[error(transparent)]
    TransferErr(#[from] TransferError),
}

pub trait LedgerProcessor {
    fn process_record(&self, record: CommandRecord) -> Result<(), LedgerProcessError>;
}
