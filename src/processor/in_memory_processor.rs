use std::sync::Arc;

use crate::{
    account::{Account, AccountDirectory, InMemoryAccountDirectory},
    command::{CommandRecord, LedgerCommand},
    engine::{LedgerInfo, TransferEngine},
};

use super::{LedgerProcessError, LedgerProcessor};

pub struct InMemoryLedgerProcessor {
    directory: Arc<InMemoryAccountDirectory>,
    engine: TransferEngine,
}

impl InMemoryLedgerProcessor {
    pub fn new(info: LedgerInfo) -> Self {
        let directory = Arc::new(InMemoryAccountDirectory::new());
        let engine = TransferEngine::new(info, directory.clone());
        Self { directory, engine }
    }

    pub fn engine(&self) -> &TransferEngine {
        &self.engine
    }

    /// All accounts, sorted by name.
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        self.directory.accounts()
    }
}

impl LedgerProcessor for InMemoryLedgerProcessor {
    fn process_record(&self, record: CommandRecord) -> Result<(), LedgerProcessError> {
        match LedgerCommand::parse_command(record)? {
            LedgerCommand::OpenAccount(account) => {
                self.directory.add_account(account)?;
            }
            LedgerCommand::Send(transfer) => self.engine.send(&transfer)?,
        };
        Ok(())
    }
}
