use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Address is empty")]
    Empty,
    #[error("Address `{0}` has no account part")]
    MissingAccount(String),
    #[error("Address `{0}` has no ledger part after `@`")]
    MissingLedger(String),
    #[error("Address `{0}` contains more than one `@`")]
    TooManySeparators(String),
}

/// `account@ledger`, or a bare `account` meaning the local ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAddress {
    pub account: String,
    pub ledger: Option<String>,
}

impl LedgerAddress {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }
        let mut parts = input.split('@');
        let account = parts.next().unwrap_or_default();
        let ledger = parts.next();
        if parts.next().is_some() {
            return Err(AddressError::TooManySeparators(input.to_string()));
        }
        if account.is_empty() {
            return Err(AddressError::MissingAccount(input.to_string()));
        }
        match ledger {
            Some("") => Err(AddressError::MissingLedger(input.to_string())),
            ledger => Ok(Self {
                account: account.to_string(),
                ledger: ledger.map(ToOwned::to_owned),
            }),
        }
    }

    pub fn is_local_to(&self, ledger_name: &str) -> bool {
        self.ledger.as_deref().is_none_or(|ledger| ledger == ledger_name)
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ledger {
            Some(ledger) => write!(f, "{}@{}", self.account, ledger),
            None => f.write_str(&self.account),
        }
    }
}
