use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use parking_lot::{Mutex, MutexGuard, RwLock};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::CurrencyCode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Account `{0}` already exists")]
    DuplicateAccount(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Balance of `{account}` would overflow")]
    BalanceOverflow { account: String },
}

#[derive(Debug)]
pub struct Account {
    name: String,
    currency: CurrencyCode,
    balance: Mutex<Decimal>,
}

impl Account {
    pub fn new(name: impl Into<String>, currency: CurrencyCode, balance: Decimal) -> Self {
        Self {
            name: name.into(),
            currency,
            balance: Mutex::new(balance),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn balance(&self) -> Decimal {
        *self.balance.lock()
    }

    /// Takes the account's exclusive lock. Blocks while another guard is alive.
    pub fn lock(&self) -> AccountGuard<'_> {
        AccountGuard {
            name: &self.name,
            balance: self.balance.lock(),
        }
    }
}

/// Exclusive access to one account balance.
pub struct AccountGuard<'a> {
    name: &'a str,
    balance: MutexGuard<'a, Decimal>,
}

impl AccountGuard<'_> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn balance(&self) -> Decimal {
        *self.balance
    }

    // No overdraft check here, callers decide what is allowed.
    pub fn debit(&mut self, amount: Decimal) -> Result<(), AccountError> {
        self.apply(self.balance.checked_sub(amount))
    }

    pub fn credit(&mut self, amount: Decimal) -> Result<(), AccountError> {
        self.apply(self.balance.checked_add(amount))
    }

    /// The balance is left untouched when the result does not fit.
    fn apply(&mut self, updated: Option<Decimal>) -> Result<(), AccountError> {
        *self.balance = updated.ok_or_else(|| AccountError::BalanceOverflow {
            account: self.name.to_string(),
        })?;
        Ok(())
    }
}

/// Lookup and registration of the accounts a ledger hosts.
///
/// The engine only ever reads accounts through this trait, it never creates or
/// destroys them itself.
pub trait AccountDirectory: Send + Sync {
    fn account_by_name(&self, name: &str) -> Option<Arc<Account>>;

    fn add_account(&self, account: Account) -> Result<Arc<Account>, DirectoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<HashMap<String, Arc<Account>>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }

    /// All accounts, sorted by name.
    pub fn accounts(&self) -> Vec<Arc<Account>> {
        let mut accounts: Vec<_> = self.accounts.read().values().cloned().collect();
        accounts.sort_by(|a, b| a.name().cmp(b.name()));
        accounts
    }
}

impl AccountDirectory for InMemoryAccountDirectory {
    fn account_by_name(&self, name: &str) -> Option<Arc<Account>> {
        self.accounts.read().get(name).cloned()
    }

    fn add_account(&self, account: Account) -> Result<Arc<Account>, DirectoryError> {
        match self.accounts.write().entry(account.name.clone()) {
            Entry::Occupied(entry) => Err(DirectoryError::DuplicateAccount(entry.key().clone())),
            Entry::Vacant(entry) => Ok(entry.insert(Arc::new(account)).clone()),
        }
    }
}
