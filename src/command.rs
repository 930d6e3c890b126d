use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    account::Account,
    money::{Amount, CurrencyCode, MoneyError},
    transfer::{Transfer, TransferId},
};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Open,
    Transfer,
}

/// One row of a command stream, `type,id,account,destination,amount,currency`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    pub id: Option<TransferId>,
    pub account: String,
    pub destination: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum LedgerCommandError {
    #[error("Field `{field}` is required for {kind:?}")]
    FieldRequired {
        kind: RecordKind,
        field: &'static str,
    },
    #[error("Opening balance must not be negative for account `{0}`")]
    NegativeBalance(String),
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[derive(Debug)]
pub enum LedgerCommand {
    OpenAccount(Account),
    Send(Transfer),
}

impl LedgerCommand {
    pub fn parse_command(record: CommandRecord) -> Result<Self, LedgerCommandError> {
        let kind = record.kind;
        let required = |field| LedgerCommandError::FieldRequired { kind, field };
        let amount = record.amount.ok_or_else(|| required("amount"))?;
        let currency = CurrencyCode::new(&record.currency)?;
        match kind {
            RecordKind::Open => {
                if amount < Decimal::ZERO {
                    return Err(LedgerCommandError::NegativeBalance(record.account));
                }
                Ok(Self::OpenAccount(Account::new(
                    record.account,
                    currency,
                    amount,
                )))
            }
            RecordKind::Transfer => {
                let id = record.id.ok_or_else(|| required("id"))?;
                let destination = record.destination.ok_or_else(|| required("destination"))?;
                Ok(Self::Send(Transfer::new(
                    id,
                    record.account,
                    destination,
                    Amount::new(amount, currency),
                )))
            }
        }
    }
}
