use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::money::Amount;

pub type TransferId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    pub id: TransferId,
}

/// A requested movement of value. Built by the caller and consumed once by
/// [`crate::engine::TransferEngine::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub header: TransferHeader,
    /// Name or local address of the source account.
    pub from: String,
    /// Address of the destination account, e.g. `bob@test`.
    pub destination: String,
    pub amount: Amount,
}

impl Transfer {
    pub fn new(
        id: TransferId,
        from: impl Into<String>,
        destination: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self {
            header: TransferHeader { id },
            from: from.into(),
            destination: destination.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectedReason {
    RejectedByReceiver,
    Timeout,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown rejection reason `{0}`")]
pub struct UnknownReason(pub String);

impl FromStr for RejectedReason {
    type Err = UnknownReason;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rejected_by_receiver" => Ok(Self::RejectedByReceiver),
            "timeout" => Ok(Self::Timeout),
            other => Err(UnknownReason(other.to_string())),
        }
    }
}

impl fmt::Display for RejectedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectedReason::RejectedByReceiver => f.write_str("rejected_by_receiver"),
            RejectedReason::Timeout => f.write_str("timeout"),
        }
    }
}

/// Condition fulfillment as produced by the receiver of a conditional transfer.
/// Opaque to this ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfillment(pub Vec<u8>);
