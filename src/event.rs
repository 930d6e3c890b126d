use std::fmt;

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    money::{Amount, CurrencyCode, MoneyError},
    transfer::{RejectedReason, TransferHeader, TransferId, UnknownReason},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Connected,
    Disconnected,
    TransferPrepared,
    TransferExecuted,
    DirectTransferExecuted,
    TransferRejected,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::TransferPrepared,
        EventKind::TransferExecuted,
        EventKind::DirectTransferExecuted,
        EventKind::TransferRejected,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::TransferPrepared => "transfer_prepared",
            EventKind::TransferExecuted => "transfer_executed",
            EventKind::DirectTransferExecuted => "direct_transfer_executed",
            EventKind::TransferRejected => "transfer_rejected",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub ledger: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub ledger: String,
    pub header: TransferHeader,
    pub from: String,
    pub to: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedTransferEvent {
    pub transfer: TransferEvent,
    pub reason: RejectedReason,
}

/// State transitions a ledger reports to its listeners.
///
/// The set is closed: every dispatch site matches on it exhaustively, so a new
/// variant has to be handled everywhere before the crate compiles again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    Connected(ConnectionEvent),
    Disconnected(ConnectionEvent),
    TransferPrepared(TransferEvent),
    TransferExecuted(TransferEvent),
    DirectTransferExecuted(TransferEvent),
    TransferRejected(RejectedTransferEvent),
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::Connected(_) => EventKind::Connected,
            LedgerEvent::Disconnected(_) => EventKind::Disconnected,
            LedgerEvent::TransferPrepared(_) => EventKind::TransferPrepared,
            LedgerEvent::TransferExecuted(_) => EventKind::TransferExecuted,
            LedgerEvent::DirectTransferExecuted(_) => EventKind::DirectTransferExecuted,
            LedgerEvent::TransferRejected(_) => EventKind::TransferRejected,
        }
    }

    /// Identity of the ledger that emitted the event.
    pub fn ledger(&self) -> &str {
        match self {
            LedgerEvent::Connected(evt) | LedgerEvent::Disconnected(evt) => &evt.ledger,
            LedgerEvent::TransferPrepared(evt)
            | LedgerEvent::TransferExecuted(evt)
            | LedgerEvent::DirectTransferExecuted(evt) => &evt.ledger,
            LedgerEvent::TransferRejected(evt) => &evt.transfer.ledger,
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEvent::Connected(evt) | LedgerEvent::Disconnected(evt) => {
                write!(f, "{}[ledger={}]", self.kind(), evt.ledger)
            }
            LedgerEvent::TransferPrepared(evt)
            | LedgerEvent::TransferExecuted(evt)
            | LedgerEvent::DirectTransferExecuted(evt) => write!(
                f,
                "{}[ledger={}, id={}, from={}, to={}, amount={}]",
                self.kind(),
                evt.ledger,
                evt.header.id,
                evt.from,
                evt.to,
                evt.amount
            ),
            LedgerEvent::TransferRejected(evt) => write!(
                f,
                "{}[ledger={}, id={}, reason={}]",
                self.kind(),
                evt.transfer.ledger,
                evt.transfer.header.id,
                evt.reason
            ),
        }
    }
}

/// An event record as produced outside this crate, before its tag is checked
/// against the closed [`LedgerEvent`] set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawLedgerEvent {
    pub kind: String,
    pub ledger: String,
    pub id: Option<TransferId>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub reason: Option<String>,
}

/// A raw event whose tag is not one of the known variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedEvent {
    pub kind: String,
    pub ledger: String,
}

impl fmt::Display for UnrecognizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[ledger={}]", self.kind, self.ledger)
    }
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("Unrecognized event `{0}`")]
    Unrecognized(UnrecognizedEvent),
    #[error("Field `{field}` is required for {kind} events")]
    MissingField { kind: EventKind, field: &'static str },
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Reason(#[from] UnknownReason),
}

impl RawLedgerEvent {
    fn transfer_event(&self, kind: EventKind) -> Result<TransferEvent, EventDecodeError> {
        let missing = |field| EventDecodeError::MissingField { kind, field };
        let id = self.id.ok_or_else(|| missing("id"))?;
        let from = self.from.clone().ok_or_else(|| missing("from"))?;
        let to = self.to.clone().ok_or_else(|| missing("to"))?;
        let value = self.amount.ok_or_else(|| missing("amount"))?;
        let currency = self.currency.as_deref().ok_or_else(|| missing("currency"))?;
        Ok(TransferEvent {
            ledger: self.ledger.clone(),
            header: TransferHeader { id },
            from,
            to,
            amount: Amount::new(value, CurrencyCode::new(currency)?),
        })
    }
}

impl TryFrom<RawLedgerEvent> for LedgerEvent {
    type Error = EventDecodeError;

    fn try_from(raw: RawLedgerEvent) -> Result<Self, Self::Error> {
        let Some(kind) = EventKind::from_tag(raw.kind.trim()) else {
            return Err(EventDecodeError::Unrecognized(UnrecognizedEvent {
                kind: raw.kind,
                ledger: raw.ledger,
            }));
        };
        let connection = || ConnectionEvent {
            ledger: raw.ledger.clone(),
        };
        Ok(match kind {
            EventKind::Connected => LedgerEvent::Connected(connection()),
            EventKind::Disconnected => LedgerEvent::Disconnected(connection()),
            EventKind::TransferPrepared => LedgerEvent::TransferPrepared(raw.transfer_event(kind)?),
            EventKind::TransferExecuted => LedgerEvent::TransferExecuted(raw.transfer_event(kind)?),
            EventKind::DirectTransferExecuted => {
                LedgerEvent::DirectTransferExecuted(raw.transfer_event(kind)?)
            }
            EventKind::TransferRejected => {
                let reason: RejectedReason = raw
                    .reason
                    .as_deref()
                    .ok_or(EventDecodeError::MissingField {
                        kind,
                        field: "reason",
                    })?
                    .parse()?;
                LedgerEvent::TransferRejected(RejectedTransferEvent {
                    transfer: raw.transfer_event(kind)?,
                    reason,
                })
            }
        })
    }
}
