use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::event::{
    ConnectionEvent, EventDecodeError, LedgerEvent, RawLedgerEvent, RejectedTransferEvent,
    TransferEvent, UnrecognizedEvent,
};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unhandled event: {0}")]
pub struct UnhandledEventError(pub UnrecognizedEvent);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Unhandled(#[from] UnhandledEventError),
    #[error("Malformed event: {0}")]
    Malformed(#[from] EventDecodeError),
}

/// Listener for ledger events, one callback per [`LedgerEvent`] variant.
///
/// The returned `bool` tells whether the handler acted on the event. It is
/// advisory only: every registered handler receives every event.
pub trait EventHandler: Send + Sync {
    fn on_connected(&self, event: &ConnectionEvent) -> bool;

    fn on_disconnected(&self, event: &ConnectionEvent) -> bool;

    fn on_transfer_prepared(&self, event: &TransferEvent) -> bool;

    fn on_transfer_executed(&self, event: &TransferEvent) -> bool;

    fn on_direct_transfer_executed(&self, event: &TransferEvent) -> bool;

    fn on_transfer_rejected(&self, event: &RejectedTransferEvent) -> bool;

    /// Called for an event whose kind is outside the known set.
    ///
    /// Fails by default, since it means producer and consumer disagree on the
    /// protocol version. Override to log and carry on instead.
    fn on_unhandled(&self, event: &UnrecognizedEvent) -> Result<bool, UnhandledEventError> {
        Err(UnhandledEventError(event.clone()))
    }
}

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers invoked.
    pub notified: usize,
    /// Handlers that reported the event as handled.
    pub handled: usize,
}

type HandlerList = Arc<Vec<Arc<dyn EventHandler>>>;

/// Ordered registry of [`EventHandler`]s.
///
/// Registration swaps in a new list, so a dispatch in progress keeps iterating
/// the snapshot it started with.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<HandlerList>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler`. Registering the same handler twice notifies it twice.
    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write();
        Arc::make_mut(&mut *handlers).push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn snapshot(&self) -> HandlerList {
        self.handlers.read().clone()
    }

    pub fn dispatch(&self, event: &LedgerEvent) -> DispatchReport {
        let handlers = self.snapshot();
        let mut report = DispatchReport::default();
        for handler in handlers.iter() {
            tracing::debug!(ledger = event.ledger(), %event, "About to handle ledger event");
            let handled = match event {
                LedgerEvent::Connected(evt) => handler.on_connected(evt),
                LedgerEvent::Disconnected(evt) => handler.on_disconnected(evt),
                LedgerEvent::TransferPrepared(evt) => handler.on_transfer_prepared(evt),
                LedgerEvent::TransferExecuted(evt) => handler.on_transfer_executed(evt),
                LedgerEvent::DirectTransferExecuted(evt) => {
                    handler.on_direct_transfer_executed(evt)
                }
                LedgerEvent::TransferRejected(evt) => handler.on_transfer_rejected(evt),
            };
            tracing::debug!(ledger = event.ledger(), %event, handled, "Handled ledger event");
            report.notified += 1;
            report.handled += usize::from(handled);
        }
        report
    }

    /// Decodes `raw` and dispatches it.
    ///
    /// An unknown kind goes to every handler's [`EventHandler::on_unhandled`]; the
    /// first handler that refuses it stops the dispatch.
    pub fn dispatch_raw(&self, raw: RawLedgerEvent) -> Result<DispatchReport, DispatchError> {
        match LedgerEvent::try_from(raw) {
            Ok(event) => Ok(self.dispatch(&event)),
            Err(EventDecodeError::Unrecognized(event)) => self.dispatch_unrecognized(&event),
            Err(err) => Err(err.into()),
        }
    }

    fn dispatch_unrecognized(
        &self,
        event: &UnrecognizedEvent,
    ) -> Result<DispatchReport, DispatchError> {
        let handlers = self.snapshot();
        let mut report = DispatchReport::default();
        for handler in handlers.iter() {
            match handler.on_unhandled(event) {
                Ok(handled) => {
                    report.notified += 1;
                    report.handled += usize::from(handled);
                }
                Err(err) => {
                    tracing::warn!(
                        ledger = %event.ledger,
                        kind = %event.kind,
                        "Unhandled ledger event"
                    );
                    return Err(err.into());
                }
            }
        }
        Ok(report)
    }
}

/// Logs every event it receives.
#[derive(Debug, Default)]
pub struct LoggingEventHandler {
    tolerate_unknown: bool,
}

impl LoggingEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log unknown event kinds at warn level instead of failing the dispatch.
    pub fn tolerating_unknown_events(mut self) -> Self {
        self.tolerate_unknown = true;
        self
    }
}

impl EventHandler for LoggingEventHandler {
    fn on_connected(&self, event: &ConnectionEvent) -> bool {
        tracing::info!(ledger = %event.ledger, "Ledger connected");
        true
    }

    fn on_disconnected(&self, event: &ConnectionEvent) -> bool {
        tracing::info!(ledger = %event.ledger, "Ledger disconnected");
        true
    }

    fn on_transfer_prepared(&self, event: &TransferEvent) -> bool {
        log_transfer("Transfer prepared", event);
        true
    }

    fn on_transfer_executed(&self, event: &TransferEvent) -> bool {
        log_transfer("Transfer executed", event);
        true
    }

    fn on_direct_transfer_executed(&self, event: &TransferEvent) -> bool {
        log_transfer("Direct transfer executed", event);
        true
    }

    fn on_transfer_rejected(&self, event: &RejectedTransferEvent) -> bool {
        tracing::info!(
            ledger = %event.transfer.ledger,
            id = event.transfer.header.id,
            reason = %event.reason,
            "Transfer rejected"
        );
        true
    }

    fn on_unhandled(&self, event: &UnrecognizedEvent) -> Result<bool, UnhandledEventError> {
        if self.tolerate_unknown {
            tracing::warn!(
                ledger = %event.ledger,
                kind = %event.kind,
                "Ignoring unknown ledger event"
            );
            Ok(false)
        } else {
            Err(UnhandledEventError(event.clone()))
        }
    }
}

fn log_transfer(message: &'static str, event: &TransferEvent) {
    tracing::info!(
        ledger = %event.ledger,
        id = event.header.id,
        from = %event.from,
        to = %event.to,
        amount = %event.amount,
        "{message}"
    );
}
