use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    account::{Account, AccountDirectory, AccountError, AccountGuard},
    address::{AddressError, LedgerAddress},
    dispatcher::{DispatchReport, EventDispatcher, EventHandler},
    event::{ConnectionEvent, LedgerEvent, TransferEvent},
    money::{Amount, CurrencyCode, MoneyError},
    transfer::{Fulfillment, RejectedReason, Transfer},
};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Account `{0}` not found")]
    AccountNotFound(String),
    #[error("Source and destination resolve to the same account `{0}`")]
    SameAccount(String),
    #[error(transparent)]
    Currency(#[from] MoneyError),
    #[error("Insufficient funds in `{account}`: balance {balance}, required {required}")]
    InsufficientFunds {
        account: String,
        balance: Decimal,
        required: Decimal,
    },
    #[error("Transfer amount must be positive, got {0}")]
    InvalidAmount(Amount),
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error("`{operation}` is not implemented by this ledger")]
    NotImplemented { operation: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerInfo {
    pub name: String,
    pub currency: CurrencyCode,
}

impl LedgerInfo {
    pub fn new(name: impl Into<String>, currency: CurrencyCode) -> Self {
        Self {
            name: name.into(),
            currency,
        }
    }
}

/// Executes transfers between accounts of one ledger and reports the outcome
/// to the registered event handlers.
///
/// Each transfer locks only the two accounts it touches, so transfers between
/// disjoint pairs of accounts run in parallel.
pub struct TransferEngine {
    info: LedgerInfo,
    directory: Arc<dyn AccountDirectory>,
    dispatcher: EventDispatcher,
    connected: AtomicBool,
    // Held across the state change and its dispatch, so listeners see
    // connection events in the order the state changed.
    transition: Mutex<()>,
}

impl TransferEngine {
    pub fn new(info: LedgerInfo, directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            info,
            directory,
            dispatcher: EventDispatcher::new(),
            connected: AtomicBool::new(false),
            transition: Mutex::new(()),
        }
    }

    pub fn info(&self) -> &LedgerInfo {
        &self.info
    }

    pub fn directory(&self) -> &Arc<dyn AccountDirectory> {
        &self.directory
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn register_handler(&self, handler: Arc<dyn EventHandler>) {
        self.dispatcher.register_handler(handler);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Marks the ledger connected and emits `Connected`.
    /// Nothing is emitted when it already was.
    ///
    /// Handlers must not call `connect` or `disconnect` themselves, the
    /// transition lock is held while they run.
    pub fn connect(&self) -> DispatchReport {
        let _transition = self.transition.lock();
        if self.connected.swap(true, Ordering::AcqRel) {
            return DispatchReport::default();
        }
        self.dispatcher.dispatch(&LedgerEvent::Connected(self.connection_event()))
    }

    pub fn disconnect(&self) -> DispatchReport {
        let _transition = self.transition.lock();
        if !self.connected.swap(false, Ordering::AcqRel) {
            return DispatchReport::default();
        }
        self.dispatcher
            .dispatch(&LedgerEvent::Disconnected(self.connection_event()))
    }

    fn connection_event(&self) -> ConnectionEvent {
        ConnectionEvent {
            ledger: self.info.name.clone(),
        }
    }

    /// Moves `transfer.amount` from the source to the destination account and
    /// emits `DirectTransferExecuted`.
    ///
    /// On error nothing has been mutated and no event was emitted. Once the
    /// balances are updated the transfer stays committed, whatever the handlers
    /// do with the event.
    pub fn send(&self, transfer: &Transfer) -> Result<(), TransferError> {
        self.execute(transfer).inspect_err(|err| {
            tracing::warn!(
                ledger = %self.info.name,
                id = transfer.header.id,
                from = %transfer.from,
                to = %transfer.destination,
                "Transfer failed: {err}"
            );
        })
    }

    fn execute(&self, transfer: &Transfer) -> Result<(), TransferError> {
        if transfer.amount.value <= Decimal::ZERO {
            return Err(TransferError::InvalidAmount(transfer.amount.clone()));
        }
        let from = self.resolve(&transfer.from)?;
        let to = self.resolve(&transfer.destination)?;
        if Arc::ptr_eq(&from, &to) {
            return Err(TransferError::SameAccount(from.name().to_string()));
        }

        let amount = transfer.amount.to_ledger_currency(&self.info.currency)?;
        for account in [&from, &to] {
            if account.currency() != &self.info.currency {
                return Err(MoneyError::CurrencyMismatch {
                    expected: self.info.currency.clone(),
                    actual: account.currency().clone(),
                }
                .into());
            }
        }

        {
            let (mut from_guard, mut to_guard) = lock_pair(&from, &to);
            let balance = from_guard.balance();
            if balance < amount {
                return Err(TransferError::InsufficientFunds {
                    account: from.name().to_string(),
                    balance,
                    required: amount,
                });
            }
            // Credit first: it is the only side that can still fail, and the
            // debit cannot once the funds check passed.
            to_guard.credit(amount)?;
            from_guard.debit(amount)?;
        }
        tracing::info!(
            ledger = %self.info.name,
            id = transfer.header.id,
            from = from.name(),
            to = to.name(),
            %amount,
            "Transfer committed"
        );

        let event = LedgerEvent::DirectTransferExecuted(TransferEvent {
            ledger: self.info.name.clone(),
            header: transfer.header,
            from: transfer.from.clone(),
            to: transfer.destination.clone(),
            amount: transfer.amount.clone(),
        });
        self.dispatcher.dispatch(&event);
        Ok(())
    }

    /// Resolves a local account name or address through the directory.
    /// Addresses of other ledgers never resolve.
    fn resolve(&self, address: &str) -> Result<Arc<Account>, TransferError> {
        let address = LedgerAddress::parse(address)?;
        if !address.is_local_to(&self.info.name) {
            return Err(TransferError::AccountNotFound(address.to_string()));
        }
        self.directory
            .account_by_name(&address.account)
            .ok_or_else(|| TransferError::AccountNotFound(address.to_string()))
    }

    /// Reads the balances of several accounts as one consistent snapshot.
    ///
    /// Locks are taken in the same order `send` takes them, so no transfer can be
    /// observed half applied.
    pub fn balances(&self, accounts: &[&str]) -> Result<Vec<Decimal>, TransferError> {
        let resolved = accounts
            .iter()
            .map(|name| self.resolve(name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut order: Vec<usize> = (0..resolved.len()).collect();
        order.sort_by(|&a, &b| lock_key(&resolved[a]).cmp(&lock_key(&resolved[b])));

        // Equal accounts sit next to each other in `order`; each is locked once.
        let mut guards: Vec<AccountGuard<'_>> = Vec::with_capacity(order.len());
        let mut snapshot = vec![Decimal::ZERO; resolved.len()];
        let mut previous: Option<usize> = None;
        for &index in &order {
            match previous {
                Some(prev) if Arc::ptr_eq(&resolved[prev], &resolved[index]) => {
                    snapshot[index] = snapshot[prev];
                }
                _ => {
                    let guard = resolved[index].lock();
                    snapshot[index] = guard.balance();
                    guards.push(guard);
                }
            }
            previous = Some(index);
        }
        drop(guards);
        Ok(snapshot)
    }

    /// Rejecting conditional transfers belongs to the interledger layer.
    pub fn reject_transfer(
        &self,
        _transfer: &Transfer,
        _reason: RejectedReason,
    ) -> Result<(), TransferError> {
        Err(TransferError::NotImplemented {
            operation: "reject_transfer",
        })
    }

    /// Condition fulfillment belongs to the interledger layer.
    pub fn fulfill_condition(&self, _fulfillment: &Fulfillment) -> Result<(), TransferError> {
        Err(TransferError::NotImplemented {
            operation: "fulfill_condition",
        })
    }
}

fn lock_key(account: &Arc<Account>) -> (&str, *const Account) {
    (account.name(), Arc::as_ptr(account))
}

/// Locks two distinct accounts in a global order to rule out deadlocks between
/// opposite transfers. Returns `(from, to)` guards.
fn lock_pair<'a>(
    from: &'a Arc<Account>,
    to: &'a Arc<Account>,
) -> (AccountGuard<'a>, AccountGuard<'a>) {
    if lock_key(from) < lock_key(to) {
        let from_guard = from.lock();
        (from_guard, to.lock())
    } else {
        let to_guard = to.lock();
        (from.lock(), to_guard)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use rust_decimal::prelude::FromPrimitive;

    use crate::{
        account::InMemoryAccountDirectory,
        event::{EventKind, RejectedTransferEvent},
    };

    use super::*;

    #[derive(Default)]
    struct EventLog {
        events: Mutex<Vec<(EventKind, Option<TransferEvent>)>>,
    }

    impl EventLog {
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().iter().map(|(kind, _)| *kind).collect()
        }
    }

    impl EventHandler for EventLog {
        fn on_connected(&self, _: &ConnectionEvent) -> bool {
            self.events.lock().push((EventKind::Connected, None));
            true
        }
        fn on_disconnected(&self, _: &ConnectionEvent) -> bool {
            self.events.lock().push((EventKind::Disconnected, None));
            true
        }
        fn on_transfer_prepared(&self, evt: &TransferEvent) -> bool {
            self.events
                .lock()
                .push((EventKind::TransferPrepared, Some(evt.clone())));
            true
        }
        fn on_transfer_executed(&self, evt: &TransferEvent) -> bool {
            self.events
                .lock()
                .push((EventKind::TransferExecuted, Some(evt.clone())));
            true
        }
        fn on_direct_transfer_executed(&self, evt: &TransferEvent) -> bool {
            self.events
                .lock()
                .push((EventKind::DirectTransferExecuted, Some(evt.clone())));
            true
        }
        fn on_transfer_rejected(&self, evt: &RejectedTransferEvent) -> bool {
            self.events
                .lock()
                .push((EventKind::TransferRejected, Some(evt.transfer.clone())));
            true
        }
    }

    fn eur() -> CurrencyCode {
        CurrencyCode::new("EUR").unwrap()
    }

    fn eur_amount(value: u32) -> Amount {
        Amount::new(Decimal::from_u32(value).unwrap(), eur())
    }

    fn setup() -> (TransferEngine, Arc<EventLog>) {
        let directory = Arc::new(InMemoryAccountDirectory::new());
        for name in ["alice", "bob"] {
            directory
                .add_account(Account::new(name, eur(), Decimal::from_u32(100).unwrap()))
                .unwrap();
        }
        let engine = TransferEngine::new(LedgerInfo::new("test", eur()), directory);
        let log = Arc::new(EventLog::default());
        engine.register_handler(log.clone());
        (engine, log)
    }

    fn balances(engine: &TransferEngine) -> Vec<Decimal> {
        engine.balances(&["alice", "bob"]).unwrap()
    }

    #[test]
    fn send_moves_funds_and_emits_event() {
        let (engine, log) = setup();
        engine
            .send(&Transfer::new(1, "alice", "bob@test", eur_amount(10)))
            .unwrap();

        assert_eq!(
            balances(&engine),
            [Decimal::from_u32(90).unwrap(), Decimal::from_u32(110).unwrap()]
        );
        let events = log.events.lock();
        assert_eq!(events.len(), 1);
        let (kind, Some(evt)) = &events[0] else {
            panic!("expected a transfer event");
        };
        assert_eq!(*kind, EventKind::DirectTransferExecuted);
        assert_eq!(evt.ledger, "test");
        assert_eq!(evt.header.id, 1);
        assert_eq!(evt.from, "alice");
        assert_eq!(evt.to, "bob@test");
        assert_eq!(evt.amount, eur_amount(10));
    }

    #[test]
    fn send_whole_balance() {
        let (engine, _) = setup();
        engine
            .send(&Transfer::new(1, "alice", "bob", eur_amount(100)))
            .unwrap();
        assert_eq!(
            balances(&engine),
            [Decimal::ZERO, Decimal::from_u32(200).unwrap()]
        );
    }

    #[test]
    fn same_account_is_rejected() {
        let (engine, log) = setup();
        let err = engine
            .send(&Transfer::new(1, "alice", "alice@test", eur_amount(1)))
            .unwrap_err();
        assert!(matches!(&err, TransferError::SameAccount(name) if name == "alice"));
        assert_eq!(balances(&engine), [Decimal::from_u32(100).unwrap(); 2]);
        assert!(log.kinds().is_empty());
    }

    #[test]
    fn insufficient_funds_mutates_nothing() {
        let (engine, log) = setup();
        let err = engine
            .send(&Transfer::new(1, "alice", "bob@test", eur_amount(101)))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient funds in `alice`: balance 100, required 101"
        );
        assert_eq!(balances(&engine), [Decimal::from_u32(100).unwrap(); 2]);
        assert!(log.kinds().is_empty());
    }

    #[test]
    fn missing_accounts() {
        let (engine, log) = setup();
        let err = engine
            .send(&Transfer::new(1, "carol", "bob@test", eur_amount(1)))
            .unwrap_err();
        assert!(matches!(&err, TransferError::AccountNotFound(name) if name == "carol"));

        let err = engine
            .send(&Transfer::new(2, "alice", "carol@test", eur_amount(1)))
            .unwrap_err();
        assert!(matches!(&err, TransferError::AccountNotFound(name) if name == "carol@test"));

        // bob exists, but not on the ledger the address points to
        let err = engine
            .send(&Transfer::new(3, "alice", "bob@other", eur_amount(1)))
            .unwrap_err();
        assert!(matches!(&err, TransferError::AccountNotFound(name) if name == "bob@other"));

        let err = engine
            .send(&Transfer::new(4, "alice", "bob@", eur_amount(1)))
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAddress(_)));

        assert_eq!(balances(&engine), [Decimal::from_u32(100).unwrap(); 2]);
        assert!(log.kinds().is_empty());
    }

    #[test]
    fn currency_mismatch() {
        let (engine, _) = setup();
        let usd = Amount::new(Decimal::ONE, CurrencyCode::new("USD").unwrap());
        let err = engine
            .send(&Transfer::new(1, "alice", "bob", usd))
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Currency(MoneyError::CurrencyMismatch { .. })
        ));

        engine
            .directory()
            .add_account(Account::new(
                "dave",
                CurrencyCode::new("USD").unwrap(),
                Decimal::from_u32(100).unwrap(),
            ))
            .unwrap();
        let err = engine
            .send(&Transfer::new(2, "alice", "dave", eur_amount(1)))
            .unwrap_err();
        assert_eq!(err.to_string(), "Currency mismatch: ledger uses EUR, got USD");
        assert_eq!(balances(&engine), [Decimal::from_u32(100).unwrap(); 2]);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let (engine, _) = setup();
        for value in [Decimal::ZERO, Decimal::from_i32(-5).unwrap()] {
            let err = engine
                .send(&Transfer::new(1, "alice", "bob", Amount::new(value, eur())))
                .unwrap_err();
            assert!(matches!(err, TransferError::InvalidAmount(_)));
        }
        // the amount is checked before any account is looked up
        let err = engine
            .send(&Transfer::new(2, "carol", "bob", Amount::new(Decimal::ZERO, eur())))
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidAmount(_)));
        assert_eq!(balances(&engine), [Decimal::from_u32(100).unwrap(); 2]);
    }

    #[test]
    fn credit_overflow_rolls_nothing_forward() {
        let directory = Arc::new(InMemoryAccountDirectory::new());
        directory
            .add_account(Account::new("alice", eur(), Decimal::ONE))
            .unwrap();
        directory
            .add_account(Account::new("bob", eur(), Decimal::MAX))
            .unwrap();
        let engine = TransferEngine::new(LedgerInfo::new("test", eur()), directory);
        let log = Arc::new(EventLog::default());
        engine.register_handler(log.clone());

        let err = engine
            .send(&Transfer::new(1, "alice", "bob", eur_amount(1)))
            .unwrap_err();
        assert!(matches!(
            &err,
            TransferError::Account(AccountError::BalanceOverflow { account }) if account == "bob"
        ));
        assert_eq!(balances(&engine), [Decimal::ONE, Decimal::MAX]);
        assert!(log.kinds().is_empty());
    }

    struct PanickingHandler;

    impl EventHandler for PanickingHandler {
        fn on_connected(&self, _: &ConnectionEvent) -> bool {
            false
        }
        fn on_disconnected(&self, _: &ConnectionEvent) -> bool {
            false
        }
        fn on_transfer_prepared(&self, _: &TransferEvent) -> bool {
            false
        }
        fn on_transfer_executed(&self, _: &TransferEvent) -> bool {
            false
        }
        fn on_direct_transfer_executed(&self, _: &TransferEvent) -> bool {
            panic!("handler failed");
        }
        fn on_transfer_rejected(&self, _: &RejectedTransferEvent) -> bool {
            false
        }
    }

    #[test]
    fn handler_panic_keeps_transfer_committed() {
        let (engine, _) = setup();
        engine.register_handler(Arc::new(PanickingHandler));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.send(&Transfer::new(1, "alice", "bob", eur_amount(10)))
        }));
        assert!(result.is_err());
        assert_eq!(
            balances(&engine),
            [Decimal::from_u32(90).unwrap(), Decimal::from_u32(110).unwrap()]
        );
    }

    #[test]
    fn decimal_amounts_are_exact() {
        let (engine, _) = setup();
        for id in 0..10 {
            engine
                .send(&Transfer::new(id, "alice", "bob", Amount::new(Decimal::new(1, 1), eur())))
                .unwrap();
        }
        assert_eq!(
            balances(&engine),
            [Decimal::from_u32(99).unwrap(), Decimal::from_u32(101).unwrap()]
        );
    }

    #[test]
    fn stubbed_operations_fail() {
        let (engine, log) = setup();
        let transfer = Transfer::new(1, "alice", "bob", eur_amount(1));
        let err = engine
            .reject_transfer(&transfer, RejectedReason::Timeout)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "`reject_transfer` is not implemented by this ledger"
        );
        let err = engine
            .fulfill_condition(&Fulfillment(vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::NotImplemented {
                operation: "fulfill_condition"
            }
        ));
        assert!(log.kinds().is_empty());
    }

    #[test]
    fn connect_and_disconnect_emit_once() {
        let (engine, log) = setup();
        assert!(!engine.is_connected());
        assert_eq!(engine.connect().notified, 1);
        assert_eq!(engine.connect().notified, 0);
        assert!(engine.is_connected());
        assert_eq!(engine.disconnect().notified, 1);
        assert_eq!(engine.disconnect().notified, 0);
        assert_eq!(log.kinds(), [EventKind::Connected, EventKind::Disconnected]);
    }

    #[test]
    fn concurrent_connection_events_alternate() {
        let (engine, log) = setup();
        std::thread::scope(|s| {
            for _ in 0..4 {
                let engine = &engine;
                s.spawn(move || {
                    for _ in 0..200 {
                        engine.connect();
                        engine.disconnect();
                    }
                });
            }
        });

        let kinds = log.kinds();
        assert!(!kinds.is_empty());
        for (i, kind) in kinds.iter().enumerate() {
            let expected = if i % 2 == 0 {
                EventKind::Connected
            } else {
                EventKind::Disconnected
            };
            assert_eq!(*kind, expected, "event {i} of {kinds:?}");
        }
        assert_eq!(kinds.last(), Some(&EventKind::Disconnected));
        assert!(!engine.is_connected());
    }

    #[test]
    fn balances_snapshot() {
        let (engine, _) = setup();
        assert_eq!(
            engine.balances(&["bob", "alice@test", "bob"]).unwrap(),
            [Decimal::from_u32(100).unwrap(); 3]
        );
        engine
            .send(&Transfer::new(1, "alice", "bob", eur_amount(10)))
            .unwrap();
        let (alice, bob) = (Decimal::from_u32(90).unwrap(), Decimal::from_u32(110).unwrap());
        assert_eq!(
            engine
                .balances(&["bob", "alice", "bob@test", "alice"])
                .unwrap(),
            [bob, alice, bob, alice]
        );
        assert!(engine.balances(&[]).unwrap().is_empty());
        assert!(matches!(
            engine.balances(&["alice", "zoe"]),
            Err(TransferError::AccountNotFound(_))
        ));
    }

    #[test]
    fn opposite_transfers_do_not_deadlock() {
        let (engine, _) = setup();
        std::thread::scope(|s| {
            for (from, to) in [("alice", "bob"), ("bob", "alice")] {
                let engine = &engine;
                s.spawn(move || {
                    for id in 0..500 {
                        // may run dry depending on interleaving, that's fine
                        let _ = engine.send(&Transfer::new(id, from, to, eur_amount(1)));
                    }
                });
            }
        });
        let balances = balances(&engine);
        assert_eq!(balances[0] + balances[1], Decimal::from_u32(200).unwrap());
        assert!(balances.iter().all(|b| *b >= Decimal::ZERO));
    }
}
