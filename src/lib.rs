/// Exact decimal amounts and currency codes.
pub mod money;

/// `account@ledger` addresses.
pub mod address;

/// Accounts with per-account locking, and the directory the ledger looks them up in.
pub mod account;

/// Transfer requests, plus the types of the conditional operations this ledger
/// does not implement.
pub mod transfer;

/// The closed set of ledger events and their untyped wire form.
pub mod event;

/// Routes every event to the typed callback of each registered handler.
pub mod dispatcher;

/// Executes transfers under the balance invariant and emits the outcome event.
pub mod engine;

/// Commands parsed from a batch input, executed by [`processor`].
pub mod command;

/// Command processor interface, plus "in memory" implementation.
///
/// NOTE: the trait is the integration point for swapping the in-memory
/// directory for a real account store.
pub mod processor;

/// Bootstraps the ledger for the binary. Lives in the library so integration
/// tests can drive it too.
pub mod bin_utils;
