//! The execution environment an account runs in.
//!
//! The account never touches other contracts directly. Calls, delegatecalls,
//! module lookups, code inspection and state snapshots all go through a [`Host`],
//! which lets the same account logic run against an in-memory world in tests and
//! against any other environment that can provide these primitives.

use std::rc::Rc;

use alloy_primitives::{Address, Bytes, U256};

use crate::module::Module;

mod in_memory;
pub use in_memory::{AccountContract, Contract, Frame, InMemoryHost, WorldStateSnapshot};

/// Outcome of a call: return data, or the raw revert payload.
pub type CallResult = Result<Bytes, Bytes>;

/// Caller and attached value of an account entry point invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// `msg.sender`
    pub sender: Address,
    /// `msg.value`
    pub value: U256,
}

impl CallContext {
    /// Creates a context with the given sender and value.
    pub const fn new(sender: Address, value: U256) -> Self {
        Self { sender, value }
    }

    /// Creates a context carrying no value.
    pub const fn from_sender(sender: Address) -> Self {
        Self { sender, value: U256::ZERO }
    }
}

/// Environment primitives an account needs.
pub trait Host {
    /// Opaque state snapshot restored when an account operation fails.
    type Snapshot;

    /// Current block timestamp.
    fn timestamp(&self) -> u64;

    /// Code deployed at `address`.
    fn code(&self, address: Address) -> Bytes;

    /// Resolves the module implementation deployed at `address`.
    fn module(&self, address: Address) -> Option<Rc<dyn Module>>;

    /// Performs a call from `caller` to `target`.
    fn call(&self, caller: Address, target: Address, value: U256, data: &Bytes) -> CallResult;

    /// Performs a read-only call from `caller` to `target`.
    fn static_call(&self, caller: Address, target: Address, data: &Bytes) -> CallResult;

    /// Runs `target`'s code in the context of `account`.
    fn delegate_call(&self, account: Address, target: Address, data: &Bytes) -> CallResult;

    /// Captures the current world state.
    fn snapshot(&self) -> Self::Snapshot;

    /// Reverts the world state to `snapshot`.
    fn restore(&self, snapshot: Self::Snapshot);
}
