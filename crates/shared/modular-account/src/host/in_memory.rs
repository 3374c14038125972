use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::{Revert, SolError};
use tracing::trace;

use super::{CallContext, CallResult, Host};
use crate::{
    account::{AccountCheckpoint, SmartAccount},
    error::AccountError,
    module::Module,
};

/// Code reachable through [`InMemoryHost`] calls.
pub trait Contract {
    /// Handles one call frame.
    fn call(&self, host: &InMemoryHost, frame: &Frame, data: &Bytes) -> CallResult;
}

/// The execution frame a [`Contract`] runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Address whose storage and balance the code operates on.
    pub address: Address,
    /// The immediate caller.
    pub sender: Address,
    /// Value attached to the call.
    pub value: U256,
    /// Writes are rejected in static frames.
    pub is_static: bool,
}

#[derive(Debug, Clone, Default)]
struct WorldState {
    balances: HashMap<Address, U256>,
    storage: HashMap<(Address, B256), B256>,
}

/// Single-threaded in-memory world: balances, storage, code, contracts and modules.
///
/// Every call runs in its own frame. A frame that reverts discards every balance
/// and storage write made inside it, along with the registry changes and events
/// of every account deployed through [`InMemoryHost::deploy_account`].
#[derive(Default)]
pub struct InMemoryHost {
    state: RefCell<WorldState>,
    accounts: RefCell<Vec<Weak<SmartAccount<Self>>>>,
    contracts: RefCell<HashMap<Address, Rc<dyn Contract>>>,
    modules: RefCell<HashMap<Address, Rc<dyn Module>>>,
    code: RefCell<HashMap<Address, Bytes>>,
    timestamp: Cell<u64>,
}

impl fmt::Debug for InMemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryHost")
            .field("accounts", &self.accounts.borrow().len())
            .field("contracts", &self.contracts.borrow().len())
            .field("modules", &self.modules.borrow().len())
            .field("timestamp", &self.timestamp.get())
            .finish_non_exhaustive()
    }
}

fn revert(reason: &str) -> Bytes {
    Revert { reason: reason.to_string() }.abi_encode().into()
}

impl InMemoryHost {
    /// Creates an empty world at timestamp zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `contract` callable at `address`.
    pub fn deploy(&self, address: Address, contract: Rc<dyn Contract>) {
        self.contracts.borrow_mut().insert(address, contract);
    }

    /// Deploys `account` at its own address so it can be called, including by itself.
    /// Its registry joins the world state rolled back by reverted frames.
    pub fn deploy_account(&self, account: &Rc<SmartAccount<Self>>) {
        self.accounts.borrow_mut().push(Rc::downgrade(account));
        self.deploy(account.address(), Rc::new(AccountContract(Rc::downgrade(account))));
    }

    /// Makes `module` resolvable at `address`.
    pub fn register_module(&self, address: Address, module: Rc<dyn Module>) {
        self.modules.borrow_mut().insert(address, module);
    }

    /// Replaces the code stored at `address`.
    pub fn set_code(&self, address: Address, code: Bytes) {
        self.code.borrow_mut().insert(address, code);
    }

    /// Sets the balance of `address`.
    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.borrow_mut().balances.insert(address, balance);
    }

    /// Returns the balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.state.borrow().balances.get(&address).copied().unwrap_or_default()
    }

    /// Sets the block timestamp.
    pub fn set_timestamp(&self, timestamp: u64) {
        self.timestamp.set(timestamp);
    }

    /// Moves the block timestamp forward.
    pub fn advance(&self, seconds: u64) {
        self.timestamp.set(self.timestamp.get().saturating_add(seconds));
    }

    /// Reads a storage slot of `address`.
    pub fn sload(&self, address: Address, slot: B256) -> B256 {
        self.state.borrow().storage.get(&(address, slot)).copied().unwrap_or_default()
    }

    /// Writes a storage slot of the frame's address.
    pub fn sstore(&self, frame: &Frame, slot: B256, value: B256) -> CallResult {
        if frame.is_static {
            return Err(revert("state change during static call"));
        }
        self.state.borrow_mut().storage.insert((frame.address, slot), value);
        Ok(Bytes::new())
    }

    fn contract(&self, address: Address) -> Option<Rc<dyn Contract>> {
        self.contracts.borrow().get(&address).cloned()
    }

    fn transfer(&self, from: Address, to: Address, value: U256) -> Result<(), Bytes> {
        if value.is_zero() {
            return Ok(());
        }
        let mut state = self.state.borrow_mut();
        let from_balance = state.balances.get(&from).copied().unwrap_or_default();
        let remaining =
            from_balance.checked_sub(value).ok_or_else(|| revert("insufficient balance"))?;
        state.balances.insert(from, remaining);
        let to_balance = state.balances.entry(to).or_default();
        *to_balance = to_balance.saturating_add(value);
        Ok(())
    }

    fn run_frame(&self, code: Address, frame: Frame, data: &Bytes) -> CallResult {
        let snapshot = self.snapshot();
        let result = self.transfer(frame.sender, frame.address, frame.value).and_then(|()| {
            match self.contract(code) {
                Some(contract) => contract.call(self, &frame, data),
                None => Ok(Bytes::new()),
            }
        });
        if result.is_err() || frame.is_static {
            self.restore(snapshot);
        }
        trace!(
            target: "modular-account",
            code = %code,
            address = %frame.address,
            sender = %frame.sender,
            success = result.is_ok(),
            "Call frame finished"
        );
        result
    }
}

impl Host for InMemoryHost {
    type Snapshot = WorldStateSnapshot;

    fn timestamp(&self) -> u64 {
        self.timestamp.get()
    }

    fn code(&self, address: Address) -> Bytes {
        self.code.borrow().get(&address).cloned().unwrap_or_default()
    }

    fn module(&self, address: Address) -> Option<Rc<dyn Module>> {
        self.modules.borrow().get(&address).cloned()
    }

    fn call(&self, caller: Address, target: Address, value: U256, data: &Bytes) -> CallResult {
        let frame = Frame { address: target, sender: caller, value, is_static: false };
        self.run_frame(target, frame, data)
    }

    fn static_call(&self, caller: Address, target: Address, data: &Bytes) -> CallResult {
        let frame = Frame { address: target, sender: caller, value: U256::ZERO, is_static: true };
        self.run_frame(target, frame, data)
    }

    fn delegate_call(&self, account: Address, target: Address, data: &Bytes) -> CallResult {
        let frame =
            Frame { address: account, sender: account, value: U256::ZERO, is_static: false };
        self.run_frame(target, frame, data)
    }

    fn snapshot(&self) -> Self::Snapshot {
        let accounts = self
            .accounts
            .borrow()
            .iter()
            .filter_map(|weak| weak.upgrade().map(|account| (weak.clone(), account.checkpoint())))
            .collect();
        WorldStateSnapshot { world: self.state.borrow().clone(), accounts }
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        *self.state.borrow_mut() = snapshot.world;
        for (account, checkpoint) in snapshot.accounts {
            if let Some(account) = account.upgrade() {
                account.revert_to(checkpoint);
            }
        }
    }
}

/// Captured balances, storage and deployed account registries of an [`InMemoryHost`].
#[derive(Debug, Clone)]
pub struct WorldStateSnapshot {
    world: WorldState,
    accounts: Vec<(Weak<SmartAccount<InMemoryHost>>, AccountCheckpoint)>,
}

/// Routes calls addressed to an account into [`SmartAccount::dispatch`].
#[derive(Debug)]
pub struct AccountContract(pub Weak<SmartAccount<InMemoryHost>>);

impl Contract for AccountContract {
    fn call(&self, _host: &InMemoryHost, frame: &Frame, data: &Bytes) -> CallResult {
        let Some(account) = self.0.upgrade() else {
            return Ok(Bytes::new());
        };
        if frame.is_static && !account.is_read_only_call(data) {
            return Err(revert("state change during static call"));
        }
        account
            .dispatch(CallContext::new(frame.sender, frame.value), data)
            .map_err(AccountError::into_revert_data)
    }
}
