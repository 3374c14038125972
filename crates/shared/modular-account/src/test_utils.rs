//! Test utilities: mock modules, simple contracts and a ready-made account harness.

use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, keccak256};
use alloy_sol_types::{Revert, SolError};

use crate::{
    abi::{BootstrapConfig, BootstrapModule, PackedUserOperation},
    account::SmartAccount,
    config::AccountConfig,
    constants::{
        ENTRYPOINT_V07_ADDRESS, ERC1271_INVALID, ERC1271_MAGIC_VALUE, VALIDATION_FAILED,
        VALIDATION_SUCCESS,
    },
    host::{CallContext, CallResult, Contract, Frame, InMemoryHost},
    module::{Hook, Module, ModuleResult, PreValidationHook, Validator},
    types::ModuleType,
};

/// Address the harness account lives at.
pub const ACCOUNT: Address = Address::repeat_byte(0xaa);
/// Address of the configured default validator.
pub const DEFAULT_VALIDATOR: Address = Address::repeat_byte(0xd0);
/// Key of the configured default validator.
pub const DEFAULT_VALIDATOR_KEY: B256 = B256::repeat_byte(0xd1);
/// Address of the validator installed by [`TestAccount::initialized`].
pub const VALIDATOR: Address = Address::repeat_byte(0x10);
/// Key of the validator installed by [`TestAccount::initialized`].
pub const VALIDATOR_KEY: B256 = B256::repeat_byte(0x11);
/// Block timestamp the harness starts at.
pub const START_TIME: u64 = 1_700_000_000;

fn revert(reason: &str) -> Bytes {
    Revert { reason: reason.to_string() }.abi_encode().into()
}

/// Validator accepting `keccak256(key ‖ hash)` as the signature of `hash`.
///
/// An install with non-empty data marks the account as configured.
#[derive(Debug)]
pub struct MockValidator {
    key: B256,
    initialized: RefCell<HashSet<Address>>,
    fail_uninstall: Cell<bool>,
    revert_checks: Cell<bool>,
    erc7739_response: Cell<Option<FixedBytes<4>>>,
}

impl MockValidator {
    pub fn new(key: B256) -> Self {
        Self {
            key,
            initialized: RefCell::new(HashSet::new()),
            fail_uninstall: Cell::new(false),
            revert_checks: Cell::new(false),
            erc7739_response: Cell::new(None),
        }
    }

    /// Signs `hash` with this validator's key.
    pub fn sign(&self, hash: B256) -> Bytes {
        let mut preimage = [0u8; 64];
        preimage[..32].copy_from_slice(self.key.as_slice());
        preimage[32..].copy_from_slice(hash.as_slice());
        Bytes::copy_from_slice(keccak256(preimage).as_slice())
    }

    pub fn set_fail_uninstall(&self, fail: bool) {
        self.fail_uninstall.set(fail);
    }

    /// Makes every signature check revert.
    pub fn set_revert_checks(&self, revert: bool) {
        self.revert_checks.set(revert);
    }

    /// Response to the ERC-7739 support query.
    pub fn set_erc7739_response(&self, response: Option<FixedBytes<4>>) {
        self.erc7739_response.set(response);
    }
}

impl Module for MockValidator {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Validator
    }

    fn on_install(&self, account: Address, data: &Bytes) -> ModuleResult<()> {
        if !data.is_empty() {
            self.initialized.borrow_mut().insert(account);
        }
        Ok(())
    }

    fn on_uninstall(&self, account: Address, _data: &Bytes) -> ModuleResult<()> {
        if self.fail_uninstall.get() {
            return Err(revert("validator refuses uninstall"));
        }
        self.initialized.borrow_mut().remove(&account);
        Ok(())
    }

    fn is_initialized(&self, account: Address) -> bool {
        self.initialized.borrow().contains(&account)
    }

    fn as_validator(&self) -> Option<&dyn Validator> {
        Some(self)
    }
}

impl Validator for MockValidator {
    fn validate_user_op(
        &self,
        _account: Address,
        user_op: &PackedUserOperation,
        user_op_hash: B256,
    ) -> ModuleResult<U256> {
        if user_op.signature == self.sign(user_op_hash) {
            Ok(VALIDATION_SUCCESS)
        } else {
            Ok(VALIDATION_FAILED)
        }
    }

    fn is_valid_signature_with_sender(
        &self,
        _account: Address,
        _sender: Address,
        hash: B256,
        signature: &Bytes,
    ) -> ModuleResult<FixedBytes<4>> {
        if self.revert_checks.get() {
            return Err(revert("validator check reverted"));
        }
        if signature.is_empty() {
            return Ok(self.erc7739_response.get().unwrap_or(ERC1271_INVALID));
        }
        if *signature == self.sign(hash) {
            Ok(ERC1271_MAGIC_VALUE)
        } else {
            Ok(ERC1271_INVALID)
        }
    }
}

/// Hook recording every check it sees.
#[derive(Debug, Default)]
pub struct MockHook {
    pre_checks: RefCell<Vec<(Address, U256, Bytes)>>,
    post_checks: RefCell<Vec<Bytes>>,
    reject_pre_check: Cell<bool>,
    reject_post_check: Cell<bool>,
}

impl MockHook {
    /// `(sender, value, msg_data)` of every pre-check, oldest first.
    pub fn pre_checks(&self) -> Vec<(Address, U256, Bytes)> {
        self.pre_checks.borrow().clone()
    }

    /// Contexts handed to every post-check, oldest first.
    pub fn post_checks(&self) -> Vec<Bytes> {
        self.post_checks.borrow().clone()
    }

    pub fn reject_pre_check(&self, reject: bool) {
        self.reject_pre_check.set(reject);
    }

    pub fn reject_post_check(&self, reject: bool) {
        self.reject_post_check.set(reject);
    }
}

impl Module for MockHook {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Hook
    }

    fn on_install(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }

    fn on_uninstall(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }

    fn as_hook(&self) -> Option<&dyn Hook> {
        Some(self)
    }
}

impl Hook for MockHook {
    fn pre_check(
        &self,
        _account: Address,
        sender: Address,
        value: U256,
        msg_data: &Bytes,
    ) -> ModuleResult<Bytes> {
        if self.reject_pre_check.get() {
            return Err(revert("hook rejected call"));
        }
        let mut checks = self.pre_checks.borrow_mut();
        checks.push((sender, value, msg_data.clone()));
        Ok(Bytes::from(checks.len().to_be_bytes().to_vec()))
    }

    fn post_check(&self, _account: Address, context: &Bytes) -> ModuleResult<()> {
        if self.reject_post_check.get() {
            return Err(revert("hook rejected result"));
        }
        self.post_checks.borrow_mut().push(context.clone());
        Ok(())
    }
}

/// Pre-validation hook for both slots that replaces the hash with its keccak
/// and leaves the signature untouched.
#[derive(Debug, Default)]
pub struct MockPreValidationHook;

impl MockPreValidationHook {
    /// The hash a validator sees after this hook ran.
    pub fn rewrite(hash: B256) -> B256 {
        keccak256(hash)
    }
}

impl Module for MockPreValidationHook {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        matches!(module_type, ModuleType::PreValidationHook(_))
    }

    fn on_install(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }

    fn on_uninstall(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }

    fn as_pre_validation_hook(&self) -> Option<&dyn PreValidationHook> {
        Some(self)
    }
}

impl PreValidationHook for MockPreValidationHook {
    fn pre_validation_hook_erc4337(
        &self,
        _account: Address,
        user_op: &PackedUserOperation,
        _missing_account_funds: U256,
        user_op_hash: B256,
    ) -> ModuleResult<(B256, Bytes)> {
        Ok((Self::rewrite(user_op_hash), user_op.signature.clone()))
    }

    fn pre_validation_hook_erc1271(
        &self,
        _account: Address,
        _sender: Address,
        hash: B256,
        signature: &Bytes,
    ) -> ModuleResult<(B256, Bytes)> {
        Ok((Self::rewrite(hash), signature.clone()))
    }
}

/// Executor with no behavior of its own; tests call the account on its behalf.
#[derive(Debug, Default)]
pub struct MockExecutor {
    installs: Cell<usize>,
}

impl MockExecutor {
    pub fn installs(&self) -> usize {
        self.installs.get()
    }
}

impl Module for MockExecutor {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Executor
    }

    fn on_install(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        self.installs.set(self.installs.get() + 1);
        Ok(())
    }

    fn on_uninstall(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }
}

/// Fallback handler returning the ERC-2771 sender appended to its calldata.
#[derive(Debug, Default)]
pub struct MockFallbackHandler {
    calls: RefCell<Vec<Bytes>>,
}

impl MockFallbackHandler {
    /// Calldata of every call received, oldest first.
    pub fn calls(&self) -> Vec<Bytes> {
        self.calls.borrow().clone()
    }
}

impl Module for MockFallbackHandler {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        module_type == ModuleType::Fallback
    }

    fn on_install(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }

    fn on_uninstall(&self, _account: Address, _data: &Bytes) -> ModuleResult<()> {
        Ok(())
    }
}

impl Contract for MockFallbackHandler {
    fn call(&self, _host: &InMemoryHost, _frame: &Frame, data: &Bytes) -> CallResult {
        if data.len() < 20 {
            return Err(revert("missing sender"));
        }
        self.calls.borrow_mut().push(data.clone());
        Ok(data.slice(data.len() - 20..))
    }
}

/// Module declaring both the validator and the executor type.
#[derive(Debug)]
pub struct MockMultiTypeModule {
    validator: MockValidator,
    installs: RefCell<Vec<Bytes>>,
}

impl MockMultiTypeModule {
    pub fn new(key: B256) -> Self {
        Self { validator: MockValidator::new(key), installs: RefCell::new(Vec::new()) }
    }

    /// Payload of every install callback, oldest first.
    pub fn installs(&self) -> Vec<Bytes> {
        self.installs.borrow().clone()
    }
}

impl Module for MockMultiTypeModule {
    fn is_module_type(&self, module_type: ModuleType) -> bool {
        matches!(module_type, ModuleType::Validator | ModuleType::Executor)
    }

    fn on_install(&self, account: Address, data: &Bytes) -> ModuleResult<()> {
        self.installs.borrow_mut().push(data.clone());
        self.validator.on_install(account, data)
    }

    fn on_uninstall(&self, account: Address, data: &Bytes) -> ModuleResult<()> {
        self.validator.on_uninstall(account, data)
    }

    fn is_initialized(&self, account: Address) -> bool {
        self.validator.is_initialized(account)
    }

    fn as_validator(&self) -> Option<&dyn Validator> {
        Some(&self.validator)
    }
}

/// Increments storage slot zero and returns the new count.
#[derive(Debug, Default)]
pub struct Counter;

impl Counter {
    /// Current count stored at `address`.
    pub fn count(host: &InMemoryHost, address: Address) -> U256 {
        U256::from_be_bytes(host.sload(address, B256::ZERO).0)
    }
}

impl Contract for Counter {
    fn call(&self, host: &InMemoryHost, frame: &Frame, _data: &Bytes) -> CallResult {
        let count = Self::count(host, frame.address) + U256::from(1);
        host.sstore(frame, B256::ZERO, B256::from(count.to_be_bytes::<32>()))?;
        Ok(Bytes::copy_from_slice(&count.to_be_bytes::<32>()))
    }
}

/// Always reverts with `Error("reverted")`.
#[derive(Debug, Default)]
pub struct Reverter;

impl Reverter {
    pub fn reason() -> Bytes {
        revert("reverted")
    }
}

impl Contract for Reverter {
    fn call(&self, _host: &InMemoryHost, _frame: &Frame, _data: &Bytes) -> CallResult {
        Err(Self::reason())
    }
}

/// Returns its calldata.
#[derive(Debug, Default)]
pub struct Echo;

impl Contract for Echo {
    fn call(&self, _host: &InMemoryHost, _frame: &Frame, data: &Bytes) -> CallResult {
        Ok(data.clone())
    }
}

/// An account deployed on an [`InMemoryHost`] with a registered default
/// validator and a second validator ready to install.
#[derive(Debug)]
pub struct TestAccount {
    pub host: Rc<InMemoryHost>,
    pub account: Rc<SmartAccount<InMemoryHost>>,
    pub default_validator: Rc<MockValidator>,
    pub validator: Rc<MockValidator>,
    pub validator_address: Address,
}

impl Default for TestAccount {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAccount {
    /// A deployed but uninitialized account.
    pub fn new() -> Self {
        Self::with_config(AccountConfig::default())
    }

    /// A deployed but uninitialized account using `config` with the harness
    /// entry point and default validator.
    pub fn with_config(config: AccountConfig) -> Self {
        let host = Rc::new(InMemoryHost::new());
        host.set_timestamp(START_TIME);

        let default_validator = Rc::new(MockValidator::new(DEFAULT_VALIDATOR_KEY));
        host.register_module(DEFAULT_VALIDATOR, default_validator.clone());
        let validator = Rc::new(MockValidator::new(VALIDATOR_KEY));
        host.register_module(VALIDATOR, validator.clone());

        let config = config
            .with_entry_point(ENTRYPOINT_V07_ADDRESS)
            .with_default_validator(DEFAULT_VALIDATOR);
        let account = Rc::new(SmartAccount::new(ACCOUNT, config, host.clone()));
        host.deploy_account(&account);

        Self { host, account, default_validator, validator, validator_address: VALIDATOR }
    }

    /// An account initialized with [`VALIDATOR`] installed and configured.
    pub fn initialized() -> Self {
        let harness = Self::new();
        harness.initialize();
        harness
    }

    /// Runs `initializeAccount` installing [`VALIDATOR`].
    pub fn initialize(&self) {
        let bootstrap = BootstrapConfig {
            validators: vec![BootstrapModule {
                module: self.validator_address,
                data: Bytes::from_static(&[1]),
            }],
            ..Default::default()
        };
        self.account
            .initialize_account(self.entry_point(), &bootstrap)
            .expect("bootstrap must succeed");
    }

    /// A call from the EntryPoint.
    pub fn entry_point(&self) -> CallContext {
        CallContext::from_sender(self.account.config().entry_point)
    }

    /// A call from the account itself.
    pub fn self_call(&self) -> CallContext {
        CallContext::from_sender(self.account.address())
    }

    /// Registers `module` at `address` and returns the address.
    pub fn register<M: Module + 'static>(&self, address: Address, module: M) -> Address {
        self.host.register_module(address, Rc::new(module));
        address
    }

    /// Registers and deploys a [`MockFallbackHandler`] at `address`.
    pub fn register_fallback_handler(&self, address: Address) -> Address {
        let handler = Rc::new(MockFallbackHandler::default());
        self.host.register_module(address, handler.clone());
        self.host.deploy(address, handler);
        address
    }

    /// `validator ‖ signature` of [`VALIDATOR`] over `hash`.
    pub fn signature(&self, hash: B256) -> Bytes {
        [self.validator_address.as_slice(), &self.validator.sign(hash)[..]].concat().into()
    }
}
