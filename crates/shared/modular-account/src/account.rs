//! The account orchestrator.
//!
//! [`SmartAccount`] owns the module registry and routes every external entry
//! point to the registry, the validation pipeline or the execution dispatcher.
//! Each state-changing entry point is atomic: when it fails, the registry, the
//! recorded events and the host world state are all restored to what they were
//! before the call.

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::Rc,
};

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256};
use alloy_sol_types::{SolCall, SolInterface, SolValue};
use tracing::{debug, info};

use crate::{
    abi::{
        BootstrapConfig, EmergencyUninstall, IModularAccount, IModularAccount::IModularAccountCalls,
        PackedUserOperation,
    },
    config::AccountConfig,
    constants::{ACCOUNT_ID, VIEW_SELECTORS},
    delegation::is_eip7702_delegation,
    emergency::EmergencyUninstallStatus,
    error::{AccountError, AccountResult},
    events::AccountEvent,
    host::{CallContext, Host},
    module::Module,
    registry::AccountStorage,
    sentinel_list::Page,
    types::{CallType, ExecutionMode, FallbackHandler, ModuleType, PreValidationHookKind},
};

/// Module registry and event log position of a [`SmartAccount`] at one point in time.
#[derive(Debug, Clone)]
pub struct AccountCheckpoint {
    storage: AccountStorage,
    events: usize,
}

/// A modular smart account bound to a [`Host`].
#[derive(Debug)]
pub struct SmartAccount<H: Host> {
    address: Address,
    config: AccountConfig,
    host: Rc<H>,
    pub(crate) storage: RefCell<AccountStorage>,
    events: RefCell<Vec<AccountEvent>>,
}

impl<H: Host> SmartAccount<H> {
    /// Creates an uninitialized account living at `address`.
    pub fn new(address: Address, config: AccountConfig, host: Rc<H>) -> Self {
        Self {
            address,
            config,
            host,
            storage: RefCell::new(AccountStorage::default()),
            events: RefCell::new(Vec::new()),
        }
    }

    /// The account address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// The immutable account parameters.
    pub const fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// The host the account runs in.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Every event recorded by committed invocations, oldest first.
    pub fn events(&self) -> Vec<AccountEvent> {
        self.events.borrow().clone()
    }

    /// Returns true while the account code is an EIP-7702 delegation designator.
    pub fn is_delegated(&self) -> bool {
        is_eip7702_delegation(&self.host.code(self.address))
    }

    pub(crate) fn storage(&self) -> Ref<'_, AccountStorage> {
        self.storage.borrow()
    }

    pub(crate) fn storage_mut(&self) -> RefMut<'_, AccountStorage> {
        self.storage.borrow_mut()
    }

    pub(crate) fn emit(&self, event: AccountEvent) {
        debug!(target: "modular-account", event = ?event, "Account event");
        self.events.borrow_mut().push(event);
    }

    /// Resolves the module at `address`.
    pub(crate) fn resolve_module(&self, address: Address) -> AccountResult<Rc<dyn Module>> {
        self.host.module(address).ok_or(AccountError::InvalidModule(address))
    }

    /// Captures the module registry and the event log position.
    pub fn checkpoint(&self) -> AccountCheckpoint {
        AccountCheckpoint { storage: self.storage().clone(), events: self.events.borrow().len() }
    }

    /// Restores the module registry and drops events recorded after `checkpoint`.
    pub fn revert_to(&self, checkpoint: AccountCheckpoint) {
        *self.storage_mut() = checkpoint.storage;
        self.events.borrow_mut().truncate(checkpoint.events);
    }

    /// Runs `op` and rolls back every effect of it if it fails.
    pub(crate) fn atomic<T>(&self, op: impl FnOnce() -> AccountResult<T>) -> AccountResult<T> {
        let checkpoint = self.checkpoint();
        let world = self.host.snapshot();

        let result = op();
        if let Err(err) = &result {
            debug!(target: "modular-account", error = %err, "Rolling back failed invocation");
            self.revert_to(checkpoint);
            self.host.restore(world);
        }
        result
    }

    /// Returns true if handling `data` cannot change account state: view entry
    /// points, static fallback handlers and unhandled selectors.
    pub fn is_read_only_call(&self, data: &Bytes) -> bool {
        let Some(selector) = data.get(..4).and_then(|selector| <[u8; 4]>::try_from(selector).ok())
        else {
            return true;
        };
        if IModularAccountCalls::valid_selector(selector) {
            return VIEW_SELECTORS.contains(&selector);
        }
        self.fallback_handler(selector.into())
            .is_none_or(|entry| matches!(entry.call_type, CallType::Static))
    }

    fn only_entry_point(&self, ctx: CallContext) -> AccountResult<()> {
        if ctx.sender != self.config.entry_point {
            return Err(AccountError::AccountAccessUnauthorized(ctx.sender));
        }
        Ok(())
    }

    fn only_entry_point_or_self(&self, ctx: CallContext) -> AccountResult<()> {
        if ctx.sender != self.config.entry_point && ctx.sender != self.address {
            return Err(AccountError::AccountAccessUnauthorized(ctx.sender));
        }
        Ok(())
    }

    /// Installs the initial module set. Callable once by anyone.
    pub fn initialize_account(
        &self,
        ctx: CallContext,
        bootstrap: &BootstrapConfig,
    ) -> AccountResult<()> {
        self.atomic(|| {
            {
                let mut storage = self.storage_mut();
                if storage.initialized {
                    return Err(AccountError::AccountAlreadyInitialized);
                }
                storage.initialized = true;
                if !storage.validators.is_initialized() {
                    storage.validators.init()?;
                }
                if !storage.executors.is_initialized() {
                    storage.executors.init()?;
                }
            }

            if !bootstrap.defaultValidatorInitData.is_empty() {
                let validator = self.config.default_validator;
                self.resolve_module(validator)?
                    .on_install(self.address, &bootstrap.defaultValidatorInitData)
                    .map_err(|reason| AccountError::InstallCallbackFailed {
                        module: validator,
                        reason,
                    })?;
            }

            for validator in &bootstrap.validators {
                self.install_module_inner(
                    ModuleType::Validator.into(),
                    validator.module,
                    &validator.data,
                )?;
            }
            for executor in &bootstrap.executors {
                self.install_module_inner(
                    ModuleType::Executor.into(),
                    executor.module,
                    &executor.data,
                )?;
            }
            if !bootstrap.hook.module.is_zero() {
                self.install_module_inner(
                    ModuleType::Hook.into(),
                    bootstrap.hook.module,
                    &bootstrap.hook.data,
                )?;
            }
            for fallback in &bootstrap.fallbacks {
                self.install_module_inner(
                    ModuleType::Fallback.into(),
                    fallback.module,
                    &fallback.data,
                )?;
            }
            for hook in &bootstrap.preValidationHooks {
                match ModuleType::from_id(hook.hookType) {
                    Some(ModuleType::PreValidationHook(_)) => {
                        self.install_module_inner(hook.hookType, hook.module, &hook.data)?
                    }
                    _ => return Err(AccountError::InvalidModuleTypeId(hook.hookType)),
                }
            }

            if !self.has_initialized_validator() {
                return Err(AccountError::NoValidatorInstalled);
            }

            info!(
                target: "modular-account",
                account = %self.address,
                sender = %ctx.sender,
                validators = bootstrap.validators.len(),
                executors = bootstrap.executors.len(),
                "Account initialized"
            );
            Ok(())
        })
    }

    /// Validates a user operation and pays the EntryPoint what it is missing.
    pub fn validate_user_op(
        &self,
        ctx: CallContext,
        user_op: &PackedUserOperation,
        user_op_hash: B256,
        missing_account_funds: U256,
    ) -> AccountResult<U256> {
        self.only_entry_point(ctx)?;
        self.atomic(|| {
            let validation_data =
                self.validate_user_op_inner(user_op, user_op_hash, missing_account_funds)?;
            if !missing_account_funds.is_zero() {
                // The EntryPoint checks the deposit itself.
                let _ =
                    self.host.call(self.address, ctx.sender, missing_account_funds, &Bytes::new());
            }
            Ok(validation_data)
        })
    }

    /// Executes calls as the EntryPoint or the account itself.
    pub fn execute(
        &self,
        ctx: CallContext,
        mode: ExecutionMode,
        execution_calldata: &Bytes,
    ) -> AccountResult<Vec<Bytes>> {
        self.only_entry_point_or_self(ctx)?;
        let msg_data = IModularAccount::executeCall {
            mode: mode.raw(),
            executionCalldata: execution_calldata.clone(),
        }
        .abi_encode()
        .into();
        self.atomic(|| {
            self.with_hook(ctx, &msg_data, || self.execute_with_mode(mode, execution_calldata))
        })
    }

    /// Executes calls on behalf of an installed executor.
    pub fn execute_from_executor(
        &self,
        ctx: CallContext,
        mode: ExecutionMode,
        execution_calldata: &Bytes,
    ) -> AccountResult<Vec<Bytes>> {
        if !self.storage().executors.contains(ctx.sender) {
            return Err(AccountError::ExecutorNotInstalled(ctx.sender));
        }
        let msg_data = IModularAccount::executeFromExecutorCall {
            mode: mode.raw(),
            executionCalldata: execution_calldata.clone(),
        }
        .abi_encode()
        .into();
        self.atomic(|| {
            self.with_hook(ctx, &msg_data, || self.execute_with_mode(mode, execution_calldata))
        })
    }

    /// Installs `module` under `module_type_id`.
    pub fn install_module(
        &self,
        ctx: CallContext,
        module_type_id: U256,
        module: Address,
        init_data: &Bytes,
    ) -> AccountResult<()> {
        self.only_entry_point_or_self(ctx)?;
        let msg_data = IModularAccount::installModuleCall {
            moduleTypeId: module_type_id,
            module,
            initData: init_data.clone(),
        }
        .abi_encode()
        .into();
        self.atomic(|| {
            self.with_hook(ctx, &msg_data, || {
                self.install_module_inner(module_type_id, module, init_data)
            })
        })
    }

    /// Uninstalls `module` from `module_type_id`.
    pub fn uninstall_module(
        &self,
        ctx: CallContext,
        module_type_id: U256,
        module: Address,
        de_init_data: &Bytes,
    ) -> AccountResult<()> {
        self.only_entry_point_or_self(ctx)?;
        let msg_data = IModularAccount::uninstallModuleCall {
            moduleTypeId: module_type_id,
            module,
            deInitData: de_init_data.clone(),
        }
        .abi_encode()
        .into();
        self.atomic(|| {
            self.with_hook(ctx, &msg_data, || {
                self.uninstall_module_inner(module_type_id, module, de_init_data)
            })
        })
    }

    /// ERC-1271 signature check. Never fails.
    pub fn is_valid_signature(
        &self,
        ctx: CallContext,
        hash: B256,
        signature: &Bytes,
    ) -> FixedBytes<4> {
        self.is_valid_signature_inner(ctx.sender, hash, signature)
    }

    /// Signature-authorized, timelocked removal of a hook. Callable by anyone.
    pub fn emergency_uninstall_hook(
        &self,
        _ctx: CallContext,
        request: &EmergencyUninstall,
        signature: &Bytes,
    ) -> AccountResult<EmergencyUninstallStatus> {
        self.atomic(|| self.emergency_uninstall_hook_inner(request, signature))
    }

    /// Wipes every module slot after the account code identity changed.
    pub fn on_redelegation(&self, ctx: CallContext) -> AccountResult<()> {
        self.only_entry_point_or_self(ctx)?;
        self.atomic(|| {
            self.wipe_modules();
            self.emit(AccountEvent::AccountRedelegated);
            info!(target: "modular-account", account = %self.address, "Account redelegated");
            Ok(())
        })
    }

    /// Routes a call the account does not implement.
    pub fn fallback(&self, ctx: CallContext, data: &Bytes) -> AccountResult<Bytes> {
        self.atomic(|| self.fallback_inner(ctx, data))
    }

    /// Decodes `data` as an account interface call and routes it. Unknown
    /// selectors go to [`Self::fallback`].
    pub fn dispatch(&self, ctx: CallContext, data: &Bytes) -> AccountResult<Bytes> {
        let known = data
            .get(..4)
            .and_then(|selector| <[u8; 4]>::try_from(selector).ok())
            .is_some_and(IModularAccountCalls::valid_selector);
        if !known {
            return self.fallback(ctx, data);
        }

        let output = match IModularAccountCalls::abi_decode(data)? {
            IModularAccountCalls::initializeAccount(call) => {
                self.initialize_account(ctx, &call.bootstrap)?;
                Bytes::new()
            }
            IModularAccountCalls::execute(call) => {
                self.execute(ctx, call.mode.into(), &call.executionCalldata)?;
                Bytes::new()
            }
            IModularAccountCalls::executeFromExecutor(call) => {
                let results =
                    self.execute_from_executor(ctx, call.mode.into(), &call.executionCalldata)?;
                (results,).abi_encode_params().into()
            }
            IModularAccountCalls::installModule(call) => {
                self.install_module(ctx, call.moduleTypeId, call.module, &call.initData)?;
                Bytes::new()
            }
            IModularAccountCalls::uninstallModule(call) => {
                self.uninstall_module(ctx, call.moduleTypeId, call.module, &call.deInitData)?;
                Bytes::new()
            }
            IModularAccountCalls::isModuleInstalled(call) => {
                let installed = self.is_module_installed(
                    call.moduleTypeId,
                    call.module,
                    &call.additionalContext,
                );
                (installed,).abi_encode_params().into()
            }
            IModularAccountCalls::validateUserOp(call) => {
                let validation_data = self.validate_user_op(
                    ctx,
                    &call.userOp,
                    call.userOpHash,
                    call.missingAccountFunds,
                )?;
                (validation_data,).abi_encode_params().into()
            }
            IModularAccountCalls::isValidSignature(call) => {
                let result = self.is_valid_signature(ctx, call.hash, &call.signature);
                (result,).abi_encode_params().into()
            }
            IModularAccountCalls::supportsExecutionMode(call) => {
                (self.supports_execution_mode(call.mode.into()),).abi_encode_params().into()
            }
            IModularAccountCalls::supportsModule(call) => {
                (self.supports_module(call.moduleTypeId),).abi_encode_params().into()
            }
            IModularAccountCalls::accountId(_) => {
                (self.account_id().to_string(),).abi_encode_params().into()
            }
            IModularAccountCalls::emergencyUninstallHook(call) => {
                self.emergency_uninstall_hook(ctx, &call.request, &call.signature)?;
                Bytes::new()
            }
            IModularAccountCalls::onRedelegation(_) => {
                self.on_redelegation(ctx)?;
                Bytes::new()
            }
            IModularAccountCalls::getValidatorsPaginated(call) => {
                let page = self.validators_paginated(call.cursor, call.size.saturating_to())?;
                (page.entries, page.next).abi_encode_params().into()
            }
            IModularAccountCalls::getExecutorsPaginated(call) => {
                let page = self.executors_paginated(call.cursor, call.size.saturating_to())?;
                (page.entries, page.next).abi_encode_params().into()
            }
            IModularAccountCalls::getActiveHook(_) => {
                (self.active_hook().unwrap_or_default(),).abi_encode_params().into()
            }
            IModularAccountCalls::getFallbackHandlerBySelector(call) => {
                let (call_type, handler) = match self.fallback_handler(call.selector) {
                    Some(entry) => (entry.call_type.as_byte(), entry.handler),
                    None => (0, Address::ZERO),
                };
                (FixedBytes::<1>([call_type]), handler).abi_encode_params().into()
            }
        };
        Ok(output)
    }

    /// Returns true if `module_type_id` names a slot the account can hold.
    pub fn supports_module(&self, module_type_id: U256) -> bool {
        ModuleType::from_id(module_type_id).is_some()
    }

    /// The account implementation identifier.
    pub const fn account_id(&self) -> &'static str {
        ACCOUNT_ID
    }

    /// Returns one page of installed validators.
    pub fn validators_paginated(&self, cursor: Address, size: usize) -> AccountResult<Page> {
        Ok(self.storage().validators.entries_paginated(cursor, size)?)
    }

    /// Returns one page of installed executors.
    pub fn executors_paginated(&self, cursor: Address, size: usize) -> AccountResult<Page> {
        Ok(self.storage().executors.entries_paginated(cursor, size)?)
    }

    /// Returns every installed validator, most recent first.
    pub fn validators(&self) -> Vec<Address> {
        self.storage().validators.iter().collect()
    }

    /// Returns every installed executor.
    pub fn executors(&self) -> Vec<Address> {
        self.storage().executors.iter().collect()
    }

    /// The active hook, if any.
    pub fn active_hook(&self) -> Option<Address> {
        self.storage().hook
    }

    /// The pre-validation hook of `kind`, if any.
    pub fn pre_validation_hook(&self, kind: PreValidationHookKind) -> Option<Address> {
        self.storage().pre_validation_hooks.get(&kind).copied()
    }

    /// The fallback handler routed for `selector`, if any.
    pub fn fallback_handler(&self, selector: FixedBytes<4>) -> Option<FallbackHandler> {
        self.storage().fallbacks.get(&selector).copied()
    }

    /// When an emergency uninstall of `hook` was requested, if pending.
    pub fn emergency_requested_at(&self, hook: Address) -> Option<u64> {
        self.storage().emergency_requests.get(&hook).copied()
    }

    /// Returns true once an emergency uninstall nonce has been consumed.
    pub fn is_emergency_nonce_used(&self, nonce: U256) -> bool {
        self.storage().used_nonces.contains(&nonce)
    }

    /// Returns true once `initializeAccount` succeeded and no redelegation wiped it.
    pub fn is_initialized(&self) -> bool {
        self.storage().initialized
    }
}
