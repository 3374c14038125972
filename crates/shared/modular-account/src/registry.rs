//! Module registry.
//!
//! Install and uninstall always change [`AccountStorage`] before the module
//! callback runs, so a callback that re-enters the account sees the final slot
//! layout. Install callbacks are fatal when they revert; uninstall callbacks are
//! best-effort and only reported.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::SolValue;
use tracing::{debug, info, warn};

use crate::{
    account::SmartAccount,
    constants::is_forbidden_fallback_selector,
    error::{AccountError, AccountResult},
    events::AccountEvent,
    host::Host,
    sentinel_list::SentinelList,
    types::{CallType, FallbackHandler, ModuleType, PreValidationHookKind},
};

/// Every module slot of one account.
#[derive(Debug, Clone, Default)]
pub(crate) struct AccountStorage {
    pub(crate) validators: SentinelList,
    pub(crate) executors: SentinelList,
    pub(crate) hook: Option<Address>,
    pub(crate) pre_validation_hooks: HashMap<PreValidationHookKind, Address>,
    pub(crate) fallbacks: HashMap<FixedBytes<4>, FallbackHandler>,
    /// Emergency uninstall request time per hook.
    pub(crate) emergency_requests: HashMap<Address, u64>,
    /// Consumed emergency uninstall nonces. Never cleared.
    pub(crate) used_nonces: HashSet<U256>,
    pub(crate) initialized: bool,
}

impl<H: Host> SmartAccount<H> {
    pub(crate) fn install_module_inner(
        &self,
        module_type_id: U256,
        module: Address,
        init_data: &Bytes,
    ) -> AccountResult<()> {
        if module.is_zero() {
            return Err(AccountError::ModuleAddressCanNotBeZero);
        }
        let module_type = ModuleType::from_id(module_type_id)
            .ok_or(AccountError::InvalidModuleTypeId(module_type_id))?;
        if module_type == ModuleType::Multi {
            return self.multi_type_install(module, init_data);
        }

        let implementation = self.resolve_module(module)?;
        if !implementation.is_module_type(module_type) {
            return Err(AccountError::MismatchModuleTypeId { module_type, module });
        }
        let has_interface = match module_type {
            ModuleType::Validator => implementation.as_validator().is_some(),
            ModuleType::Hook => implementation.as_hook().is_some(),
            ModuleType::PreValidationHook(_) => implementation.as_pre_validation_hook().is_some(),
            _ => true,
        };
        if !has_interface {
            return Err(AccountError::InvalidModule(module));
        }

        let callback_data = self.insert_module(module_type, module, init_data)?;
        self.emit(AccountEvent::ModuleInstalled { module_type, module });
        info!(
            target: "modular-account",
            module_type = %module_type,
            module = %module,
            "Module installed"
        );

        if !callback_data.is_empty() {
            implementation
                .on_install(self.address(), &callback_data)
                .map_err(|reason| AccountError::InstallCallbackFailed { module, reason })?;
        }
        Ok(())
    }

    /// Writes the slot and returns the payload meant for the install callback.
    fn insert_module(
        &self,
        module_type: ModuleType,
        module: Address,
        init_data: &Bytes,
    ) -> AccountResult<Bytes> {
        let mut storage = self.storage_mut();
        match module_type {
            ModuleType::Validator => {
                storage.validators.push(module)?;
                Ok(init_data.clone())
            }
            ModuleType::Executor => {
                storage.executors.push(module)?;
                Ok(init_data.clone())
            }
            ModuleType::Hook => {
                if let Some(current) = storage.hook {
                    return Err(AccountError::HookAlreadyInstalled(current));
                }
                storage.hook = Some(module);
                Ok(init_data.clone())
            }
            ModuleType::PreValidationHook(kind) => {
                if let Some(&current) = storage.pre_validation_hooks.get(&kind) {
                    return Err(AccountError::PreValidationHookAlreadyInstalled { kind, current });
                }
                storage.pre_validation_hooks.insert(kind, module);
                Ok(init_data.clone())
            }
            ModuleType::Fallback => {
                if init_data.len() < 5 {
                    return Err(AccountError::InvalidFallbackInitData);
                }
                let selector = FixedBytes::<4>::from_slice(&init_data[..4]);
                if is_forbidden_fallback_selector(selector) {
                    return Err(AccountError::FallbackSelectorForbidden(selector));
                }
                let call_type = match CallType::from_byte(init_data[4]) {
                    Some(call_type @ (CallType::Single | CallType::Static)) => call_type,
                    _ => return Err(AccountError::FallbackCallTypeInvalid(init_data[4])),
                };
                if storage.fallbacks.contains_key(&selector) {
                    return Err(AccountError::FallbackAlreadyInstalledForSelector(selector));
                }
                storage.fallbacks.insert(selector, FallbackHandler { handler: module, call_type });
                Ok(init_data.slice(5..))
            }
            ModuleType::Multi => Err(AccountError::InvalidModuleTypeId(module_type.into())),
        }
    }

    /// Installs one module under several types from `abi.encode(uint256[], bytes[])`.
    ///
    /// Unknown type ids are skipped.
    fn multi_type_install(&self, module: Address, data: &Bytes) -> AccountResult<()> {
        let (types, payloads) = <(Vec<U256>, Vec<Bytes>)>::abi_decode_params(data)?;
        if types.len() != payloads.len() {
            return Err(AccountError::InvalidMultiTypeInstallData {
                types: types.len(),
                payloads: payloads.len(),
            });
        }

        for (module_type_id, payload) in types.into_iter().zip(payloads) {
            match ModuleType::from_id(module_type_id) {
                None | Some(ModuleType::Multi) => {
                    debug!(
                        target: "modular-account",
                        module = %module,
                        module_type_id = %module_type_id,
                        "Skipping unknown module type in multi-type install"
                    );
                }
                Some(_) => self.install_module_inner(module_type_id, module, &payload)?,
            }
        }
        Ok(())
    }

    /// Removes `module` from its slot. The slot is cleared before the last-validator
    /// check, so callers must run this inside [`SmartAccount::atomic`].
    pub(crate) fn uninstall_module_inner(
        &self,
        module_type_id: U256,
        module: Address,
        de_init_data: &Bytes,
    ) -> AccountResult<()> {
        let module_type = ModuleType::from_id(module_type_id)
            .filter(|module_type| *module_type != ModuleType::Multi)
            .ok_or(AccountError::InvalidModuleTypeId(module_type_id))?;

        let callback_data = self.remove_module(module_type, module, de_init_data)?;

        if module_type == ModuleType::Validator
            && !self.is_delegated()
            && !self.has_initialized_validator()
        {
            return Err(AccountError::CanNotRemoveLastValidator);
        }

        self.emit(AccountEvent::ModuleUninstalled { module_type, module });
        info!(
            target: "modular-account",
            module_type = %module_type,
            module = %module,
            "Module uninstalled"
        );
        self.try_on_uninstall(module_type, module, &callback_data);
        Ok(())
    }

    /// Clears the slot and returns the payload meant for the uninstall callback.
    fn remove_module(
        &self,
        module_type: ModuleType,
        module: Address,
        de_init_data: &Bytes,
    ) -> AccountResult<Bytes> {
        let not_installed = AccountError::ModuleNotInstalled { module_type, module };
        match module_type {
            ModuleType::Validator | ModuleType::Executor => {
                let (prev, data) = <(Address, Bytes)>::abi_decode_params(de_init_data)?;
                let mut storage = self.storage_mut();
                let list = if module_type == ModuleType::Validator {
                    &mut storage.validators
                } else {
                    &mut storage.executors
                };
                if !list.contains(module) {
                    return Err(not_installed);
                }
                list.pop(prev, module)?;
                Ok(data)
            }
            ModuleType::Fallback => {
                if de_init_data.len() < 4 {
                    return Err(AccountError::InvalidFallbackInitData);
                }
                let selector = FixedBytes::<4>::from_slice(&de_init_data[..4]);
                let mut storage = self.storage_mut();
                match storage.fallbacks.get(&selector) {
                    Some(entry) if entry.handler == module => {}
                    _ => return Err(not_installed),
                }
                storage.fallbacks.remove(&selector);
                Ok(de_init_data.slice(4..))
            }
            ModuleType::Hook => {
                let mut storage = self.storage_mut();
                if storage.hook != Some(module) {
                    return Err(not_installed);
                }
                storage.hook = None;
                Ok(de_init_data.clone())
            }
            ModuleType::PreValidationHook(kind) => {
                let mut storage = self.storage_mut();
                if storage.pre_validation_hooks.get(&kind) != Some(&module) {
                    return Err(not_installed);
                }
                storage.pre_validation_hooks.remove(&kind);
                Ok(de_init_data.clone())
            }
            ModuleType::Multi => Err(AccountError::InvalidModuleTypeId(module_type.into())),
        }
    }

    /// Runs the uninstall callback, reporting instead of propagating a revert.
    fn try_on_uninstall(&self, module_type: ModuleType, module: Address, data: &Bytes) {
        let result = match self.host().module(module) {
            Some(implementation) => implementation.on_uninstall(self.address(), data),
            None => Err(Bytes::new()),
        };
        if let Err(reason) = result {
            warn!(
                target: "modular-account",
                module_type = %module_type,
                module = %module,
                reason = %reason,
                "Uninstall callback failed, module removed anyway"
            );
            self.emit(AccountEvent::UninstallCallbackFailed { module_type, module, reason });
        }
    }

    /// Returns true if `module` occupies the `module_type_id` slot. For fallbacks
    /// `additional_context` carries the selector.
    pub fn is_module_installed(
        &self,
        module_type_id: U256,
        module: Address,
        additional_context: &Bytes,
    ) -> bool {
        let Some(module_type) = ModuleType::from_id(module_type_id) else {
            return false;
        };
        let storage = self.storage();
        match module_type {
            ModuleType::Validator => storage.validators.contains(module),
            ModuleType::Executor => storage.executors.contains(module),
            ModuleType::Hook => storage.hook == Some(module),
            ModuleType::PreValidationHook(kind) => {
                storage.pre_validation_hooks.get(&kind) == Some(&module)
            }
            ModuleType::Fallback => additional_context.get(..4).is_some_and(|selector| {
                storage
                    .fallbacks
                    .get(&FixedBytes::<4>::from_slice(selector))
                    .is_some_and(|entry| entry.handler == module)
            }),
            ModuleType::Multi => false,
        }
    }

    /// Returns true if the default validator or any installed validator holds
    /// configuration for this account.
    pub(crate) fn has_initialized_validator(&self) -> bool {
        let validators: Vec<Address> = self.storage().validators.iter().collect();
        std::iter::once(self.config().default_validator).chain(validators).any(|validator| {
            let module = self.host().module(validator);
            module.is_some_and(|module| module.is_initialized(self.address()))
        })
    }

    /// Clears every slot, then runs best-effort uninstall callbacks.
    pub(crate) fn wipe_modules(&self) {
        let removed = {
            let mut storage = self.storage_mut();
            let mut removed: Vec<(ModuleType, Address)> = Vec::new();
            removed.extend(storage.validators.iter().map(|v| (ModuleType::Validator, v)));
            removed.extend(storage.executors.iter().map(|e| (ModuleType::Executor, e)));
            removed.extend(storage.hook.map(|hook| (ModuleType::Hook, hook)));
            removed.extend(
                storage
                    .pre_validation_hooks
                    .iter()
                    .map(|(kind, hook)| (ModuleType::PreValidationHook(*kind), *hook)),
            );
            let mut handlers: Vec<Address> =
                storage.fallbacks.values().map(|entry| entry.handler).collect();
            handlers.sort();
            handlers.dedup();
            removed.extend(handlers.into_iter().map(|handler| (ModuleType::Fallback, handler)));

            storage.validators.pop_all();
            storage.executors.pop_all();
            storage.hook = None;
            storage.pre_validation_hooks.clear();
            storage.fallbacks.clear();
            storage.emergency_requests.clear();
            storage.initialized = false;
            removed
        };

        info!(
            target: "modular-account",
            account = %self.address(),
            modules = removed.len(),
            "Wiping all modules"
        );
        for (module_type, module) in removed {
            self.emit(AccountEvent::ModuleUninstalled { module_type, module });
            self.try_on_uninstall(module_type, module, &Bytes::new());
        }
    }
}
