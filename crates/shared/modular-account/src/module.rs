//! Module interfaces.
//!
//! Every module exposes the [`Module`] callbacks. Validators, hooks and
//! pre-validation hooks additionally implement the capability traits below and
//! surface them through the `as_*` accessors, which is how the account asks a
//! module for an interface it needs.
//!
//! Callbacks receive the account address as their caller. A reverting callback
//! returns its raw revert payload.

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256};

use crate::{abi::PackedUserOperation, types::ModuleType};

/// Raw revert payload of a module callback.
pub type RevertData = Bytes;

/// Result of a module callback.
pub type ModuleResult<T> = Result<T, RevertData>;

/// Callbacks every module exposes.
pub trait Module {
    /// Returns true if the module may be installed under `module_type`.
    fn is_module_type(&self, module_type: ModuleType) -> bool;

    /// Called after the account registered the module.
    fn on_install(&self, account: Address, data: &Bytes) -> ModuleResult<()>;

    /// Called after the account unregistered the module.
    fn on_uninstall(&self, account: Address, data: &Bytes) -> ModuleResult<()>;

    /// Returns true if the module holds configuration for `account`.
    fn is_initialized(&self, _account: Address) -> bool {
        false
    }

    /// The validator interface, if the module has one.
    fn as_validator(&self) -> Option<&dyn Validator> {
        None
    }

    /// The hook interface, if the module has one.
    fn as_hook(&self) -> Option<&dyn Hook> {
        None
    }

    /// The pre-validation hook interface, if the module has one.
    fn as_pre_validation_hook(&self) -> Option<&dyn PreValidationHook> {
        None
    }
}

/// Authenticates user operations and ERC-1271 signatures.
pub trait Validator: Module {
    /// Returns packed validation data; zero means success.
    fn validate_user_op(
        &self,
        account: Address,
        user_op: &PackedUserOperation,
        user_op_hash: B256,
    ) -> ModuleResult<U256>;

    /// Returns the ERC-1271 magic value for a valid signature.
    fn is_valid_signature_with_sender(
        &self,
        account: Address,
        sender: Address,
        hash: B256,
        signature: &Bytes,
    ) -> ModuleResult<FixedBytes<4>>;
}

/// Checks wrapped around every state-changing entry point.
pub trait Hook: Module {
    /// Runs before the wrapped call and returns the context handed to [`Hook::post_check`].
    fn pre_check(
        &self,
        account: Address,
        sender: Address,
        value: U256,
        msg_data: &Bytes,
    ) -> ModuleResult<Bytes>;

    /// Runs after the wrapped call succeeded.
    fn post_check(&self, account: Address, context: &Bytes) -> ModuleResult<()>;
}

/// Rewrites the hash and signature a validator is about to see.
pub trait PreValidationHook: Module {
    /// Applied before ERC-4337 user operation validation.
    fn pre_validation_hook_erc4337(
        &self,
        account: Address,
        user_op: &PackedUserOperation,
        missing_account_funds: U256,
        user_op_hash: B256,
    ) -> ModuleResult<(B256, Bytes)>;

    /// Applied before ERC-1271 signature verification.
    fn pre_validation_hook_erc1271(
        &self,
        account: Address,
        sender: Address,
        hash: B256,
        signature: &Bytes,
    ) -> ModuleResult<(B256, Bytes)>;
}
