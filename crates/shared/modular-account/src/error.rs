//! Account Error Types
//!
//! Every hard failure of the account. Signature checks never surface these; they
//! answer with the ERC-1271 invalid sentinel instead.

use alloy_primitives::{Address, Bytes, FixedBytes, U256};
use alloy_sol_types::{Revert, SolError};
use thiserror::Error;

use crate::{
    sentinel_list::SentinelListError,
    types::{ModuleType, PreValidationHookKind},
};

/// Result type for account operations
pub type AccountResult<T> = Result<T, AccountError>;

/// Errors that can occur while operating the account
#[derive(Debug, Error)]
pub enum AccountError {
    /// Caller is neither the EntryPoint nor the account itself
    #[error("Caller {0} is not authorized")]
    AccountAccessUnauthorized(Address),

    /// Caller of `executeFromExecutor` is not an installed executor
    #[error("Caller {0} is not an installed executor")]
    ExecutorNotInstalled(Address),

    /// `initializeAccount` was called twice
    #[error("Account already initialized")]
    AccountAlreadyInitialized,

    /// Bootstrap finished without any initialized validator
    #[error("Account bootstrap left no initialized validator")]
    NoValidatorInstalled,

    /// Zero module address
    #[error("Module address cannot be zero")]
    ModuleAddressCanNotBeZero,

    /// Unknown module type id
    #[error("Invalid module type id {0}")]
    InvalidModuleTypeId(U256),

    /// Module does not declare the requested type
    #[error("Module {module} does not declare type {module_type}")]
    MismatchModuleTypeId { module_type: ModuleType, module: Address },

    /// Module is not installed under the given type
    #[error("Module {module} is not installed as {module_type}")]
    ModuleNotInstalled { module_type: ModuleType, module: Address },

    /// Address resolves to no module, or to one lacking the required interface
    #[error("Module {0} does not expose the required interface")]
    InvalidModule(Address),

    /// Validator or executor list violation
    #[error(transparent)]
    List(#[from] SentinelListError),

    /// A hook is already active
    #[error("Hook {0} is already installed")]
    HookAlreadyInstalled(Address),

    /// A pre-validation hook of this kind is already active
    #[error("Pre-validation hook {current} already installed for {kind:?}")]
    PreValidationHookAlreadyInstalled { kind: PreValidationHookKind, current: Address },

    /// Fallback install data too short to carry a selector and call type
    #[error("Fallback init data must start with a selector and a call type")]
    InvalidFallbackInitData,

    /// Selector is on the deny-list
    #[error("Selector {0} cannot be routed to a fallback handler")]
    FallbackSelectorForbidden(FixedBytes<4>),

    /// Selector already routed
    #[error("Fallback handler already installed for selector {0}")]
    FallbackAlreadyInstalledForSelector(FixedBytes<4>),

    /// Fallback call type is neither single nor static
    #[error("Unsupported fallback call type {0:#04x}")]
    FallbackCallTypeInvalid(u8),

    /// No handler and not a receiver callback
    #[error("No fallback handler for selector {0}")]
    MissingFallbackHandler(FixedBytes<4>),

    /// Fallback handler reverted
    #[error("Fallback handler {handler} reverted")]
    FallbackCallFailed { handler: Address, reason: Bytes },

    /// Multi-type install payload with mismatched lengths
    #[error("Multi-type install lists {types} types but {payloads} init payloads")]
    InvalidMultiTypeInstallData { types: usize, payloads: usize },

    /// `onInstall` reverted
    #[error("Install callback of module {module} reverted")]
    InstallCallbackFailed { module: Address, reason: Bytes },

    /// Removal would leave the account without an initialized validator
    #[error("Cannot remove the last initialized validator")]
    CanNotRemoveLastValidator,

    /// Validator referenced by a nonce or signature is not installed
    #[error("Validator {0} is not installed")]
    ValidatorNotInstalled(Address),

    /// Validator reverted during user operation validation
    #[error("Validator {validator} reverted")]
    ValidatorCallFailed { validator: Address, reason: Bytes },

    /// Pre-validation hook reverted during user operation validation
    #[error("Pre-validation hook {hook} reverted")]
    PreValidationHookFailed { hook: Address, reason: Bytes },

    /// Enable mode signature could not be parsed
    #[error("Malformed module enable mode data")]
    InvalidEnableModeData,

    /// Hook vetoed the call before it ran
    #[error("Hook {hook} pre-check reverted")]
    HookPreCheckFailed { hook: Address, reason: Bytes },

    /// Hook vetoed the call after it ran
    #[error("Hook {hook} post-check reverted")]
    HookPostCheckFailed { hook: Address, reason: Bytes },

    /// Unknown or unsupported call type byte
    #[error("Unsupported call type {0:#04x}")]
    UnsupportedCallType(u8),

    /// Unknown exec type byte
    #[error("Unsupported exec type {0:#04x}")]
    UnsupportedExecType(u8),

    /// Execution calldata too short for its call type
    #[error("Malformed execution calldata")]
    InvalidExecutionCalldata,

    /// Default-mode call reverted
    #[error("Call to {target} reverted")]
    ExecutionFailed { target: Address, reason: Bytes },

    /// Default-mode delegatecall reverted
    #[error("Delegatecall to {target} reverted")]
    DelegateCallFailed { target: Address, reason: Bytes },

    /// Emergency uninstall nonce replay
    #[error("Emergency uninstall nonce {0} already used")]
    InvalidNonce(U256),

    /// Emergency uninstall signature rejected by the validator
    #[error("Emergency uninstall signature rejected")]
    EmergencyUninstallSigError,

    /// Emergency uninstall of something that is not a hook
    #[error("Module type {0} cannot be emergency uninstalled")]
    UnsupportedModuleType(U256),

    /// ABI decoding failed
    #[error("ABI decoding failed: {0}")]
    Abi(#[from] alloy_sol_types::Error),
}

impl AccountError {
    /// Check if this error is an authorization failure (caller, signature or nonce)
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            Self::AccountAccessUnauthorized(_)
                | Self::ExecutorNotInstalled(_)
                | Self::InvalidNonce(_)
                | Self::EmergencyUninstallSigError
        )
    }

    /// Check if this error is a structural conflict in the module registry
    pub fn is_structural_conflict(&self) -> bool {
        matches!(
            self,
            Self::List(_)
                | Self::HookAlreadyInstalled(_)
                | Self::PreValidationHookAlreadyInstalled { .. }
                | Self::FallbackSelectorForbidden(_)
                | Self::FallbackAlreadyInstalledForSelector(_)
        )
    }

    /// Returns the revert payload surfaced when the account is called through a host.
    ///
    /// Reverts of calls made on the account's behalf bubble up verbatim; everything
    /// else becomes a Solidity `Error(string)`.
    pub fn into_revert_data(self) -> Bytes {
        match self {
            Self::ExecutionFailed { reason, .. }
            | Self::DelegateCallFailed { reason, .. }
            | Self::FallbackCallFailed { reason, .. } => reason,
            other => Revert { reason: other.to_string() }.abi_encode().into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::unauthorized(AccountError::AccountAccessUnauthorized(Address::ZERO), true, false)]
    #[case::nonce(AccountError::InvalidNonce(U256::from(7)), true, false)]
    #[case::hook(AccountError::HookAlreadyInstalled(Address::ZERO), false, true)]
    #[case::list(AccountError::List(SentinelListError::AlreadyInitialized), false, true)]
    #[case::last_validator(AccountError::CanNotRemoveLastValidator, false, false)]
    fn test_error_classification(
        #[case] error: AccountError,
        #[case] authorization: bool,
        #[case] structural: bool,
    ) {
        assert_eq!(error.is_authorization_error(), authorization);
        assert_eq!(error.is_structural_conflict(), structural);
        assert!(!error.to_string().is_empty());
    }

    #[test]
    fn test_execution_revert_bubbles_verbatim() {
        let reason = Bytes::from_static(b"boom");
        let error = AccountError::ExecutionFailed { target: Address::ZERO, reason: reason.clone() };
        assert_eq!(error.into_revert_data(), reason);
    }

    #[test]
    fn test_account_error_reverts_with_string() {
        let data = AccountError::CanNotRemoveLastValidator.into_revert_data();
        let decoded = Revert::abi_decode(&data).unwrap();
        assert_eq!(decoded.reason, "Cannot remove the last initialized validator");
    }
}
