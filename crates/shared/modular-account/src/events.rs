//! Diagnostic events recorded by the account.

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::types::ModuleType;

/// Events that can be emitted by the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AccountEvent {
    /// A module was installed under a type.
    ModuleInstalled {
        /// The slot type.
        module_type: ModuleType,
        /// The module.
        module: Address,
    },
    /// A module was removed from a type.
    ModuleUninstalled {
        /// The slot type.
        module_type: ModuleType,
        /// The module.
        module: Address,
    },
    /// A module's uninstall callback reverted after it was removed.
    UninstallCallbackFailed {
        /// The slot type.
        module_type: ModuleType,
        /// The module.
        module: Address,
        /// The revert payload.
        reason: Bytes,
    },
    /// A Try-mode call reverted.
    TryExecuteUnsuccessful {
        /// The call target.
        target: Address,
        /// The calldata that was sent.
        call_data: Bytes,
        /// The revert payload.
        result: Bytes,
    },
    /// A Try-mode delegatecall reverted.
    TryDelegateCallUnsuccessful {
        /// The delegate target.
        target: Address,
        /// The calldata that was sent.
        call_data: Bytes,
        /// The revert payload.
        result: Bytes,
    },
    /// An emergency hook uninstall timelock started.
    EmergencyHookUninstallRequest {
        /// The hook.
        hook: Address,
        /// When the request was made.
        timestamp: u64,
    },
    /// A stale emergency hook uninstall request was restarted.
    EmergencyHookUninstallRequestReset {
        /// The hook.
        hook: Address,
        /// When the request was restarted.
        timestamp: u64,
    },
    /// Every module slot was wiped after a code identity change.
    AccountRedelegated,
}
