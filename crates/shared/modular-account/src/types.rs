//! Module kinds, execution modes and fallback routing entries.

use std::fmt;

use alloy_primitives::{Address, B256, FixedBytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::{AccountError, AccountResult};

/// The two independent pre-validation hook slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PreValidationHookKind {
    /// Runs before ERC-1271 signature verification.
    SignatureVerification,
    /// Runs before ERC-4337 user operation validation.
    UserOpValidation,
}

/// A module slot type, as declared by `isModuleType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModuleType {
    /// Several types installed for one module in a single call.
    Multi,
    /// Authenticates user operations and signatures.
    Validator,
    /// May trigger executions on behalf of the account.
    Executor,
    /// Handles selectors the account does not implement.
    Fallback,
    /// Pre/post checks around every mutating call.
    Hook,
    /// Rewrites hash and signature before a validator sees them.
    PreValidationHook(PreValidationHookKind),
}

impl ModuleType {
    /// Every type an account can hold, in id order.
    pub const ALL: [Self; 7] = [
        Self::Multi,
        Self::Validator,
        Self::Executor,
        Self::Fallback,
        Self::Hook,
        Self::PreValidationHook(PreValidationHookKind::SignatureVerification),
        Self::PreValidationHook(PreValidationHookKind::UserOpValidation),
    ];

    /// Returns the numeric module type id.
    pub const fn id(self) -> u64 {
        match self {
            Self::Multi => 0,
            Self::Validator => 1,
            Self::Executor => 2,
            Self::Fallback => 3,
            Self::Hook => 4,
            Self::PreValidationHook(PreValidationHookKind::SignatureVerification) => 8,
            Self::PreValidationHook(PreValidationHookKind::UserOpValidation) => 9,
        }
    }

    /// Resolves a numeric module type id, if it is one the account knows.
    pub fn from_id(id: U256) -> Option<Self> {
        let id = u64::try_from(id).ok()?;
        Self::ALL.into_iter().find(|module_type| module_type.id() == id)
    }

    /// Returns true for the slots the emergency uninstall path may clear.
    pub const fn is_hook_like(self) -> bool {
        matches!(self, Self::Hook | Self::PreValidationHook(_))
    }
}

impl From<ModuleType> for U256 {
    fn from(module_type: ModuleType) -> Self {
        Self::from(module_type.id())
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Multi => "multi",
            Self::Validator => "validator",
            Self::Executor => "executor",
            Self::Fallback => "fallback",
            Self::Hook => "hook",
            Self::PreValidationHook(PreValidationHookKind::SignatureVerification) => {
                "pre-validation-hook(erc1271)"
            }
            Self::PreValidationHook(PreValidationHookKind::UserOpValidation) => {
                "pre-validation-hook(erc4337)"
            }
        };
        f.write_str(name)
    }
}

/// How the calls of an execution are performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallType {
    /// One `(target, value, calldata)` call.
    Single,
    /// An ABI-encoded array of calls.
    Batch,
    /// A read-only call. Only used for fallback routing.
    Static,
    /// One delegated call in the account's own context.
    Delegate,
}

impl CallType {
    /// Returns the mode byte of this call type.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Single => 0x00,
            Self::Batch => 0x01,
            Self::Static => 0xfe,
            Self::Delegate => 0xff,
        }
    }

    /// Parses a mode byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Single),
            0x01 => Some(Self::Batch),
            0xfe => Some(Self::Static),
            0xff => Some(Self::Delegate),
            _ => None,
        }
    }
}

/// Whether failing calls abort the execution or are reported and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecType {
    /// The first failure aborts everything.
    Default,
    /// Failures are caught, reported and execution continues.
    Try,
}

impl ExecType {
    /// Returns the mode byte of this exec type.
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Default => 0x00,
            Self::Try => 0x01,
        }
    }

    /// Parses a mode byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Default),
            0x01 => Some(Self::Try),
            _ => None,
        }
    }
}

/// A 32-byte execution mode descriptor.
///
/// Layout: `callType (1) | execType (1) | unused (4) | modeSelector (4) | modePayload (22)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionMode(B256);

impl ExecutionMode {
    /// Builds a mode with an empty selector and payload.
    pub fn new(call_type: CallType, exec_type: ExecType) -> Self {
        let mut raw = B256::ZERO;
        raw[0] = call_type.as_byte();
        raw[1] = exec_type.as_byte();
        Self(raw)
    }

    /// Sets the 4-byte mode selector.
    pub fn with_selector(mut self, selector: FixedBytes<4>) -> Self {
        self.0[6..10].copy_from_slice(selector.as_slice());
        self
    }

    /// Returns the raw descriptor.
    pub const fn raw(&self) -> B256 {
        self.0
    }

    /// Returns the mode selector.
    pub fn selector(&self) -> FixedBytes<4> {
        FixedBytes::from_slice(&self.0[6..10])
    }

    /// Decodes the call type.
    pub fn call_type(&self) -> AccountResult<CallType> {
        CallType::from_byte(self.0[0]).ok_or(AccountError::UnsupportedCallType(self.0[0]))
    }

    /// Decodes the exec type.
    pub fn exec_type(&self) -> AccountResult<ExecType> {
        ExecType::from_byte(self.0[1]).ok_or(AccountError::UnsupportedExecType(self.0[1]))
    }

    /// Decodes both halves of the descriptor.
    pub fn decode(&self) -> AccountResult<(CallType, ExecType)> {
        Ok((self.call_type()?, self.exec_type()?))
    }
}

impl From<B256> for ExecutionMode {
    fn from(raw: B256) -> Self {
        Self(raw)
    }
}

impl From<ExecutionMode> for B256 {
    fn from(mode: ExecutionMode) -> Self {
        mode.0
    }
}

/// A fallback handler registered for one selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackHandler {
    /// The handler module.
    pub handler: Address,
    /// [`CallType::Single`] for mutating handlers, [`CallType::Static`] for read-only ones.
    pub call_type: CallType,
}
