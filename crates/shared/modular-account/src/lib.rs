#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/base/base/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod abi;

mod account;
pub use account::{AccountCheckpoint, SmartAccount};

pub mod config;
pub use config::{AccountArgs, AccountConfig, ConfigError};

pub mod constants;

pub mod delegation;
pub use delegation::{delegation_designator, get_eip7702_delegate, is_eip7702_delegation};

mod emergency;
pub use emergency::{EmergencyUninstallStatus, RequestState, request_state};

mod error;
pub use error::{AccountError, AccountResult};

mod events;
pub use events::AccountEvent;

pub mod execution;

mod fallback;

mod hook;

pub mod host;
pub use host::{CallContext, CallResult, Host, InMemoryHost};

pub mod module;
pub use module::{Hook, Module, ModuleResult, PreValidationHook, RevertData, Validator};

mod nonce;
pub use nonce::{Nonce, ValidationMode};

mod registry;

mod sentinel_list;
pub use sentinel_list::{Page, SentinelList, SentinelListError};

mod types;
pub use types::{
    CallType, ExecType, ExecutionMode, FallbackHandler, ModuleType, PreValidationHookKind,
};

mod validation;
pub use validation::EnableModeData;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
