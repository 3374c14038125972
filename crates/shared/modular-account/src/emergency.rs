//! Emergency hook uninstall.
//!
//! A hook that blocks its own removal can be forced out with a validator
//! signature, but only after a timelock. The first request starts the clock, a
//! request after the timelock performs the uninstall, and a request left
//! unresolved for three timelocks starts over. Nothing happens in between
//! requests; every transition is evaluated when a request arrives.

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    abi::EmergencyUninstall,
    account::SmartAccount,
    error::{AccountError, AccountResult},
    events::AccountEvent,
    host::Host,
    types::ModuleType,
};

/// State of a pending request at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// No request on record.
    NotRequested,
    /// The timelock is running.
    Pending {
        /// First timestamp at which the uninstall can run.
        ready_at: u64,
    },
    /// The timelock elapsed; the uninstall can run.
    Ready,
    /// The request was left unresolved too long and must start over.
    Expired,
}

/// Classifies a request made at `requested_at` (zero meaning none) at time `now`.
pub const fn request_state(requested_at: u64, now: u64, timelock: u64) -> RequestState {
    if requested_at == 0 {
        return RequestState::NotRequested;
    }
    let ready_at = requested_at.saturating_add(timelock);
    if now >= requested_at.saturating_add(timelock.saturating_mul(3)) {
        RequestState::Expired
    } else if now >= ready_at {
        RequestState::Ready
    } else {
        RequestState::Pending { ready_at }
    }
}

/// Outcome of an emergency uninstall request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum EmergencyUninstallStatus {
    /// The timelock started.
    Requested {
        /// Request timestamp.
        at: u64,
    },
    /// A stale request was restarted.
    Reset {
        /// New request timestamp.
        at: u64,
    },
    /// The timelock is still running; nothing changed besides the consumed nonce.
    Pending {
        /// First timestamp at which the uninstall can run.
        ready_at: u64,
    },
    /// The hook was removed.
    Uninstalled,
}

impl<H: Host> SmartAccount<H> {
    pub(crate) fn emergency_uninstall_hook_inner(
        &self,
        request: &EmergencyUninstall,
        signature: &Bytes,
    ) -> AccountResult<EmergencyUninstallStatus> {
        if signature.len() < 20 {
            return Err(AccountError::EmergencyUninstallSigError);
        }
        let validator = self.resolve_validator(Address::from_slice(&signature[..20]))?;
        let digest = self.emergency_uninstall_digest(request);

        if !self.storage_mut().used_nonces.insert(request.nonce) {
            return Err(AccountError::InvalidNonce(request.nonce));
        }

        let validator_signature = signature.slice(20..);
        if !self.validator_accepts(validator, digest, &validator_signature) {
            return Err(AccountError::EmergencyUninstallSigError);
        }

        let module_type = ModuleType::from_id(request.hookType)
            .filter(|module_type| module_type.is_hook_like())
            .ok_or(AccountError::UnsupportedModuleType(request.hookType))?;
        let hook = request.hook;
        if !self.is_module_installed(request.hookType, hook, &Bytes::new()) {
            return Err(AccountError::ModuleNotInstalled { module_type, module: hook });
        }

        let now = self.host().timestamp();
        let requested_at = self.emergency_requested_at(hook).unwrap_or_default();
        match request_state(requested_at, now, self.config().emergency_timelock) {
            RequestState::NotRequested => {
                self.storage_mut().emergency_requests.insert(hook, now);
                self.emit(AccountEvent::EmergencyHookUninstallRequest { hook, timestamp: now });
                info!(
                    target: "modular-account",
                    hook = %hook,
                    timestamp = now,
                    "Emergency uninstall requested"
                );
                Ok(EmergencyUninstallStatus::Requested { at: now })
            }
            RequestState::Expired => {
                self.storage_mut().emergency_requests.insert(hook, now);
                self.emit(AccountEvent::EmergencyHookUninstallRequestReset {
                    hook,
                    timestamp: now,
                });
                info!(
                    target: "modular-account",
                    hook = %hook,
                    previous = requested_at,
                    timestamp = now,
                    "Emergency uninstall request expired and was reset"
                );
                Ok(EmergencyUninstallStatus::Reset { at: now })
            }
            RequestState::Ready => {
                self.storage_mut().emergency_requests.remove(&hook);
                self.uninstall_module_inner(request.hookType, hook, &request.deInitData)?;
                info!(target: "modular-account", hook = %hook, "Emergency uninstall executed");
                Ok(EmergencyUninstallStatus::Uninstalled)
            }
            RequestState::Pending { ready_at } => {
                debug!(
                    target: "modular-account",
                    hook = %hook,
                    ready_at,
                    "Emergency uninstall timelock still running"
                );
                Ok(EmergencyUninstallStatus::Pending { ready_at })
            }
        }
    }
}
