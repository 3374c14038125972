//! Execution dispatcher.
//!
//! Decodes execution calldata for the call type of an [`ExecutionMode`] and
//! performs the calls in order. In [`ExecType::Default`] the first revert fails
//! the whole execution. In [`ExecType::Try`] a revert is reported and its revert
//! data becomes that call's result.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolValue;
use tracing::warn;

use crate::{
    abi::Execution,
    account::SmartAccount,
    error::{AccountError, AccountResult},
    events::AccountEvent,
    host::Host,
    types::{CallType, ExecType, ExecutionMode},
};

/// Encodes single execution calldata: `target ‖ value ‖ callData`.
pub fn encode_single(target: Address, value: U256, call_data: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(52 + call_data.len());
    out.extend_from_slice(target.as_slice());
    out.extend_from_slice(&value.to_be_bytes::<32>());
    out.extend_from_slice(call_data);
    out.into()
}

/// Decodes single execution calldata.
pub fn decode_single(calldata: &[u8]) -> AccountResult<(Address, U256, Bytes)> {
    if calldata.len() < 52 {
        return Err(AccountError::InvalidExecutionCalldata);
    }
    let target = Address::from_slice(&calldata[..20]);
    let value = U256::from_be_slice(&calldata[20..52]);
    Ok((target, value, Bytes::copy_from_slice(&calldata[52..])))
}

/// Encodes batch execution calldata: `abi.encode(Execution[])`.
pub fn encode_batch(executions: &[Execution]) -> Bytes {
    (executions.to_vec(),).abi_encode_params().into()
}

/// Decodes batch execution calldata.
pub fn decode_batch(calldata: &[u8]) -> AccountResult<Vec<Execution>> {
    let (executions,) = <(Vec<Execution>,)>::abi_decode_params(calldata)?;
    Ok(executions)
}

/// Encodes delegatecall execution calldata: `target ‖ callData`.
pub fn encode_delegate(target: Address, call_data: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(20 + call_data.len());
    out.extend_from_slice(target.as_slice());
    out.extend_from_slice(call_data);
    out.into()
}

/// Decodes delegatecall execution calldata.
pub fn decode_delegate(calldata: &[u8]) -> AccountResult<(Address, Bytes)> {
    if calldata.len() < 20 {
        return Err(AccountError::InvalidExecutionCalldata);
    }
    Ok((Address::from_slice(&calldata[..20]), Bytes::copy_from_slice(&calldata[20..])))
}

impl<H: Host> SmartAccount<H> {
    /// Returns true if `mode` can be executed.
    pub fn supports_execution_mode(&self, mode: ExecutionMode) -> bool {
        matches!(
            mode.decode(),
            Ok((CallType::Single | CallType::Batch | CallType::Delegate, _))
        )
    }

    /// Performs the execution and returns one result per call, in input order.
    pub(crate) fn execute_with_mode(
        &self,
        mode: ExecutionMode,
        execution_calldata: &Bytes,
    ) -> AccountResult<Vec<Bytes>> {
        let (call_type, exec_type) = mode.decode()?;
        match call_type {
            CallType::Single => {
                let (target, value, call_data) = decode_single(execution_calldata)?;
                Ok(vec![self.perform_call(exec_type, target, value, call_data)?])
            }
            CallType::Batch => decode_batch(execution_calldata)?
                .into_iter()
                .map(|Execution { target, value, callData: call_data }| {
                    self.perform_call(exec_type, target, value, call_data)
                })
                .collect(),
            CallType::Delegate => {
                let (target, call_data) = decode_delegate(execution_calldata)?;
                Ok(vec![self.perform_delegate_call(exec_type, target, call_data)?])
            }
            CallType::Static => Err(AccountError::UnsupportedCallType(call_type.as_byte())),
        }
    }

    fn perform_call(
        &self,
        exec_type: ExecType,
        target: Address,
        value: U256,
        call_data: Bytes,
    ) -> AccountResult<Bytes> {
        match self.host().call(self.address(), target, value, &call_data) {
            Ok(output) => Ok(output),
            Err(reason) if exec_type == ExecType::Default => {
                Err(AccountError::ExecutionFailed { target, reason })
            }
            Err(reason) => {
                warn!(
                    target: "modular-account",
                    call_target = %target,
                    value = %value,
                    reason = %reason,
                    "Try-mode call reverted"
                );
                self.emit(AccountEvent::TryExecuteUnsuccessful {
                    target,
                    call_data,
                    result: reason.clone(),
                });
                Ok(reason)
            }
        }
    }

    fn perform_delegate_call(
        &self,
        exec_type: ExecType,
        target: Address,
        call_data: Bytes,
    ) -> AccountResult<Bytes> {
        match self.host().delegate_call(self.address(), target, &call_data) {
            Ok(output) => Ok(output),
            Err(reason) if exec_type == ExecType::Default => {
                Err(AccountError::DelegateCallFailed { target, reason })
            }
            Err(reason) => {
                warn!(
                    target: "modular-account",
                    call_target = %target,
                    reason = %reason,
                    "Try-mode delegatecall reverted"
                );
                self.emit(AccountEvent::TryDelegateCallUnsuccessful {
                    target,
                    call_data,
                    result: reason.clone(),
                });
                Ok(reason)
            }
        }
    }
}
