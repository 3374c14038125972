//! Fallback routing for selectors the account does not implement.
//!
//! The handler receives the original calldata with the original caller appended
//! (ERC-2771 style). Unhandled token receiver callbacks are acknowledged so the
//! account can always hold ERC-721 and ERC-1155 tokens.

use alloy_primitives::{Bytes, FixedBytes, U256};
use alloy_sol_types::SolValue;
use tracing::debug;

use crate::{
    account::SmartAccount,
    constants::is_receiver_selector,
    error::{AccountError, AccountResult},
    host::{CallContext, Host},
    types::CallType,
};

impl<H: Host> SmartAccount<H> {
    pub(crate) fn fallback_inner(&self, ctx: CallContext, data: &Bytes) -> AccountResult<Bytes> {
        if data.len() < 4 {
            return Ok(Bytes::new());
        }
        let selector = FixedBytes::<4>::from_slice(&data[..4]);

        let Some(entry) = self.fallback_handler(selector) else {
            if is_receiver_selector(selector) {
                return Ok((selector,).abi_encode_params().into());
            }
            return Err(AccountError::MissingFallbackHandler(selector));
        };

        let mut forwarded = Vec::with_capacity(data.len() + 20);
        forwarded.extend_from_slice(data);
        forwarded.extend_from_slice(ctx.sender.as_slice());
        let forwarded = Bytes::from(forwarded);

        let handler = entry.handler;
        debug!(
            target: "modular-account",
            selector = %selector,
            handler = %handler,
            call_type = ?entry.call_type,
            "Routing fallback call"
        );
        let failed = |reason| AccountError::FallbackCallFailed { handler, reason };
        match entry.call_type {
            CallType::Static => {
                self.host().static_call(self.address(), handler, &forwarded).map_err(failed)
            }
            _ => self.with_hook(ctx, data, || {
                self.host().call(self.address(), handler, U256::ZERO, &forwarded).map_err(failed)
            }),
        }
    }
}
