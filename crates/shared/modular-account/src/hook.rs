//! Hook guard around state-changing entry points.

use alloy_primitives::Bytes;
use tracing::debug;

use crate::{
    account::SmartAccount,
    error::{AccountError, AccountResult},
    host::{CallContext, Host},
};

impl<H: Host> SmartAccount<H> {
    /// Runs `op` between the active hook's pre and post checks.
    ///
    /// Without a hook, or when the hook itself is calling, `op` runs unguarded.
    /// The post check goes to the hook that was active when the call started.
    pub(crate) fn with_hook<T>(
        &self,
        ctx: CallContext,
        msg_data: &Bytes,
        op: impl FnOnce() -> AccountResult<T>,
    ) -> AccountResult<T> {
        let active = self.storage().hook;
        let Some(hook) = active.filter(|hook| *hook != ctx.sender) else {
            return op();
        };

        let module = self.resolve_module(hook)?;
        let guard = module.as_hook().ok_or(AccountError::InvalidModule(hook))?;

        let context = guard
            .pre_check(self.address(), ctx.sender, ctx.value, msg_data)
            .map_err(|reason| AccountError::HookPreCheckFailed { hook, reason })?;
        debug!(
            target: "modular-account",
            hook = %hook,
            sender = %ctx.sender,
            "Hook pre-check passed"
        );

        let result = op()?;

        guard
            .post_check(self.address(), &context)
            .map_err(|reason| AccountError::HookPostCheckFailed { hook, reason })?;
        Ok(result)
    }
}
