//! Validation pipeline.
//!
//! User operations pick their validator through the nonce key. In module enable
//! mode the signature additionally carries a module to install, authorized by an
//! EIP-712 signature of a second validator, before the operation itself is
//! validated. ERC-1271 checks take the validator from the first 20 bytes of the
//! signature and never fail: every problem maps to [`ERC1271_INVALID`].

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256};
use alloy_sol_types::SolStruct;
use tracing::{debug, info};

use crate::{
    abi::{EmergencyUninstall, ModuleEnableMode, PackedUserOperation},
    account::SmartAccount,
    constants::{
        ERC1271_INVALID, ERC1271_MAGIC_VALUE, ERC7739_DISCOVERY_HASH, ERC7739_SUPPORT_PREFIX,
        VALIDATION_FAILED,
    },
    error::{AccountError, AccountResult},
    host::Host,
    nonce::{Nonce, ValidationMode},
    types::PreValidationHookKind,
};

/// The module enable mode payload packed in front of a user operation signature.
///
/// Layout: `module (20) ‖ moduleType (4) ‖ initLen (4) ‖ initData ‖ sigLen (4) ‖
/// enableSig ‖ userOpSignature`, lengths big-endian. `enableSig` starts with the
/// 20-byte address of the validator that authorizes the install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnableModeData {
    /// Module to install.
    pub module: Address,
    /// Type to install the module under.
    pub module_type: u32,
    /// Install payload.
    pub init_data: Bytes,
    /// `validator ‖ signature` over the [`ModuleEnableMode`] digest.
    pub enable_signature: Bytes,
    /// Signature the operation's validator checks afterwards.
    pub user_op_signature: Bytes,
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> AccountResult<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or(AccountError::InvalidEnableModeData)?;
        let bytes = self.data.get(self.offset..end).ok_or(AccountError::InvalidEnableModeData)?;
        self.offset = end;
        Ok(bytes)
    }

    fn take_u32(&mut self) -> AccountResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}

impl EnableModeData {
    /// Parses an enable mode signature.
    pub fn parse(signature: &[u8]) -> AccountResult<Self> {
        let mut reader = Reader { data: signature, offset: 0 };
        let module = Address::from_slice(reader.take(20)?);
        let module_type = reader.take_u32()?;
        let init_len = reader.take_u32()? as usize;
        let init_data = Bytes::copy_from_slice(reader.take(init_len)?);
        let sig_len = reader.take_u32()? as usize;
        let enable_signature = Bytes::copy_from_slice(reader.take(sig_len)?);
        let user_op_signature = Bytes::copy_from_slice(reader.rest());
        Ok(Self { module, module_type, init_data, enable_signature, user_op_signature })
    }

    /// Packs the payload back into signature form.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(
            32 + self.init_data.len() + self.enable_signature.len() + self.user_op_signature.len(),
        );
        out.extend_from_slice(self.module.as_slice());
        out.extend_from_slice(&self.module_type.to_be_bytes());
        out.extend_from_slice(&(self.init_data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.init_data);
        out.extend_from_slice(&(self.enable_signature.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.enable_signature);
        out.extend_from_slice(&self.user_op_signature);
        out.into()
    }
}

/// Splits `validator ‖ signature`.
fn split_validator_signature(signature: &[u8]) -> Option<(Address, Bytes)> {
    (signature.len() >= 20).then(|| {
        (Address::from_slice(&signature[..20]), Bytes::copy_from_slice(&signature[20..]))
    })
}

impl<H: Host> SmartAccount<H> {
    /// EIP-712 digest a validator signs to authorize an enable mode install.
    pub fn enable_mode_digest(
        &self,
        module: Address,
        module_type: u32,
        user_op_hash: B256,
        init_data: &Bytes,
    ) -> B256 {
        ModuleEnableMode {
            module,
            moduleType: U256::from(module_type),
            userOpHash: user_op_hash,
            initData: init_data.clone(),
        }
        .eip712_signing_hash(&self.config().eip712_domain(self.address()))
    }

    /// EIP-712 digest a validator signs to authorize an emergency hook uninstall.
    pub fn emergency_uninstall_digest(&self, request: &EmergencyUninstall) -> B256 {
        request.eip712_signing_hash(&self.config().eip712_domain(self.address()))
    }

    /// Maps a nonce validator to an installed validator. Zero selects the default.
    pub(crate) fn resolve_validator(&self, validator: Address) -> AccountResult<Address> {
        if validator.is_zero() {
            return Ok(self.config().default_validator);
        }
        if !self.storage().validators.contains(validator) {
            return Err(AccountError::ValidatorNotInstalled(validator));
        }
        Ok(validator)
    }

    /// Asks `validator` whether `signature` is valid for `hash`.
    pub(crate) fn validator_accepts(
        &self,
        validator: Address,
        hash: B256,
        signature: &Bytes,
    ) -> bool {
        self.host()
            .module(validator)
            .and_then(|module| {
                module
                    .as_validator()?
                    .is_valid_signature_with_sender(self.address(), self.address(), hash, signature)
                    .ok()
            })
            .is_some_and(|result| result == ERC1271_MAGIC_VALUE)
    }

    pub(crate) fn validate_user_op_inner(
        &self,
        user_op: &PackedUserOperation,
        user_op_hash: B256,
        missing_account_funds: U256,
    ) -> AccountResult<U256> {
        let nonce = Nonce::from(user_op.nonce);
        let mut user_op = user_op.clone();

        if nonce.mode() == ValidationMode::ModuleEnable {
            let enable = EnableModeData::parse(&user_op.signature)?;
            if !self.check_enable_mode_signature(&enable, user_op_hash) {
                info!(
                    target: "modular-account",
                    module = %enable.module,
                    module_type = enable.module_type,
                    "Enable mode signature rejected"
                );
                return Ok(VALIDATION_FAILED);
            }
            self.install_module_inner(
                U256::from(enable.module_type),
                enable.module,
                &enable.init_data,
            )?;
            info!(
                target: "modular-account",
                module = %enable.module,
                module_type = enable.module_type,
                "Module enabled during validation"
            );
            user_op.signature = enable.user_op_signature;
        }

        let validator = self.resolve_validator(nonce.validator())?;

        let mut hash = user_op_hash;
        let pre_hook = self.pre_validation_hook(PreValidationHookKind::UserOpValidation);
        if let Some(hook) = pre_hook {
            let module = self.resolve_module(hook)?;
            let pre_validation =
                module.as_pre_validation_hook().ok_or(AccountError::InvalidModule(hook))?;
            let (new_hash, new_signature) = pre_validation
                .pre_validation_hook_erc4337(self.address(), &user_op, missing_account_funds, hash)
                .map_err(|reason| AccountError::PreValidationHookFailed { hook, reason })?;
            hash = new_hash;
            user_op.signature = new_signature;
        }

        let module = self.resolve_module(validator)?;
        let validator_module =
            module.as_validator().ok_or(AccountError::InvalidModule(validator))?;
        let validation_data = validator_module
            .validate_user_op(self.address(), &user_op, hash)
            .map_err(|reason| AccountError::ValidatorCallFailed { validator, reason })?;
        debug!(
            target: "modular-account",
            validator = %validator,
            validation_data = %validation_data,
            "User operation validated"
        );
        Ok(validation_data)
    }

    fn check_enable_mode_signature(&self, enable: &EnableModeData, user_op_hash: B256) -> bool {
        let Some((validator, signature)) = split_validator_signature(&enable.enable_signature)
        else {
            return false;
        };
        let Ok(validator) = self.resolve_validator(validator) else {
            return false;
        };
        let digest = self.enable_mode_digest(
            enable.module,
            enable.module_type,
            user_op_hash,
            &enable.init_data,
        );
        self.validator_accepts(validator, digest, &signature)
    }

    pub(crate) fn is_valid_signature_inner(
        &self,
        sender: Address,
        hash: B256,
        signature: &Bytes,
    ) -> FixedBytes<4> {
        if signature.is_empty() && hash == ERC7739_DISCOVERY_HASH {
            return self.erc7739_support(sender, hash);
        }
        self.check_signature(sender, hash, signature).unwrap_or(ERC1271_INVALID)
    }

    fn check_signature(
        &self,
        sender: Address,
        hash: B256,
        signature: &Bytes,
    ) -> Option<FixedBytes<4>> {
        let (validator, mut signature) = split_validator_signature(signature)?;
        let validator = self.resolve_validator(validator).ok()?;

        let mut hash = hash;
        if let Some(hook) = self.pre_validation_hook(PreValidationHookKind::SignatureVerification) {
            let module = self.host().module(hook)?;
            (hash, signature) = module
                .as_pre_validation_hook()?
                .pre_validation_hook_erc1271(self.address(), sender, hash, &signature)
                .ok()?;
        }

        let module = self.host().module(validator)?;
        let result = module
            .as_validator()?
            .is_valid_signature_with_sender(self.address(), sender, hash, &signature)
            .ok()?;
        (result == ERC1271_MAGIC_VALUE).then_some(ERC1271_MAGIC_VALUE)
    }

    /// Returns the highest ERC-7739 support response of any installed validator
    /// or the default validator.
    fn erc7739_support(&self, sender: Address, hash: B256) -> FixedBytes<4> {
        let validators: Vec<Address> = self.storage().validators.iter().collect();
        validators
            .into_iter()
            .chain(std::iter::once(self.config().default_validator))
            .filter_map(|validator| {
                let module = self.host().module(validator)?;
                module
                    .as_validator()?
                    .is_valid_signature_with_sender(self.address(), sender, hash, &Bytes::new())
                    .ok()
            })
            .filter(|response| response[..2] == ERC7739_SUPPORT_PREFIX)
            .max()
            .unwrap_or(ERC1271_INVALID)
    }
}
