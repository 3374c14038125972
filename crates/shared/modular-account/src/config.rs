//! Account configuration
//!
//! Immutable deployment parameters of an account: the EntryPoint it trusts, the
//! default validator it falls back to, the emergency timelock and the EIP-712
//! domain its validators sign under. Parameters are provided via CLI flags and
//! validated into an [`AccountConfig`].

use alloy_primitives::{Address, U256};
use alloy_sol_types::Eip712Domain;
use thiserror::Error;

use crate::constants::{DEFAULT_EMERGENCY_TIMELOCK_SECS, ENTRYPOINT_V07_ADDRESS};

/// Errors that can occur when validating config
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Default chain id used by the EIP-712 domain.
const DEFAULT_CHAIN_ID: u64 = 1;

/// Default EIP-712 domain name.
const DEFAULT_DOMAIN_NAME: &str = "ModularAccount";

/// Default EIP-712 domain version.
const DEFAULT_DOMAIN_VERSION: &str = "1.0.0";

/// Modular account CLI arguments
///
/// # Example usage:
///
/// ```bash
/// base-account \
///     --account.default-validator 0x1111111111111111111111111111111111111111 \
///     --account.chain-id 8453 \
///     --account.emergency-timelock 86400
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::Args)]
#[command(next_help_heading = "Modular Account")]
pub struct AccountArgs {
    /// EntryPoint allowed to validate and execute user operations
    #[arg(long = "account.entry-point", default_value_t = ENTRYPOINT_V07_ADDRESS)]
    pub entry_point: Address,

    /// Validator used when a nonce names no validator
    #[arg(long = "account.default-validator")]
    pub default_validator: Address,

    /// Chain id of the EIP-712 domain
    #[arg(long = "account.chain-id", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    /// Seconds an emergency hook uninstall request must wait
    #[arg(
        long = "account.emergency-timelock",
        default_value_t = DEFAULT_EMERGENCY_TIMELOCK_SECS
    )]
    pub emergency_timelock: u64,

    /// EIP-712 domain name
    #[arg(long = "account.name", default_value = DEFAULT_DOMAIN_NAME)]
    pub domain_name: String,

    /// EIP-712 domain version
    #[arg(long = "account.version", default_value = DEFAULT_DOMAIN_VERSION)]
    pub domain_version: String,
}

impl AccountArgs {
    /// Validate the arguments and build an [`AccountConfig`].
    pub fn validate(&self) -> Result<AccountConfig, ConfigError> {
        if self.entry_point.is_zero() {
            return Err(ConfigError::ValidationError(
                "--account.entry-point cannot be the zero address".to_string(),
            ));
        }
        if self.default_validator.is_zero() {
            return Err(ConfigError::ValidationError(
                "--account.default-validator is required".to_string(),
            ));
        }
        if self.chain_id == 0 {
            return Err(ConfigError::ValidationError(
                "--account.chain-id must be non-zero".to_string(),
            ));
        }
        if self.emergency_timelock == 0 {
            return Err(ConfigError::ValidationError(
                "--account.emergency-timelock must be non-zero".to_string(),
            ));
        }
        if self.domain_name.trim().is_empty() {
            return Err(ConfigError::ValidationError("--account.name cannot be empty".to_string()));
        }

        Ok(AccountConfig {
            entry_point: self.entry_point,
            default_validator: self.default_validator,
            chain_id: self.chain_id,
            emergency_timelock: self.emergency_timelock,
            domain_name: self.domain_name.clone(),
            domain_version: self.domain_version.clone(),
        })
    }
}

/// Validated, immutable account parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    /// Trusted EntryPoint.
    pub entry_point: Address,
    /// Validator used when a nonce or signature names none.
    pub default_validator: Address,
    /// Chain id of the EIP-712 domain.
    pub chain_id: u64,
    /// Emergency uninstall timelock in seconds.
    pub emergency_timelock: u64,
    /// EIP-712 domain name.
    pub domain_name: String,
    /// EIP-712 domain version.
    pub domain_version: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            entry_point: ENTRYPOINT_V07_ADDRESS,
            default_validator: Address::ZERO,
            chain_id: DEFAULT_CHAIN_ID,
            emergency_timelock: DEFAULT_EMERGENCY_TIMELOCK_SECS,
            domain_name: DEFAULT_DOMAIN_NAME.to_string(),
            domain_version: DEFAULT_DOMAIN_VERSION.to_string(),
        }
    }
}

impl AccountConfig {
    /// Set the trusted EntryPoint.
    pub fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// Set the default validator.
    pub fn with_default_validator(mut self, validator: Address) -> Self {
        self.default_validator = validator;
        self
    }

    /// Set the EIP-712 chain id.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set the emergency uninstall timelock.
    pub fn with_emergency_timelock(mut self, seconds: u64) -> Self {
        self.emergency_timelock = seconds;
        self
    }

    /// The EIP-712 domain validators sign under for the account at `account`.
    pub fn eip712_domain(&self, account: Address) -> Eip712Domain {
        Eip712Domain::new(
            Some(self.domain_name.clone().into()),
            Some(self.domain_version.clone().into()),
            Some(U256::from(self.chain_id)),
            Some(account),
            None,
        )
    }
}
