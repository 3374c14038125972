//! User operation nonce layout.
//!
//! ```text
//! | batch id (3) | mode (1) | validator (20) | sequence (8) |
//! |<----------------- key (24) -------------->|
//! ```
//!
//! The EntryPoint owns sequencing; the account only reads the key half to learn
//! which validator governs the operation and whether module enable mode is on.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Mode byte for plain validation.
pub const MODE_VALIDATION: u8 = 0x00;

/// Mode byte for module enable mode.
pub const MODE_MODULE_ENABLE: u8 = 0x01;

/// How the account validates an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationMode {
    /// The validator in the nonce checks the signature as-is.
    Validate,
    /// The signature carries a module to install before validation.
    ModuleEnable,
}

/// A decoded view over a 256-bit user operation nonce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonce(U256);

impl Nonce {
    /// Builds a nonce for `validator` with the given mode and sequence.
    pub fn new(mode: ValidationMode, validator: Address, sequence: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[3] = match mode {
            ValidationMode::Validate => MODE_VALIDATION,
            ValidationMode::ModuleEnable => MODE_MODULE_ENABLE,
        };
        bytes[4..24].copy_from_slice(validator.as_slice());
        bytes[24..32].copy_from_slice(&sequence.to_be_bytes());
        Self(U256::from_be_bytes(bytes))
    }

    /// Sets the free batch bits.
    pub fn with_batch_id(self, batch_id: [u8; 3]) -> Self {
        let mut bytes = self.0.to_be_bytes::<32>();
        bytes[..3].copy_from_slice(&batch_id);
        Self(U256::from_be_bytes(bytes))
    }

    /// Returns the validation mode. Unknown mode bytes validate normally.
    pub fn mode(&self) -> ValidationMode {
        match self.0.to_be_bytes::<32>()[3] {
            MODE_MODULE_ENABLE => ValidationMode::ModuleEnable,
            _ => ValidationMode::Validate,
        }
    }

    /// Returns the validator embedded in the key. Zero selects the default validator.
    pub fn validator(&self) -> Address {
        Address::from_slice(&self.0.to_be_bytes::<32>()[4..24])
    }

    /// Returns the free batch bits.
    pub fn batch_id(&self) -> [u8; 3] {
        let bytes = self.0.to_be_bytes::<32>();
        [bytes[0], bytes[1], bytes[2]]
    }

    /// Returns the 192-bit key the EntryPoint sequences by.
    pub fn key(&self) -> U256 {
        self.0 >> 64
    }

    /// Returns the 64-bit sequence number.
    pub fn sequence(&self) -> u64 {
        self.0.as_limbs()[0]
    }

    /// Returns the raw nonce.
    pub const fn into_inner(self) -> U256 {
        self.0
    }
}

impl From<U256> for Nonce {
    fn from(raw: U256) -> Self {
        Self(raw)
    }
}

impl From<Nonce> for U256 {
    fn from(nonce: Nonce) -> Self {
        nonce.0
    }
}
