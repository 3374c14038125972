//! EIP-7702 delegation designators.
//!
//! An EOA that delegated to an implementation carries `0xef0100 || implementation`
//! as its code. The account treats such code as delegated identity mode.

use alloy_primitives::{Address, Bytes};

/// EIP-7702 delegation prefix
pub const EIP7702_DELEGATION_PREFIX: [u8; 3] = [0xef, 0x01, 0x00];

/// Length of a delegation designator
pub const EIP7702_DESIGNATOR_LEN: usize = 23;

/// Check if code represents an EIP-7702 delegation
pub fn is_eip7702_delegation(code: &Bytes) -> bool {
    code.len() == EIP7702_DESIGNATOR_LEN && code.starts_with(&EIP7702_DELEGATION_PREFIX)
}

/// Extract the delegate address from EIP-7702 delegation code
pub fn get_eip7702_delegate(code: &Bytes) -> Option<Address> {
    is_eip7702_delegation(code).then(|| Address::from_slice(&code[3..]))
}

/// Builds the designator installed by delegating to `implementation`.
pub fn delegation_designator(implementation: Address) -> Bytes {
    let mut code = Vec::with_capacity(EIP7702_DESIGNATOR_LEN);
    code.extend_from_slice(&EIP7702_DELEGATION_PREFIX);
    code.extend_from_slice(implementation.as_slice());
    code.into()
}
