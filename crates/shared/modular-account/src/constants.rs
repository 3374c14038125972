//! Canonical addresses, magic values and the fallback selector deny-list.

use alloy_primitives::{Address, B256, FixedBytes, U256, address, b256, fixed_bytes};
use alloy_sol_types::SolCall;

use crate::abi::{IERC721Receiver, IERC1155Receiver, IModularAccount, IModule};

/// Marker entry of the validator and executor lists.
pub const SENTINEL: Address = address!("0x0000000000000000000000000000000000000001");

/// The canonical address of the v0.7 `EntryPoint` contract.
pub const ENTRYPOINT_V07_ADDRESS: Address =
    address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Validation data returned for a successfully validated user operation.
pub const VALIDATION_SUCCESS: U256 = U256::ZERO;

/// Validation data returned for a user operation that failed validation.
pub const VALIDATION_FAILED: U256 = U256::from_limbs([1, 0, 0, 0]);

/// ERC-1271 `isValidSignature` success value.
pub const ERC1271_MAGIC_VALUE: FixedBytes<4> = fixed_bytes!("1626ba7e");

/// ERC-1271 failure sentinel.
pub const ERC1271_INVALID: FixedBytes<4> = fixed_bytes!("ffffffff");

/// Hash that, paired with an empty signature, asks for ERC-7739 support.
pub const ERC7739_DISCOVERY_HASH: B256 =
    b256!("7739773977397739773977397739773977397739773977397739773977397739");

/// Leading bytes of every ERC-7739 support response.
pub const ERC7739_SUPPORT_PREFIX: [u8; 2] = [0x77, 0x39];

/// Default emergency uninstall timelock (one day).
pub const DEFAULT_EMERGENCY_TIMELOCK_SECS: u64 = 86_400;

/// Identifier reported by `accountId()`.
pub const ACCOUNT_ID: &str = "base.modular-account.0.1.0";

/// Receiver callbacks the account answers itself when no handler is installed.
pub const RECEIVER_SELECTORS: [[u8; 4]; 3] = [
    IERC721Receiver::onERC721ReceivedCall::SELECTOR,
    IERC1155Receiver::onERC1155ReceivedCall::SELECTOR,
    IERC1155Receiver::onERC1155BatchReceivedCall::SELECTOR,
];

/// Selectors that can never be routed to a fallback handler.
pub const FORBIDDEN_FALLBACK_SELECTORS: [[u8; 4]; 22] = [
    IModule::onInstallCall::SELECTOR,
    IModule::onUninstallCall::SELECTOR,
    IModularAccount::initializeAccountCall::SELECTOR,
    IModularAccount::executeCall::SELECTOR,
    IModularAccount::executeFromExecutorCall::SELECTOR,
    IModularAccount::installModuleCall::SELECTOR,
    IModularAccount::uninstallModuleCall::SELECTOR,
    IModularAccount::isModuleInstalledCall::SELECTOR,
    IModularAccount::validateUserOpCall::SELECTOR,
    IModularAccount::isValidSignatureCall::SELECTOR,
    IModularAccount::supportsExecutionModeCall::SELECTOR,
    IModularAccount::supportsModuleCall::SELECTOR,
    IModularAccount::accountIdCall::SELECTOR,
    IModularAccount::emergencyUninstallHookCall::SELECTOR,
    IModularAccount::onRedelegationCall::SELECTOR,
    IModularAccount::getValidatorsPaginatedCall::SELECTOR,
    IModularAccount::getExecutorsPaginatedCall::SELECTOR,
    IModularAccount::getActiveHookCall::SELECTOR,
    IModularAccount::getFallbackHandlerBySelectorCall::SELECTOR,
    IERC721Receiver::onERC721ReceivedCall::SELECTOR,
    IERC1155Receiver::onERC1155ReceivedCall::SELECTOR,
    IERC1155Receiver::onERC1155BatchReceivedCall::SELECTOR,
];

/// Account entry points that never change state.
pub const VIEW_SELECTORS: [[u8; 4]; 9] = [
    IModularAccount::isModuleInstalledCall::SELECTOR,
    IModularAccount::isValidSignatureCall::SELECTOR,
    IModularAccount::supportsExecutionModeCall::SELECTOR,
    IModularAccount::supportsModuleCall::SELECTOR,
    IModularAccount::accountIdCall::SELECTOR,
    IModularAccount::getValidatorsPaginatedCall::SELECTOR,
    IModularAccount::getExecutorsPaginatedCall::SELECTOR,
    IModularAccount::getActiveHookCall::SELECTOR,
    IModularAccount::getFallbackHandlerBySelectorCall::SELECTOR,
];

/// Returns true if `selector` may never be registered as a fallback.
pub fn is_forbidden_fallback_selector(selector: FixedBytes<4>) -> bool {
    FORBIDDEN_FALLBACK_SELECTORS.iter().any(|forbidden| selector.0 == *forbidden)
}

/// Returns true if `selector` is one of the token receiver callbacks.
pub fn is_receiver_selector(selector: FixedBytes<4>) -> bool {
    RECEIVER_SELECTORS.iter().any(|receiver| selector.0 == *receiver)
}
