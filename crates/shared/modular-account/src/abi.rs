//! Account ABI Definitions
//!
//! Solidity-compatible structs and interfaces for the account surface, the module
//! callbacks and the EIP-712 payloads signed by validators.

use alloy_sol_types::sol;

sol! {
    /// PackedUserOperation as delivered by an EntryPoint v0.7+
    /// Gas limits and fees are packed into bytes32 values
    #[derive(Debug, Default, PartialEq, Eq)]
    struct PackedUserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        bytes32 accountGasLimits;  // verificationGasLimit (16 bytes) | callGasLimit (16 bytes)
        uint256 preVerificationGas;
        bytes32 gasFees;           // maxPriorityFeePerGas (16 bytes) | maxFeePerGas (16 bytes)
        bytes paymasterAndData;
        bytes signature;
    }

    /// One call of a batch execution
    #[derive(Debug, Default, PartialEq, Eq)]
    struct Execution {
        address target;
        uint256 value;
        bytes callData;
    }

    /// EIP-712 payload authorizing a module install inside a user operation
    #[derive(Debug, Default, PartialEq, Eq)]
    struct ModuleEnableMode {
        address module;
        uint256 moduleType;
        bytes32 userOpHash;
        bytes initData;
    }

    /// EIP-712 payload authorizing a timelocked forced hook removal
    #[derive(Debug, Default, PartialEq, Eq)]
    struct EmergencyUninstall {
        address hook;
        uint256 hookType;
        bytes deInitData;
        uint256 nonce;
    }

    /// A module and its install payload used during account bootstrap
    #[derive(Debug, Default, PartialEq, Eq)]
    struct BootstrapModule {
        address module;
        bytes data;
    }

    /// A pre-validation hook and its install payload used during account bootstrap
    #[derive(Debug, Default, PartialEq, Eq)]
    struct BootstrapPreValidationHook {
        uint256 hookType;
        address module;
        bytes data;
    }

    /// Initial module set of a freshly deployed account
    #[derive(Debug, Default, PartialEq, Eq)]
    struct BootstrapConfig {
        bytes defaultValidatorInitData;
        BootstrapModule[] validators;
        BootstrapModule[] executors;
        BootstrapModule hook;
        BootstrapModule[] fallbacks;
        BootstrapPreValidationHook[] preValidationHooks;
    }

    /// Callbacks every module exposes
    interface IModule {
        function onInstall(bytes calldata data) external;
        function onUninstall(bytes calldata data) external;
        function isModuleType(uint256 moduleTypeId) external view returns (bool);
    }

    /// The account surface
    interface IModularAccount {
        function initializeAccount(BootstrapConfig calldata bootstrap) external payable;

        function execute(bytes32 mode, bytes calldata executionCalldata) external payable;

        function executeFromExecutor(
            bytes32 mode,
            bytes calldata executionCalldata
        ) external payable returns (bytes[] memory returnData);

        function installModule(uint256 moduleTypeId, address module, bytes calldata initData) external payable;

        function uninstallModule(uint256 moduleTypeId, address module, bytes calldata deInitData) external payable;

        function isModuleInstalled(
            uint256 moduleTypeId,
            address module,
            bytes calldata additionalContext
        ) external view returns (bool);

        function validateUserOp(
            PackedUserOperation calldata userOp,
            bytes32 userOpHash,
            uint256 missingAccountFunds
        ) external returns (uint256 validationData);

        function isValidSignature(bytes32 hash, bytes calldata signature) external view returns (bytes4);

        function supportsExecutionMode(bytes32 mode) external view returns (bool);

        function supportsModule(uint256 moduleTypeId) external view returns (bool);

        function accountId() external view returns (string memory);

        function emergencyUninstallHook(EmergencyUninstall calldata request, bytes calldata signature) external payable;

        function onRedelegation() external payable;

        function getValidatorsPaginated(
            address cursor,
            uint256 size
        ) external view returns (address[] memory array, address next);

        function getExecutorsPaginated(
            address cursor,
            uint256 size
        ) external view returns (address[] memory array, address next);

        function getActiveHook() external view returns (address hook);

        function getFallbackHandlerBySelector(bytes4 selector) external view returns (bytes1 callType, address handler);
    }

    /// ERC-721 receiver callback
    interface IERC721Receiver {
        function onERC721Received(
            address operator,
            address from,
            uint256 tokenId,
            bytes calldata data
        ) external returns (bytes4);
    }

    /// ERC-1155 receiver callbacks
    interface IERC1155Receiver {
        function onERC1155Received(
            address operator,
            address from,
            uint256 id,
            uint256 value,
            bytes calldata data
        ) external returns (bytes4);

        function onERC1155BatchReceived(
            address operator,
            address from,
            uint256[] calldata ids,
            uint256[] calldata values,
            bytes calldata data
        ) external returns (bytes4);
    }
}
