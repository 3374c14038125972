//! End-to-end behavior of an account deployed on the in-memory host.

use std::rc::Rc;

use alloy_primitives::{Address, B256, Bytes, U256, fixed_bytes};
use alloy_sol_types::{SolCall, SolValue};
use base_modular_account::{
    AccountError, AccountEvent, CallContext, CallResult, CallType, EmergencyUninstallStatus,
    EnableModeData, ExecType, ExecutionMode, Host, InMemoryHost, Module, ModuleType, Nonce,
    PreValidationHookKind, ValidationMode,
    abi::{
        BootstrapConfig, BootstrapModule, EmergencyUninstall, Execution, IERC721Receiver,
        IModularAccount, PackedUserOperation,
    },
    constants::{
        ERC1271_INVALID, ERC1271_MAGIC_VALUE, ERC7739_DISCOVERY_HASH, FORBIDDEN_FALLBACK_SELECTORS,
        SENTINEL, VALIDATION_FAILED, VALIDATION_SUCCESS,
    },
    delegation_designator,
    execution::{encode_batch, encode_delegate, encode_single},
    host::{Contract, Frame},
    test_utils::{
        ACCOUNT, Counter, DEFAULT_VALIDATOR, Echo, MockExecutor, MockHook, MockMultiTypeModule,
        MockPreValidationHook, MockValidator, Reverter, START_TIME, TestAccount, VALIDATOR,
    },
};
use rstest::rstest;

const COUNTER: Address = Address::repeat_byte(0xc0);
const REVERTER: Address = Address::repeat_byte(0xc1);
const ECHO: Address = Address::repeat_byte(0xc2);
const HOOK: Address = Address::repeat_byte(0x40);
const EXECUTOR: Address = Address::repeat_byte(0x30);
const SECOND_VALIDATOR: Address = Address::repeat_byte(0x33);
const SECOND_KEY: B256 = B256::repeat_byte(0x34);
const USER_OP_HASH: B256 = B256::repeat_byte(0x99);
const OTHER_EXECUTOR: Address = Address::repeat_byte(0x31);

/// Executor code that installs another executor through the account, then reverts.
struct ReenteringExecutor;

impl Contract for ReenteringExecutor {
    fn call(&self, host: &InMemoryHost, frame: &Frame, _data: &Bytes) -> CallResult {
        let install = IModularAccount::installModuleCall {
            moduleTypeId: id(ModuleType::Executor),
            module: OTHER_EXECUTOR,
            initData: Bytes::new(),
        }
        .abi_encode();
        let reenter = IModularAccount::executeFromExecutorCall {
            mode: single().raw(),
            executionCalldata: encode_single(ACCOUNT, U256::ZERO, &install),
        }
        .abi_encode();
        host.call(frame.address, ACCOUNT, U256::ZERO, &reenter.into())?;
        Err(Bytes::from_static(b"boom"))
    }
}

fn harness() -> TestAccount {
    let harness = TestAccount::initialized();
    harness.host.deploy(COUNTER, Rc::new(Counter));
    harness.host.deploy(REVERTER, Rc::new(Reverter));
    harness.host.deploy(ECHO, Rc::new(Echo));
    harness
}

fn id(module_type: ModuleType) -> U256 {
    module_type.into()
}

fn list_removal(prev: Address) -> Bytes {
    (prev, Bytes::new()).abi_encode_params().into()
}

fn single() -> ExecutionMode {
    ExecutionMode::new(CallType::Single, ExecType::Default)
}

fn batch(exec_type: ExecType) -> ExecutionMode {
    ExecutionMode::new(CallType::Batch, exec_type)
}

fn call(target: Address) -> Execution {
    Execution { target, value: U256::ZERO, callData: Bytes::new() }
}

fn install_hook(harness: &TestAccount) -> Rc<MockHook> {
    let hook = Rc::new(MockHook::default());
    harness.host.register_module(HOOK, hook.clone());
    harness
        .account
        .install_module(harness.entry_point(), id(ModuleType::Hook), HOOK, &Bytes::new())
        .unwrap();
    hook
}

fn install_second_validator(harness: &TestAccount) -> Rc<MockValidator> {
    let validator = Rc::new(MockValidator::new(SECOND_KEY));
    harness.host.register_module(SECOND_VALIDATOR, validator.clone());
    harness
        .account
        .install_module(
            harness.entry_point(),
            id(ModuleType::Validator),
            SECOND_VALIDATOR,
            &Bytes::from_static(&[1]),
        )
        .unwrap();
    validator
}

fn user_op(nonce: Nonce, signature: Bytes) -> PackedUserOperation {
    PackedUserOperation { sender: ACCOUNT, nonce: nonce.into(), signature, ..Default::default() }
}

fn validate(harness: &TestAccount, op: &PackedUserOperation) -> Result<U256, AccountError> {
    harness.account.validate_user_op(harness.entry_point(), op, USER_OP_HASH, U256::ZERO)
}

fn emergency_request(nonce: u64) -> EmergencyUninstall {
    EmergencyUninstall {
        hook: HOOK,
        hookType: id(ModuleType::Hook),
        deInitData: Bytes::new(),
        nonce: U256::from(nonce),
    }
}

fn request_emergency_uninstall(
    harness: &TestAccount,
    nonce: u64,
) -> Result<EmergencyUninstallStatus, AccountError> {
    let request = emergency_request(nonce);
    let signature = harness.signature(harness.account.emergency_uninstall_digest(&request));
    harness.account.emergency_uninstall_hook(
        CallContext::from_sender(Address::repeat_byte(0xee)),
        &request,
        &signature,
    )
}

#[test]
fn test_initialization_is_one_shot() {
    let harness = harness();
    assert!(harness.account.is_initialized());
    assert_eq!(harness.account.validators(), vec![VALIDATOR]);
    assert_eq!(
        harness.account.events(),
        vec![AccountEvent::ModuleInstalled {
            module_type: ModuleType::Validator,
            module: VALIDATOR
        }]
    );

    let result = harness.account.initialize_account(harness.entry_point(), &Default::default());
    assert!(matches!(result, Err(AccountError::AccountAlreadyInitialized)));
}

#[test]
fn test_initialization_requires_a_configured_validator() {
    let harness = TestAccount::new();
    let bootstrap = BootstrapConfig {
        validators: vec![BootstrapModule { module: VALIDATOR, data: Bytes::new() }],
        ..Default::default()
    };
    let result = harness.account.initialize_account(harness.entry_point(), &bootstrap);
    assert!(matches!(result, Err(AccountError::NoValidatorInstalled)));
    assert!(!harness.account.is_initialized());
    assert!(harness.account.events().is_empty());
    assert!(harness.account.validators().is_empty());
}

#[test]
fn test_initialization_with_default_validator_only() {
    let harness = TestAccount::new();
    let bootstrap = BootstrapConfig {
        defaultValidatorInitData: Bytes::from_static(&[1]),
        ..Default::default()
    };
    harness.account.initialize_account(harness.entry_point(), &bootstrap).unwrap();
    assert!(harness.account.validators().is_empty());
    assert!(harness.default_validator.is_initialized(ACCOUNT));
}

#[test]
fn test_install_requires_entry_point_or_self() {
    let harness = harness();
    let stranger = CallContext::from_sender(Address::repeat_byte(0x66));
    let result = harness.account.install_module(
        stranger,
        id(ModuleType::Validator),
        SECOND_VALIDATOR,
        &Bytes::new(),
    );
    let err = result.unwrap_err();
    assert!(err.is_authorization_error());
    assert!(harness.account.install_module(
        harness.self_call(),
        id(ModuleType::Executor),
        harness.register(EXECUTOR, MockExecutor::default()),
        &Bytes::new(),
    )
    .is_ok());
}

#[test]
fn test_duplicate_validator_is_rejected() {
    let harness = harness();
    let err = harness
        .account
        .install_module(
            harness.entry_point(),
            id(ModuleType::Validator),
            VALIDATOR,
            &Bytes::from_static(&[1]),
        )
        .unwrap_err();
    assert!(err.is_structural_conflict());
    assert_eq!(harness.account.validators(), vec![VALIDATOR]);
}

#[test]
fn test_last_validator_cannot_be_removed() {
    let harness = harness();
    let result = harness.account.uninstall_module(
        harness.entry_point(),
        id(ModuleType::Validator),
        VALIDATOR,
        &list_removal(SENTINEL),
    );
    assert!(matches!(result, Err(AccountError::CanNotRemoveLastValidator)));
    assert_eq!(harness.account.validators(), vec![VALIDATOR]);

    install_second_validator(&harness);
    assert_eq!(harness.account.validators(), vec![SECOND_VALIDATOR, VALIDATOR]);
    harness
        .account
        .uninstall_module(
            harness.entry_point(),
            id(ModuleType::Validator),
            VALIDATOR,
            &list_removal(SECOND_VALIDATOR),
        )
        .unwrap();
    assert_eq!(harness.account.validators(), vec![SECOND_VALIDATOR]);
}

#[test]
fn test_later_validator_removed_before_first() {
    let harness = harness();
    install_second_validator(&harness);

    harness
        .account
        .uninstall_module(
            harness.entry_point(),
            id(ModuleType::Validator),
            SECOND_VALIDATOR,
            &list_removal(SENTINEL),
        )
        .unwrap();
    assert!(!harness.account.is_module_installed(
        id(ModuleType::Validator),
        SECOND_VALIDATOR,
        &Bytes::new()
    ));

    let result = harness.account.uninstall_module(
        harness.entry_point(),
        id(ModuleType::Validator),
        VALIDATOR,
        &list_removal(SENTINEL),
    );
    assert!(matches!(result, Err(AccountError::CanNotRemoveLastValidator)));
}

#[test]
fn test_delegated_account_may_remove_last_validator() {
    let harness = harness();
    harness.host.set_code(ACCOUNT, delegation_designator(Address::repeat_byte(0x77)));
    assert!(harness.account.is_delegated());

    harness
        .account
        .uninstall_module(
            harness.entry_point(),
            id(ModuleType::Validator),
            VALIDATOR,
            &list_removal(SENTINEL),
        )
        .unwrap();
    assert!(harness.account.validators().is_empty());
}

#[test]
fn test_uninstall_callback_failure_is_reported() {
    let harness = harness();
    let second = install_second_validator(&harness);
    second.set_fail_uninstall(true);

    harness
        .account
        .uninstall_module(
            harness.entry_point(),
            id(ModuleType::Validator),
            SECOND_VALIDATOR,
            &list_removal(SENTINEL),
        )
        .unwrap();
    assert_eq!(harness.account.validators(), vec![VALIDATOR]);
    assert!(harness.account.events().iter().any(|event| matches!(
        event,
        AccountEvent::UninstallCallbackFailed { module, .. } if *module == SECOND_VALIDATOR
    )));
}

#[test]
fn test_forbidden_fallback_selectors() {
    let harness = harness();
    let handler = harness.register_fallback_handler(Address::repeat_byte(0x50));
    for selector in FORBIDDEN_FALLBACK_SELECTORS {
        let mut init = selector.to_vec();
        init.push(CallType::Single.as_byte());
        let result = harness.account.install_module(
            harness.entry_point(),
            id(ModuleType::Fallback),
            handler,
            &init.into(),
        );
        assert!(
            matches!(result, Err(AccountError::FallbackSelectorForbidden(s)) if s.0 == selector),
            "selector {selector:?} must be forbidden"
        );
    }
}

#[test]
fn test_fallback_selector_is_installed_once() {
    let harness = harness();
    let first = harness.register_fallback_handler(Address::repeat_byte(0x50));
    let second = harness.register_fallback_handler(Address::repeat_byte(0x51));
    let init = Bytes::from_static(&[0x12, 0x34, 0x56, 0x78, 0x00]);

    harness
        .account
        .install_module(harness.entry_point(), id(ModuleType::Fallback), first, &init)
        .unwrap();
    let result = harness.account.install_module(
        harness.entry_point(),
        id(ModuleType::Fallback),
        second,
        &init,
    );
    assert!(matches!(result, Err(AccountError::FallbackAlreadyInstalledForSelector(_))));

    let entry = harness.account.fallback_handler(fixed_bytes!("12345678")).unwrap();
    assert_eq!(entry.handler, first);
    assert_eq!(entry.call_type, CallType::Single);
}

#[test]
fn test_try_mode_keeps_going_in_order() {
    let harness = harness();
    let calldata = encode_batch(&[call(COUNTER), call(REVERTER), call(COUNTER)]);

    let results =
        harness.account.execute(harness.entry_point(), batch(ExecType::Try), &calldata).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(U256::from_be_slice(&results[0]), U256::from(1));
    assert_eq!(results[1], Reverter::reason());
    assert_eq!(U256::from_be_slice(&results[2]), U256::from(2));
    assert_eq!(Counter::count(&harness.host, COUNTER), U256::from(2));
    assert!(harness.account.events().contains(&AccountEvent::TryExecuteUnsuccessful {
        target: REVERTER,
        call_data: Bytes::new(),
        result: Reverter::reason(),
    }));
}

#[test]
fn test_default_mode_rolls_back_earlier_calls() {
    let harness = harness();
    let events_before = harness.account.events().len();
    let calldata = encode_batch(&[call(COUNTER), call(REVERTER)]);

    let result =
        harness.account.execute(harness.entry_point(), batch(ExecType::Default), &calldata);

    match result {
        Err(AccountError::ExecutionFailed { target, reason }) => {
            assert_eq!(target, REVERTER);
            assert_eq!(reason, Reverter::reason());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(Counter::count(&harness.host, COUNTER), U256::ZERO);
    assert_eq!(harness.account.events().len(), events_before);
}

#[test]
fn test_single_call_transfers_value() {
    let harness = harness();
    harness.host.set_balance(ACCOUNT, U256::from(10));
    let recipient = Address::repeat_byte(0x71);
    let calldata = encode_single(recipient, U256::from(4), &[]);

    harness.account.execute(harness.entry_point(), single(), &calldata).unwrap();
    assert_eq!(harness.host.balance(ACCOUNT), U256::from(6));
    assert_eq!(harness.host.balance(recipient), U256::from(4));
}

#[test]
fn test_delegate_call_runs_in_account_storage() {
    let harness = harness();
    let mode = ExecutionMode::new(CallType::Delegate, ExecType::Default);
    let calldata = encode_delegate(COUNTER, &[]);

    harness.account.execute(harness.entry_point(), mode, &calldata).unwrap();
    assert_eq!(Counter::count(&harness.host, ACCOUNT), U256::from(1));
    assert_eq!(Counter::count(&harness.host, COUNTER), U256::ZERO);
}

#[test]
fn test_try_delegate_call_reports_failure() {
    let harness = harness();
    let mode = ExecutionMode::new(CallType::Delegate, ExecType::Try);
    let calldata = encode_delegate(REVERTER, b"data");

    let results = harness.account.execute(harness.entry_point(), mode, &calldata).unwrap();

    assert_eq!(results, vec![Reverter::reason()]);
    assert!(harness.account.events().contains(&AccountEvent::TryDelegateCallUnsuccessful {
        target: REVERTER,
        call_data: Bytes::from_static(b"data"),
        result: Reverter::reason(),
    }));
}

#[test]
fn test_static_call_type_is_unsupported() {
    let harness = harness();
    let mode = ExecutionMode::new(CallType::Static, ExecType::Default);
    let calldata = encode_single(ECHO, U256::ZERO, &[]);
    let result = harness.account.execute(harness.entry_point(), mode, &calldata);
    assert!(matches!(result, Err(AccountError::UnsupportedCallType(_))));
}

#[test]
fn test_executor_calls() {
    let harness = harness();
    let executor = harness.register(EXECUTOR, MockExecutor::default());
    harness
        .account
        .install_module(harness.entry_point(), id(ModuleType::Executor), executor, &Bytes::new())
        .unwrap();

    let calldata = encode_single(ECHO, U256::ZERO, b"hi");
    let results = harness
        .account
        .execute_from_executor(CallContext::from_sender(executor), single(), &calldata)
        .unwrap();
    assert_eq!(results, vec![Bytes::from_static(b"hi")]);

    let stranger = CallContext::from_sender(Address::repeat_byte(0x31));
    let result = harness.account.execute_from_executor(stranger, single(), &calldata);
    assert!(matches!(result, Err(AccountError::ExecutorNotInstalled(_))));
}

#[test]
fn test_reverted_frame_discards_reentrant_installs() {
    let harness = harness();
    harness.register(EXECUTOR, MockExecutor::default());
    harness.register(OTHER_EXECUTOR, MockExecutor::default());
    harness.host.deploy(EXECUTOR, Rc::new(ReenteringExecutor));
    harness
        .account
        .install_module(harness.entry_point(), id(ModuleType::Executor), EXECUTOR, &Bytes::new())
        .unwrap();
    let events_before = harness.account.events().len();

    let mode = ExecutionMode::new(CallType::Single, ExecType::Try);
    let calldata = encode_single(EXECUTOR, U256::ZERO, &[]);
    let results = harness.account.execute(harness.entry_point(), mode, &calldata).unwrap();

    assert_eq!(results, vec![Bytes::from_static(b"boom")]);
    assert!(!harness.account.is_module_installed(
        id(ModuleType::Executor),
        OTHER_EXECUTOR,
        &Bytes::new()
    ));
    assert_eq!(harness.account.executors(), vec![EXECUTOR]);
    let events = harness.account.events();
    assert_eq!(events.len(), events_before + 1);
    assert!(matches!(
        events.last(),
        Some(AccountEvent::TryExecuteUnsuccessful { target, .. }) if *target == EXECUTOR
    ));
}

#[test]
fn test_static_frame_only_serves_views() {
    let harness = harness();
    harness.register(OTHER_EXECUTOR, MockExecutor::default());
    let sender = harness.entry_point().sender;

    let install: Bytes = IModularAccount::installModuleCall {
        moduleTypeId: id(ModuleType::Executor),
        module: OTHER_EXECUTOR,
        initData: Bytes::new(),
    }
    .abi_encode()
    .into();
    assert!(harness.host.static_call(sender, ACCOUNT, &install).is_err());
    assert!(harness.account.executors().is_empty());

    let query: Bytes = IModularAccount::isModuleInstalledCall {
        moduleTypeId: id(ModuleType::Validator),
        module: VALIDATOR,
        additionalContext: Bytes::new(),
    }
    .abi_encode()
    .into();
    let output = harness.host.static_call(sender, ACCOUNT, &query).unwrap();
    assert_eq!(output, Bytes::from((true,).abi_encode_params()));
}

#[test]
fn test_hook_sees_call_data() {
    let harness = harness();
    let hook = install_hook(&harness);
    let calldata = encode_single(COUNTER, U256::ZERO, &[]);

    harness.account.execute(harness.entry_point(), single(), &calldata).unwrap();

    let expected =
        IModularAccount::executeCall { mode: single().raw(), executionCalldata: calldata }
            .abi_encode();
    let pre_checks = hook.pre_checks();
    assert_eq!(pre_checks.len(), 1);
    assert_eq!(pre_checks[0].0, harness.entry_point().sender);
    assert_eq!(pre_checks[0].2, Bytes::from(expected));
    assert_eq!(hook.post_checks().len(), 1);
}

#[rstest]
#[case::pre_check(true)]
#[case::post_check(false)]
fn test_hook_veto_rolls_back(#[case] pre_check: bool) {
    let harness = harness();
    let hook = install_hook(&harness);
    if pre_check {
        hook.reject_pre_check(true);
    } else {
        hook.reject_post_check(true);
    }

    let calldata = encode_single(COUNTER, U256::ZERO, &[]);
    let result = harness.account.execute(harness.entry_point(), single(), &calldata);
    if pre_check {
        assert!(matches!(
            result,
            Err(AccountError::HookPreCheckFailed { hook, .. }) if hook == HOOK
        ));
    } else {
        assert!(matches!(
            result,
            Err(AccountError::HookPostCheckFailed { hook, .. }) if hook == HOOK
        ));
    }
    assert_eq!(Counter::count(&harness.host, COUNTER), U256::ZERO);
}

#[test]
fn test_self_call_installs_module_through_execute() {
    let harness = harness();
    let validator = Rc::new(MockValidator::new(SECOND_KEY));
    harness.host.register_module(SECOND_VALIDATOR, validator.clone());
    let install = IModularAccount::installModuleCall {
        moduleTypeId: id(ModuleType::Validator),
        module: SECOND_VALIDATOR,
        initData: Bytes::from_static(&[1]),
    }
    .abi_encode();
    let calldata = encode_single(ACCOUNT, U256::ZERO, &install);

    harness.account.execute(harness.entry_point(), single(), &calldata).unwrap();
    assert!(harness.account.is_module_installed(
        id(ModuleType::Validator),
        SECOND_VALIDATOR,
        &Bytes::new()
    ));
    assert!(validator.is_initialized(ACCOUNT));
}

#[test]
fn test_failed_self_call_rolls_back_outer_execution() {
    let harness = harness();
    let install = IModularAccount::installModuleCall {
        moduleTypeId: id(ModuleType::Validator),
        module: VALIDATOR,
        initData: Bytes::from_static(&[1]),
    }
    .abi_encode();
    let calldata = encode_batch(&[
        call(COUNTER),
        Execution { target: ACCOUNT, value: U256::ZERO, callData: install.into() },
    ]);

    let result =
        harness.account.execute(harness.entry_point(), batch(ExecType::Default), &calldata);
    assert!(matches!(
        result,
        Err(AccountError::ExecutionFailed { target, .. }) if target == ACCOUNT
    ));
    assert_eq!(Counter::count(&harness.host, COUNTER), U256::ZERO);
}

#[test]
fn test_emergency_uninstall_after_timelock() {
    let harness = harness();
    let hook = install_hook(&harness);
    hook.reject_pre_check(true);
    let timelock = harness.account.config().emergency_timelock;

    let blocked = harness.account.uninstall_module(
        harness.entry_point(),
        id(ModuleType::Hook),
        HOOK,
        &Bytes::new(),
    );
    assert!(matches!(blocked, Err(AccountError::HookPreCheckFailed { .. })));

    assert_eq!(
        request_emergency_uninstall(&harness, 1).unwrap(),
        EmergencyUninstallStatus::Requested { at: START_TIME }
    );
    assert_eq!(harness.account.emergency_requested_at(HOOK), Some(START_TIME));
    assert!(harness.account.events().contains(&AccountEvent::EmergencyHookUninstallRequest {
        hook: HOOK,
        timestamp: START_TIME,
    }));

    harness.host.advance(timelock - 1);
    assert_eq!(
        request_emergency_uninstall(&harness, 2).unwrap(),
        EmergencyUninstallStatus::Pending { ready_at: START_TIME + timelock }
    );
    assert_eq!(harness.account.active_hook(), Some(HOOK));

    harness.host.advance(1);
    assert_eq!(
        request_emergency_uninstall(&harness, 3).unwrap(),
        EmergencyUninstallStatus::Uninstalled
    );
    assert_eq!(harness.account.active_hook(), None);
    assert_eq!(harness.account.emergency_requested_at(HOOK), None);
}

#[test]
fn test_emergency_request_expires_after_three_timelocks() {
    let harness = harness();
    install_hook(&harness);
    let timelock = harness.account.config().emergency_timelock;

    request_emergency_uninstall(&harness, 1).unwrap();
    harness.host.advance(3 * timelock);
    let now = START_TIME + 3 * timelock;

    assert_eq!(
        request_emergency_uninstall(&harness, 2).unwrap(),
        EmergencyUninstallStatus::Reset { at: now }
    );
    assert_eq!(harness.account.active_hook(), Some(HOOK));
    assert_eq!(harness.account.emergency_requested_at(HOOK), Some(now));
    assert!(harness.account.events().contains(
        &AccountEvent::EmergencyHookUninstallRequestReset { hook: HOOK, timestamp: now }
    ));
}

#[test]
fn test_emergency_uninstall_of_pre_validation_hook() {
    let harness = harness();
    let kind = PreValidationHookKind::UserOpValidation;
    let hook_type = id(ModuleType::PreValidationHook(kind));
    harness.register(HOOK, MockPreValidationHook);
    harness.account.install_module(harness.entry_point(), hook_type, HOOK, &Bytes::new()).unwrap();
    let timelock = harness.account.config().emergency_timelock;

    let request_uninstall = |nonce: u64| {
        let request = EmergencyUninstall { hookType: hook_type, ..emergency_request(nonce) };
        let signature = harness.signature(harness.account.emergency_uninstall_digest(&request));
        harness.account.emergency_uninstall_hook(
            CallContext::from_sender(Address::repeat_byte(0xee)),
            &request,
            &signature,
        )
    };

    assert_eq!(
        request_uninstall(1).unwrap(),
        EmergencyUninstallStatus::Requested { at: START_TIME }
    );
    assert_eq!(harness.account.pre_validation_hook(kind), Some(HOOK));

    harness.host.advance(timelock);
    assert_eq!(request_uninstall(2).unwrap(), EmergencyUninstallStatus::Uninstalled);
    assert_eq!(harness.account.pre_validation_hook(kind), None);
    assert_eq!(harness.account.emergency_requested_at(HOOK), None);
}

#[test]
fn test_emergency_nonce_is_single_use() {
    let harness = harness();
    install_hook(&harness);

    request_emergency_uninstall(&harness, 7).unwrap();
    assert!(harness.account.is_emergency_nonce_used(U256::from(7)));
    let err = request_emergency_uninstall(&harness, 7).unwrap_err();
    assert!(matches!(err, AccountError::InvalidNonce(_)));
    assert!(err.is_authorization_error());
}

#[test]
fn test_emergency_request_needs_valid_signature() {
    let harness = harness();
    install_hook(&harness);
    let request = emergency_request(1);
    let mut signature = harness.signature(B256::repeat_byte(0x01)).to_vec();
    signature.push(0);

    let result = harness.account.emergency_uninstall_hook(
        harness.entry_point(),
        &request,
        &signature.into(),
    );
    assert!(matches!(result, Err(AccountError::EmergencyUninstallSigError)));
    assert_eq!(harness.account.emergency_requested_at(HOOK), None);
    assert!(!harness.account.is_emergency_nonce_used(U256::from(1)));
}

#[test]
fn test_emergency_request_rejects_non_hook_types() {
    let harness = harness();
    let request =
        EmergencyUninstall { hookType: id(ModuleType::Validator), ..emergency_request(1) };
    let signature = harness.signature(harness.account.emergency_uninstall_digest(&request));
    let result =
        harness.account.emergency_uninstall_hook(harness.entry_point(), &request, &signature);
    assert!(matches!(result, Err(AccountError::UnsupportedModuleType(_))));
}

#[test]
fn test_signature_checks_never_fail() {
    let harness = harness();
    let hash = B256::repeat_byte(0x42);
    let ctx = CallContext::from_sender(Address::repeat_byte(0x61));

    let valid = harness.signature(hash);
    assert_eq!(harness.account.is_valid_signature(ctx, hash, &valid), ERC1271_MAGIC_VALUE);
    assert_eq!(
        harness.account.is_valid_signature(ctx, hash, &Bytes::from_static(&[1, 2, 3])),
        ERC1271_INVALID
    );
    assert_eq!(
        harness.account.is_valid_signature(ctx, B256::repeat_byte(0x43), &harness.signature(hash)),
        ERC1271_INVALID
    );

    let mut unknown = Address::repeat_byte(0x62).to_vec();
    unknown.extend_from_slice(&harness.validator.sign(hash));
    assert_eq!(harness.account.is_valid_signature(ctx, hash, &unknown.into()), ERC1271_INVALID);

    harness.validator.set_revert_checks(true);
    assert_eq!(harness.account.is_valid_signature(ctx, hash, &valid), ERC1271_INVALID);
}

#[test]
fn test_zero_validator_prefix_selects_default_validator() {
    let harness = harness();
    let hash = B256::repeat_byte(0x42);
    let mut signature = Address::ZERO.to_vec();
    signature.extend_from_slice(&harness.default_validator.sign(hash));
    assert_eq!(
        harness.account.is_valid_signature(harness.entry_point(), hash, &signature.into()),
        ERC1271_MAGIC_VALUE
    );
}

#[test]
fn test_erc7739_discovery_reports_best_support() {
    let harness = harness();
    let ctx = harness.entry_point();
    assert_eq!(
        harness.account.is_valid_signature(ctx, ERC7739_DISCOVERY_HASH, &Bytes::new()),
        ERC1271_INVALID
    );

    harness.validator.set_erc7739_response(Some(fixed_bytes!("77390001")));
    harness.default_validator.set_erc7739_response(Some(fixed_bytes!("77390002")));
    assert_eq!(
        harness.account.is_valid_signature(ctx, ERC7739_DISCOVERY_HASH, &Bytes::new()),
        fixed_bytes!("77390002")
    );
    assert_eq!(
        harness.account.is_valid_signature(ctx, B256::repeat_byte(0x01), &Bytes::new()),
        ERC1271_INVALID
    );
}

#[test]
fn test_validate_user_op_routes_by_nonce() {
    let harness = harness();
    let nonce = Nonce::new(ValidationMode::Validate, VALIDATOR, 0);

    let valid = user_op(nonce, harness.validator.sign(USER_OP_HASH));
    assert_eq!(validate(&harness, &valid).unwrap(), VALIDATION_SUCCESS);

    let invalid = user_op(nonce, harness.default_validator.sign(USER_OP_HASH));
    assert_eq!(validate(&harness, &invalid).unwrap(), VALIDATION_FAILED);

    let default = user_op(
        Nonce::new(ValidationMode::Validate, Address::ZERO, 0),
        harness.default_validator.sign(USER_OP_HASH),
    );
    assert_eq!(validate(&harness, &default).unwrap(), VALIDATION_SUCCESS);

    let unknown = user_op(Nonce::new(ValidationMode::Validate, SECOND_VALIDATOR, 0), Bytes::new());
    let result = validate(&harness, &unknown);
    assert!(matches!(
        result,
        Err(AccountError::ValidatorNotInstalled(validator)) if validator == SECOND_VALIDATOR
    ));
}

#[test]
fn test_validate_user_op_pays_prefund() {
    let harness = harness();
    harness.host.set_balance(ACCOUNT, U256::from(100));
    let op = user_op(
        Nonce::new(ValidationMode::Validate, VALIDATOR, 0),
        harness.validator.sign(USER_OP_HASH),
    );

    let stranger = CallContext::from_sender(Address::repeat_byte(0x66));
    let result = harness.account.validate_user_op(stranger, &op, USER_OP_HASH, U256::from(30));
    assert!(matches!(result, Err(AccountError::AccountAccessUnauthorized(_))));

    let ctx = harness.entry_point();
    harness.account.validate_user_op(ctx, &op, USER_OP_HASH, U256::from(30)).unwrap();
    assert_eq!(harness.host.balance(ACCOUNT), U256::from(70));
    assert_eq!(harness.host.balance(harness.entry_point().sender), U256::from(30));
}

fn enable_mode_op(harness: &TestAccount, enable_signer: &MockValidator) -> PackedUserOperation {
    let init_data = Bytes::from_static(&[1]);
    let digest = harness.account.enable_mode_digest(SECOND_VALIDATOR, 1, USER_OP_HASH, &init_data);
    let enable = EnableModeData {
        module: SECOND_VALIDATOR,
        module_type: 1,
        init_data,
        enable_signature: [VALIDATOR.as_slice(), &enable_signer.sign(digest)[..]].concat().into(),
        user_op_signature: MockValidator::new(SECOND_KEY).sign(USER_OP_HASH),
    };
    user_op(Nonce::new(ValidationMode::ModuleEnable, SECOND_VALIDATOR, 0), enable.encode())
}

#[test]
fn test_enable_mode_installs_then_validates() {
    let harness = harness();
    harness.register(SECOND_VALIDATOR, MockValidator::new(SECOND_KEY));
    let op = enable_mode_op(&harness, &harness.validator);

    let validation_data = validate(&harness, &op).unwrap();
    assert_eq!(validation_data, VALIDATION_SUCCESS);
    assert_eq!(harness.account.validators(), vec![SECOND_VALIDATOR, VALIDATOR]);
}

#[test]
fn test_enable_mode_with_bad_signature_fails_validation() {
    let harness = harness();
    harness.register(SECOND_VALIDATOR, MockValidator::new(SECOND_KEY));
    let op = enable_mode_op(&harness, &MockValidator::new(B256::repeat_byte(0x01)));

    let validation_data = validate(&harness, &op).unwrap();
    assert_eq!(validation_data, VALIDATION_FAILED);
    assert_eq!(harness.account.validators(), vec![VALIDATOR]);
}

#[test]
fn test_pre_validation_hooks_rewrite_hash() {
    let harness = harness();
    let hooks = harness.register(Address::repeat_byte(0x80), MockPreValidationHook);
    for module_type in [
        ModuleType::PreValidationHook(PreValidationHookKind::UserOpValidation),
        ModuleType::PreValidationHook(PreValidationHookKind::SignatureVerification),
    ] {
        harness
            .account
            .install_module(harness.entry_point(), id(module_type), hooks, &Bytes::new())
            .unwrap();
    }

    let rewritten = MockPreValidationHook::rewrite(USER_OP_HASH);
    let nonce = Nonce::new(ValidationMode::Validate, VALIDATOR, 0);
    let op = user_op(nonce, harness.validator.sign(rewritten));
    assert_eq!(validate(&harness, &op).unwrap(), VALIDATION_SUCCESS);
    let op = user_op(nonce, harness.validator.sign(USER_OP_HASH));
    assert_eq!(validate(&harness, &op).unwrap(), VALIDATION_FAILED);

    assert_eq!(
        harness.account.is_valid_signature(
            harness.entry_point(),
            USER_OP_HASH,
            &harness.signature(rewritten)
        ),
        ERC1271_MAGIC_VALUE
    );
}

#[test]
fn test_multi_type_install() {
    let harness = harness();
    let module = Rc::new(MockMultiTypeModule::new(SECOND_KEY));
    harness.host.register_module(SECOND_VALIDATOR, module.clone());
    let data = (
        vec![id(ModuleType::Validator), id(ModuleType::Executor)],
        vec![Bytes::from_static(&[1]), Bytes::from_static(&[2])],
    )
        .abi_encode_params();

    harness
        .account
        .install_module(
            harness.entry_point(),
            id(ModuleType::Multi),
            SECOND_VALIDATOR,
            &data.into(),
        )
        .unwrap();
    assert!(harness.account.validators().contains(&SECOND_VALIDATOR));
    assert_eq!(harness.account.executors(), vec![SECOND_VALIDATOR]);
    assert_eq!(module.installs(), vec![Bytes::from_static(&[1]), Bytes::from_static(&[2])]);
}

#[test]
fn test_redelegation_wipes_modules() {
    let harness = harness();
    install_hook(&harness);
    let executor = harness.register(EXECUTOR, MockExecutor::default());
    harness
        .account
        .install_module(harness.entry_point(), id(ModuleType::Executor), executor, &Bytes::new())
        .unwrap();
    request_emergency_uninstall(&harness, 5).unwrap();

    harness.account.on_redelegation(harness.entry_point()).unwrap();

    assert!(!harness.account.is_initialized());
    assert!(harness.account.validators().is_empty());
    assert!(harness.account.executors().is_empty());
    assert_eq!(harness.account.active_hook(), None);
    assert_eq!(harness.account.emergency_requested_at(HOOK), None);
    assert!(harness.account.is_emergency_nonce_used(U256::from(5)));
    assert_eq!(harness.account.events().last(), Some(&AccountEvent::AccountRedelegated));

    harness.initialize();
    assert_eq!(harness.account.validators(), vec![VALIDATOR]);
}

#[test]
fn test_fallback_through_account_address() {
    let harness = harness();
    let handler = harness.register_fallback_handler(Address::repeat_byte(0x50));
    harness
        .account
        .install_module(
            harness.entry_point(),
            id(ModuleType::Fallback),
            handler,
            &Bytes::from_static(&[0x12, 0x34, 0x56, 0x78, 0x00]),
        )
        .unwrap();
    let caller = Address::repeat_byte(0x61);

    let output = harness
        .host
        .call(caller, ACCOUNT, U256::ZERO, &Bytes::from_static(&[0x12, 0x34, 0x56, 0x78, 0xff]))
        .unwrap();
    assert_eq!(output, Bytes::copy_from_slice(caller.as_slice()));

    let unknown = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);
    let unknown = harness.host.call(caller, ACCOUNT, U256::ZERO, &unknown);
    assert!(unknown.is_err());
}

#[test]
fn test_token_receiver_callbacks_are_acknowledged() {
    let harness = harness();
    let data = IERC721Receiver::onERC721ReceivedCall {
        operator: Address::repeat_byte(0x01),
        from: Address::repeat_byte(0x02),
        tokenId: U256::from(1),
        data: Bytes::new(),
    }
    .abi_encode();

    let output =
        harness.host.call(Address::repeat_byte(0x02), ACCOUNT, U256::ZERO, &data.into()).unwrap();
    let mut expected = IERC721Receiver::onERC721ReceivedCall::SELECTOR.to_vec();
    expected.resize(32, 0);
    assert_eq!(output, Bytes::from(expected));
}

#[test]
fn test_views_through_dispatch() {
    let harness = harness();
    let anyone = Address::repeat_byte(0x61);
    let query =
        |data: Vec<u8>| harness.host.call(anyone, ACCOUNT, U256::ZERO, &data.into()).unwrap();

    let output = query(IModularAccount::accountIdCall {}.abi_encode());
    let (account_id,) = <(String,)>::abi_decode_params(&output).unwrap();
    assert_eq!(account_id, harness.account.account_id());

    let output = query(
        IModularAccount::isModuleInstalledCall {
            moduleTypeId: id(ModuleType::Validator),
            module: VALIDATOR,
            additionalContext: Bytes::new(),
        }
        .abi_encode(),
    );
    assert_eq!(<(bool,)>::abi_decode_params(&output).unwrap(), (true,));

    let output = query(
        IModularAccount::getValidatorsPaginatedCall { cursor: SENTINEL, size: U256::from(10) }
            .abi_encode(),
    );
    let (validators, next) = <(Vec<Address>, Address)>::abi_decode_params(&output).unwrap();
    assert_eq!(validators, vec![VALIDATOR]);
    assert_eq!(next, SENTINEL);

    let output = query(
        IModularAccount::supportsExecutionModeCall { mode: batch(ExecType::Try).raw() }
            .abi_encode(),
    );
    assert_eq!(<(bool,)>::abi_decode_params(&output).unwrap(), (true,));

    let output =
        query(IModularAccount::supportsModuleCall { moduleTypeId: U256::from(5) }.abi_encode());
    assert_eq!(<(bool,)>::abi_decode_params(&output).unwrap(), (false,));
}

#[test]
fn test_failed_dispatch_reverts_with_reason() {
    let harness = harness();
    let data = IModularAccount::installModuleCall {
        moduleTypeId: id(ModuleType::Validator),
        module: DEFAULT_VALIDATOR,
        initData: Bytes::new(),
    }
    .abi_encode();

    let stranger = Address::repeat_byte(0x66);
    let revert = harness.host.call(stranger, ACCOUNT, U256::ZERO, &data.into()).unwrap_err();
    assert_eq!(&revert[..4], &[0x08, 0xc3, 0x79, 0xa0]);
}
