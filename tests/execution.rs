mod common;

use common::{address, call, dest_call, finish_status, Fixture};
use num_bigint::{BigInt, BigUint};
use vm_host::config::HostConfig;
use vm_host::runtime::{CallRequest, CreateRequest, VmHooks};
use vm_host::{Address, ContractCreateInput, ReturnCode, VmInput};
use vm_host_mock::ScriptedContract;

const DEPLOYABLE: &str = r#"(module (memory 1) (func (export "init")) (func (export "get")))"#;

fn counter() -> ScriptedContract {
    ScriptedContract::new()
        .function("inc", |hooks: &mut dyn VmHooks| {
            let current = hooks.storage_load(b"count")?;
            let next = current.first().copied().unwrap_or(0) + 1;
            hooks.storage_store(b"count", &[next])?;
            hooks.finish(&[next])?;
            Ok(())
        })
        .function("fail", |hooks: &mut dyn VmHooks| {
            hooks.storage_store(b"count", &[99])?;
            hooks.finish(b"partial")?;
            hooks.signal_error("refused")?;
            Ok(())
        })
}

fn caller_of(target: Address, function: &'static str) -> ScriptedContract {
    ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| {
        let status = hooks.execute_on_dest_context(dest_call(target, function, 100))?;
        finish_status(hooks, status)
    })
}

#[test]
fn dest_context_call_keeps_effects_on_success() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(a, caller_of(b, "inc"));
    fixture.deploy(b, counter());

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 1_000))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    assert_eq!(output.return_data, vec![vec![1], vec![0]]);
    let storage = &output.account(&b).unwrap().storage_updates;
    assert_eq!(storage[&b"count".to_vec()].data, vec![1]);
}

#[test]
fn dest_context_failure_is_rolled_back_and_reported() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(a, caller_of(b, "fail"));
    fixture.deploy(b, counter());

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 1_000))
        .unwrap();

    assert!(output.is_success());
    assert_eq!(output.return_data, vec![vec![1]]);
    assert!(output.account(&b).is_none());
    // gas handed to the failed callee is lost
    assert_eq!(output.gas_remaining, 900);
}

#[test]
fn same_context_call_writes_caller_storage() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let library = address(2, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| {
            let status = hooks.execute_on_same_context(dest_call(library, "inc", 100))?;
            finish_status(hooks, status)
        }),
    );
    fixture.deploy(library, counter());

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 1_000))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    let storage = &output.account(&a).unwrap().storage_updates;
    assert_eq!(storage[&b"count".to_vec()].data, vec![1]);
    assert!(output.account(&library).is_none());
}

#[test]
fn same_context_failure_fails_the_caller() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let library = address(2, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| {
            hooks.storage_store(b"mine", b"1")?;
            hooks.execute_on_same_context(dest_call(library, "fail", 100))?;
            hooks.finish(b"unreachable")?;
            Ok(())
        }),
    );
    fixture.deploy(library, counter());

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 1_000))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::UserError);
    assert_eq!(output.return_message, "refused");
    assert!(output.output_accounts.is_empty());
}

#[test]
fn read_only_callee_cannot_write() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| {
            let status = hooks.execute_read_only(dest_call(b, "inc", 100))?;
            finish_status(hooks, status)
        }),
    );
    fixture.deploy(b, counter());

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 1_000))
        .unwrap();

    assert!(output.is_success());
    assert_eq!(output.return_data, vec![vec![1]]);
    assert!(output.account(&b).is_none());
}

#[test]
fn init_cannot_be_called_after_deployment() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(a, ScriptedContract::new().noop("init"));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "init", 100))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::UserError);
    assert!(output.return_message.contains("init"));
}

#[test]
fn missing_function_and_contract_are_reported() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(a, counter());
    let host = fixture.host();

    let output = host
        .run_smart_contract_call(&call(address(9, 0), a, "nope", 100))
        .unwrap();
    assert_eq!(output.return_code, ReturnCode::FunctionNotFound);

    let output = host
        .run_smart_contract_call(&call(address(9, 0), address(7, 0), "inc", 100))
        .unwrap();
    assert_eq!(output.return_code, ReturnCode::ContractNotFound);
}

#[test]
fn running_out_of_gas_consumes_everything() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("spin", |hooks: &mut dyn VmHooks| {
            hooks.storage_store(b"k", b"v")?;
            hooks.consume_points(1_000)?;
            Ok(())
        }),
    );

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "spin", 300))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::OutOfGas);
    assert_eq!(output.gas_remaining, 0);
    assert!(output.output_accounts.is_empty());
}

#[test]
fn protected_keys_are_rejected() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("sneak", |hooks: &mut dyn VmHooks| {
            hooks.storage_store(b"VMHOSTASYNCx", b"forged")?;
            Ok(())
        }),
    );

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "sneak", 300))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::UserError);
    assert!(output.return_message.contains("protected"));
}

#[test]
fn nesting_stops_at_max_call_depth() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("recurse", move |hooks: &mut dyn VmHooks| {
            let status = hooks.execute_on_dest_context(CallRequest {
                gas: 10_000,
                destination: a,
                function: "recurse".to_string(),
                ..CallRequest::default()
            })?;
            finish_status(hooks, status)
        }),
    );
    let config = HostConfig {
        max_call_depth: 3,
        ..HostConfig::default()
    };

    let output = fixture
        .host_with_config(config)
        .run_smart_contract_call(&call(address(9, 0), a, "recurse", 100_000))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    // innermost level could not nest further, the others succeeded
    assert_eq!(output.return_data, vec![vec![1], vec![0], vec![0]]);
}

#[test]
fn value_transfer_needs_funds() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.chain.add_account(a, 50);
    fixture.deploy(
        a,
        ScriptedContract::new()
            .function("pay", move |hooks: &mut dyn VmHooks| {
                hooks.transfer_value(&b, &BigUint::from(30u32), b"rent")?;
                Ok(())
            })
            .function("overpay", move |hooks: &mut dyn VmHooks| {
                hooks.transfer_value(&b, &BigUint::from(80u32), b"")?;
                Ok(())
            }),
    );
    let host = fixture.host();

    let output = host
        .run_smart_contract_call(&call(address(9, 0), a, "pay", 300))
        .unwrap();
    assert!(output.is_success(), "{}", output.return_message);
    let received = output.account(&b).unwrap();
    assert_eq!(received.balance_delta, BigInt::from(30));
    assert_eq!(received.output_transfers[0].data, b"rent".to_vec());

    let output = host
        .run_smart_contract_call(&call(address(9, 0), a, "overpay", 300))
        .unwrap();
    assert_eq!(output.return_code, ReturnCode::OutOfFunds);
}

#[test]
fn logs_and_managed_buffers() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("emit", |hooks: &mut dyn VmHooks| {
            let handle = hooks.mbuffer_new(b"hello")?;
            hooks.mbuffer_append(handle, b" world")?;
            let bytes = hooks.mbuffer_get_bytes(handle)?;
            hooks.write_log(&[b"greeting".to_vec(), b"topic".to_vec()], &bytes)?;
            hooks.finish(&bytes)?;
            Ok(())
        }),
    );

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "emit", 300))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    assert_eq!(output.return_data, vec![b"hello world".to_vec()]);
    let log = &output.logs[0];
    assert_eq!(log.identifier, b"greeting".to_vec());
    assert_eq!(log.topics, vec![b"topic".to_vec()]);
    assert_eq!(log.data, vec![b"hello world".to_vec()]);
    assert_eq!(log.address, a);
}

fn create_input(creator: Address, code: Vec<u8>, gas: u64) -> ContractCreateInput {
    ContractCreateInput {
        vm_input: VmInput {
            caller: creator,
            gas_provided: gas,
            original_tx_hash: b"deploy".to_vec(),
            ..VmInput::default()
        },
        contract_code: code,
        contract_code_metadata: vec![1, 0],
    }
}

#[test]
fn deployment_runs_init_and_records_code() {
    let fixture = Fixture::new(1);
    let creator = address(9, 0);
    let code = wat::parse_str(DEPLOYABLE).unwrap();
    fixture.executor.register(
        &code,
        ScriptedContract::new()
            .function("init", |hooks: &mut dyn VmHooks| {
                let owner = hooks.get_caller()?;
                hooks.storage_store(b"owner", owner.as_bytes())?;
                Ok(())
            })
            .noop("get"),
    );

    let output = fixture
        .host()
        .run_smart_contract_create(&create_input(creator, code.clone(), 1_000))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    let expected = Address::derive_contract(&creator, 0);
    let deployed = output.account(&expected).unwrap();
    assert_eq!(deployed.code.as_ref(), Some(&code));
    assert_eq!(deployed.storage_updates[&b"owner".to_vec()].data, creator.to_vec());
    assert_eq!(output.account(&creator).unwrap().nonce, 1);
}

#[test]
fn deployment_rejects_invalid_code() {
    let fixture = Fixture::new(1);
    let creator = address(9, 0);
    let without_memory = wat::parse_str(r#"(module (func (export "init")))"#).unwrap();

    let output = fixture
        .host()
        .run_smart_contract_create(&create_input(creator, without_memory, 1_000))
        .unwrap();
    assert_eq!(output.return_code, ReturnCode::ContractInvalid);

    let output = fixture
        .host()
        .run_smart_contract_create(&create_input(creator, b"not wasm".to_vec(), 1_000))
        .unwrap();
    assert_eq!(output.return_code, ReturnCode::ContractInvalid);
}

#[test]
fn contract_can_deploy_contract() {
    let fixture = Fixture::new(1);
    let factory = address(1, 0);
    let code = wat::parse_str(DEPLOYABLE).unwrap();
    fixture.executor.register(
        &code,
        ScriptedContract::new()
            .function("init", |hooks: &mut dyn VmHooks| {
                let argument = hooks.get_argument(0)?;
                hooks.storage_store(b"seed", &argument)?;
                Ok(())
            })
            .noop("get"),
    );
    let child_code = code.clone();
    fixture.deploy(
        factory,
        ScriptedContract::new().function("spawn", move |hooks: &mut dyn VmHooks| {
            let created = hooks.create_contract(CreateRequest {
                gas: 500,
                code: child_code.clone(),
                arguments: vec![b"s".to_vec()],
                ..CreateRequest::default()
            })?;
            hooks.finish(created.as_bytes())?;
            Ok(())
        }),
    );

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), factory, "spawn", 10_000))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    let created = Address::derive_contract(&factory, 0);
    assert_eq!(output.return_data, vec![created.to_vec()]);
    let account = output.account(&created).unwrap();
    assert_eq!(account.storage_updates[&b"seed".to_vec()].data, b"s".to_vec());
}

#[test]
fn gas_trace_attributes_consumption() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("burn", |hooks: &mut dyn VmHooks| {
            hooks.consume_points(42)?;
            Ok(())
        }),
    );
    let config = HostConfig {
        enable_gas_trace: true,
        ..HostConfig::default()
    };

    let (output, trace) = fixture
        .host_with_config(config)
        .run_smart_contract_call_traced(&call(address(9, 0), a, "burn", 100))
        .unwrap();

    assert_eq!(output.gas_remaining, 58);
    let burn = trace.iter().find(|entry| entry.function == "burn").unwrap();
    assert_eq!(burn.gas, 42);
    assert_eq!(burn.contract, a);
}
