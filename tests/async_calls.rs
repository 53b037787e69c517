mod common;

use common::{address, call, Fixture};
use num_bigint::BigUint;
use vm_host::runtime::parser::build_call_data;
use vm_host::runtime::{AsyncCallRequest, ExecutorError, VmHooks};
use vm_host::{Address, ReturnCode};
use vm_host_mock::{ScriptedContract, ESDT_TRANSFER};

fn request(group: &str, destination: Address, function: &str, gas_limit: u64, extra: u64) -> AsyncCallRequest {
    AsyncCallRequest {
        group_id: group.to_string(),
        destination,
        data: build_call_data(function, &[]),
        success_callback: "onOk".to_string(),
        error_callback: "onErr".to_string(),
        gas_limit,
        extra_gas_for_callback: extra,
        ..AsyncCallRequest::default()
    }
}

fn burner(points: u64) -> ScriptedContract {
    ScriptedContract::new().function("work", move |hooks: &mut dyn VmHooks| {
        hooks.consume_points(points)?;
        hooks.finish(b"done")?;
        Ok(())
    })
}

/// Callbacks that record which one ran and what they received.
fn with_callbacks(contract: ScriptedContract) -> ScriptedContract {
    contract
        .function("onOk", |hooks: &mut dyn VmHooks| {
            let count = hooks.get_num_arguments()?;
            hooks.storage_store(b"ok-args", &[count as u8])?;
            Ok(())
        })
        .function("onErr", |hooks: &mut dyn VmHooks| {
            let code = hooks.get_argument(0)?;
            let message = hooks.get_argument(1)?;
            hooks.storage_store(b"err-code", &code)?;
            hooks.storage_store(b"err-message", &message)?;
            Ok(())
        })
}

#[test]
fn local_async_calls_return_unspent_gas() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    let c = address(3, 0);
    fixture.deploy(
        a,
        ScriptedContract::new()
            .function("run", move |hooks: &mut dyn VmHooks| {
                hooks.create_async_call(request("g", b, "work", 100, 20))?;
                hooks.create_async_call(request("g", c, "work", 50, 10))?;
                hooks.set_async_group_callback("g", "allDone", b"g", 15)?;
                Ok(())
            })
            .function("onOk", |hooks: &mut dyn VmHooks| {
                let count = hooks.get_num_arguments()?;
                let done = hooks.storage_load(b"done")?.first().copied().unwrap_or(0);
                hooks.storage_store(b"ok-args", &[count as u8])?;
                hooks.storage_store(b"done", &[done + 1])?;
                Ok(())
            })
            .function("allDone", |hooks: &mut dyn VmHooks| {
                let left = hooks.get_gas_left()?;
                let done = hooks.storage_load(b"done")?;
                hooks.storage_store(b"group-gas", &left.to_be_bytes())?;
                hooks.storage_store(b"done-at-group", &done)?;
                Ok(())
            }),
    );
    fixture.deploy(b, burner(70));
    fixture.deploy(c, burner(40));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::Ok, "{}", output.return_message);
    // 300 - 70 - 40 burnt by the destinations; the locked gas all comes back
    assert_eq!(output.gas_remaining, 190);
    let storage = &output.account(&a).unwrap().storage_updates;
    assert_eq!(storage[&b"ok-args".to_vec()].data, vec![2]);
    // the group callback runs on its own locked gas, after both calls settled
    assert_eq!(storage[&b"group-gas".to_vec()].data, 15u64.to_be_bytes().to_vec());
    assert_eq!(storage[&b"done-at-group".to_vec()].data, vec![2]);
    // return data of async destinations goes to the callback, not the caller
    assert!(output.return_data.is_empty());
}

#[test]
fn failed_destination_runs_error_callback() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(
        a,
        with_callbacks(ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| {
            hooks.create_async_call(request("g", b, "work", 100, 20))?;
            Ok(())
        })),
    );
    fixture.deploy(
        b,
        ScriptedContract::new().function("work", |hooks: &mut dyn VmHooks| {
            hooks.storage_store(b"touched", b"yes")?;
            hooks.signal_error("insufficient stock")?;
            Ok(())
        }),
    );

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert!(output.is_success());
    // the destination keeps none of its gas
    assert_eq!(output.gas_remaining, 200);
    let storage = &output.account(&a).unwrap().storage_updates;
    assert_eq!(storage[&b"err-code".to_vec()].data, ReturnCode::UserError.to_bytes());
    assert_eq!(storage[&b"err-message".to_vec()].data, b"insufficient stock".to_vec());
    assert!(output
        .account(&b)
        .map_or(true, |account| account.storage_updates.is_empty()));
}

#[test]
fn failing_callback_does_not_fail_the_caller() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(
        a,
        ScriptedContract::new()
            .function("run", move |hooks: &mut dyn VmHooks| {
                hooks.create_async_call(request("g", b, "work", 100, 20))?;
                hooks.finish(b"scheduled")?;
                Ok(())
            })
            .function("onOk", |hooks: &mut dyn VmHooks| {
                hooks.storage_store(b"lost", b"write")?;
                hooks.signal_error("callback broke")?;
                Ok(())
            }),
    );
    fixture.deploy(b, burner(30));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert!(output.is_success());
    assert_eq!(output.return_data, vec![b"scheduled".to_vec()]);
    assert!(output
        .account(&a)
        .map_or(true, |account| !account.storage_updates.contains_key(&b"lost".to_vec())));
    // 30 burnt by the destination, 70 + 20 handed to the failed callback
    assert_eq!(output.gas_remaining, 180);
}

#[test]
fn group_callback_runs_once_all_calls_finish() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    let c = address(3, 0);
    fixture.deploy(
        a,
        with_callbacks(
            ScriptedContract::new()
                .function("run", move |hooks: &mut dyn VmHooks| {
                    hooks.create_async_call(request("swap", b, "work", 40, 0))?;
                    hooks.create_async_call(request("swap", c, "work", 40, 0))?;
                    hooks.set_async_group_callback("swap", "swapDone", b"ctx", 25)?;
                    Ok(())
                })
                .function("swapDone", |hooks: &mut dyn VmHooks| {
                    let data = hooks.get_argument(0)?;
                    let left = hooks.get_gas_left()?;
                    hooks.storage_store(b"group", &data)?;
                    hooks.storage_store(b"group-gas", &left.to_be_bytes())?;
                    Ok(())
                }),
        ),
    );
    fixture.deploy(b, burner(10));
    fixture.deploy(c, burner(10));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    let storage = &output.account(&a).unwrap().storage_updates;
    assert_eq!(storage[&b"group".to_vec()].data, b"ctx".to_vec());
    assert_eq!(storage[&b"group-gas".to_vec()].data, 25u64.to_be_bytes().to_vec());
    assert_eq!(output.gas_remaining, 280);
}

#[test]
fn legacy_async_call_stops_the_caller() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(
        a,
        ScriptedContract::new()
            .function("run", move |hooks: &mut dyn VmHooks| {
                hooks.storage_store(b"before", b"1")?;
                let data = build_call_data("work", &[]);
                hooks.async_call(&b, &BigUint::from(0u32), &data)?;
                hooks.storage_store(b"after", b"1")?;
                Ok(())
            })
            .function("callBack", |hooks: &mut dyn VmHooks| {
                let code = hooks.get_argument(0)?;
                let data = hooks.get_argument(1)?;
                hooks.storage_store(b"cb-code", &code)?;
                hooks.storage_store(b"cb-data", &data)?;
                Ok(())
            }),
    );
    fixture.deploy(b, burner(50));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    let storage = &output.account(&a).unwrap().storage_updates;
    assert!(storage.contains_key(&b"before".to_vec()));
    assert!(!storage.contains_key(&b"after".to_vec()));
    assert!(storage[&b"cb-code".to_vec()].data.is_empty());
    assert_eq!(storage[&b"cb-data".to_vec()].data, b"done".to_vec());
    assert_eq!(output.gas_remaining, 250);
}

#[test]
fn callback_cannot_be_called_directly() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    fixture.deploy(a, ScriptedContract::new().noop("callBack"));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "callBack", 100))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::UserError);
    assert!(output.return_message.contains("callback"));
}

#[test]
fn builtin_async_call_resolves_in_shard() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(
        a,
        with_callbacks(ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| {
            let request = AsyncCallRequest {
                group_id: "tokens".to_string(),
                destination: b,
                data: build_call_data(ESDT_TRANSFER, &[b"TOK-1".to_vec(), vec![5]]),
                success_callback: "onOk".to_string(),
                error_callback: "onErr".to_string(),
                gas_limit: 50,
                ..AsyncCallRequest::default()
            };
            hooks.create_async_call(request)?;
            Ok(())
        })),
    );

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert!(output.is_success(), "{}", output.return_message);
    assert_eq!(fixture.builtins.calls().len(), 1);
    assert_eq!(output.logs[0].identifier, ESDT_TRANSFER.as_bytes().to_vec());
    assert_eq!(output.gas_remaining, 300 - vm_host_mock::ESDT_TRANSFER_COST);
}

#[test]
fn async_call_beyond_remaining_gas_fails_the_caller() {
    let fixture = Fixture::new(1);
    let a = address(1, 0);
    let b = address(2, 0);
    fixture.deploy(
        a,
        ScriptedContract::new().function("run", move |hooks: &mut dyn VmHooks| -> Result<(), ExecutorError> {
            hooks.create_async_call(request("g", b, "work", 250, 100))?;
            Ok(())
        }),
    );
    fixture.deploy(b, burner(1));

    let output = fixture
        .host()
        .run_smart_contract_call(&call(address(9, 0), a, "run", 300))
        .unwrap();

    assert_eq!(output.return_code, ReturnCode::OutOfGas);
}
